//! `GET /review-pr/?pr=<n>&repo=<owner/name>[&format=html|ndjson]`
//!
//! Validates the request, starts the review helper and hands the helper to a
//! [`StreamRelay`] running on its own task. The response body is fed from a
//! bounded channel; dropping the body (client gone) closes the channel and
//! the relay terminates the helper.

use std::convert::Infallible;
use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{Instrument, info, info_span, warn};

use super::api::{ApiError, PageError, SharedState};
use crate::config::ReviewSection;
use crate::relay::{
    HtmlRenderer, Invocation, Markers, NdjsonRenderer, PhaseTable, ProcessRunner, RelayOptions,
    Renderer, StreamRelay,
};

/// Rendered chunks buffered ahead of a slow client.
const CHUNK_BUFFER: usize = 64;

/// Everything a review request needs besides its own parameters.
#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub helper: PathBuf,
    pub default_repo: String,
    pub markers: Markers,
    pub phases: PhaseTable,
    pub options: RelayOptions,
}

impl From<&ReviewSection> for ReviewSettings {
    fn from(section: &ReviewSection) -> Self {
        Self {
            helper: section.helper.clone(),
            default_repo: section.default_repo.clone(),
            markers: section.markers(),
            phases: section.phase_table(),
            options: section.relay_options(),
        }
    }
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self::from(&ReviewSection::default())
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewQuery {
    pub pr: Option<String>,
    pub repo: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Html,
    Ndjson,
}

impl OutputFormat {
    fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw.unwrap_or("html") {
            "html" => Ok(OutputFormat::Html),
            "ndjson" => Ok(OutputFormat::Ndjson),
            other => Err(ApiError::BadRequest(format!(
                "Unknown format '{}'. Valid values: html, ndjson",
                other
            ))),
        }
    }
}

pub async fn review_pr(
    State(state): State<SharedState>,
    Query(query): Query<ReviewQuery>,
) -> Result<Response, PageError> {
    let settings = &state.review;
    let format = OutputFormat::parse(query.format.as_deref())?;
    let invocation = Invocation::from_request(
        query.pr.as_deref(),
        query.repo.as_deref(),
        &settings.default_repo,
        &settings.helper,
    )
    .inspect_err(|e| warn!("rejected review request: {}", e))?;

    info!(
        pr = %invocation.pr(),
        repo = %invocation.repo(),
        ?format,
        "starting review helper"
    );
    let runner = ProcessRunner::start(&invocation)?;

    let response = match format {
        OutputFormat::Html => {
            stream_response(settings, &invocation, runner, HtmlRenderer::new(&invocation))
        }
        OutputFormat::Ndjson => stream_response(settings, &invocation, runner, NdjsonRenderer),
    };
    Ok(response?)
}

fn stream_response<R: Renderer + 'static>(
    settings: &ReviewSettings,
    invocation: &Invocation,
    runner: ProcessRunner,
    renderer: R,
) -> Result<Response, ApiError> {
    let content_type = renderer.content_type();
    let (tx, rx) = mpsc::channel::<Result<String, Infallible>>(CHUNK_BUFFER);

    let relay = StreamRelay::new(runner, renderer, tx)
        .with_markers(settings.markers.clone())
        .with_phases(settings.phases.clone())
        .with_options(settings.options);
    let span = info_span!(
        "review",
        pr = %invocation.pr(),
        repo = %invocation.repo(),
        token = %relay.token()
    );
    tokio::spawn(
        async move {
            let outcome = relay.run().await;
            info!(?outcome, "relay ended");
        }
        .instrument(span),
    );

    let chunks = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, HeaderValue::from_static(content_type))
        .header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))
        .header("x-accel-buffering", HeaderValue::from_static("no"))
        .body(Body::from_stream(chunks))
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {}", e)))
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::bookmarks::Bookmarks;
    use crate::relay::UiEvent;
    use crate::relay::test_support::{helper_script, wait_for_exit};
    use crate::web::api::{AppState, api_router};

    fn app(helper: &Path) -> Router {
        let review = ReviewSettings {
            helper: helper.to_path_buf(),
            default_repo: "default-org/default-repo".into(),
            options: RelayOptions {
                poll_interval: Duration::from_millis(10),
                drain_timeout: Duration::from_secs(2),
            },
            ..ReviewSettings::default()
        };
        api_router().with_state(Arc::new(AppState {
            bookmarks: Bookmarks::default(),
            review,
            base_url: "http://localhost:8000".into(),
        }))
    }

    /// Send a request, retrying while a freshly written helper is still busy
    /// in another test thread.
    async fn get(helper: &Path, uri: &str) -> Response {
        for _ in 0..50 {
            let resp = app(helper)
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            if resp.status() != StatusCode::INTERNAL_SERVER_ERROR || !helper.exists() {
                return resp;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("helper never started");
    }

    async fn body_text(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn events(body: &str) -> Vec<UiEvent> {
        body.lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_invalid_repo_is_rejected_before_spawn() {
        let (dir, script) = helper_script(r#"touch "$(dirname "$0")/ran""#);
        for uri in [
            "/review-pr/?pr=7&repo=bad%20repo",
            "/review-pr/?pr=7&repo=acme/widgets;rm",
            "/review-pr/?pr=7&repo=acme",
            "/review-pr/?pr=abc",
            "/review-pr/?repo=acme/widgets",
        ] {
            let resp = get(&script, uri).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!dir.path().join("ran").exists());
    }

    #[tokio::test]
    async fn test_unknown_format_is_rejected() {
        let (_dir, script) = helper_script("echo hi");
        let resp = get(&script, "/review-pr/?pr=7&format=xml").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(resp).await.contains("Unknown format 'xml'"));
    }

    #[tokio::test]
    async fn test_missing_helper_is_internal_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let resp = get(&dir.path().join("absent.sh"), "/review-pr/?pr=7").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_ndjson_stream_end_to_end() {
        let (_dir, script) = helper_script(
            r#"echo "Reviewing PR #$1 in $2"
echo "Waiting for Copilot"
echo "---PAYLOAD_START---"
echo "Looks good"
echo "---PAYLOAD_END---""#,
        );
        let resp = get(&script, "/review-pr/?pr=42&format=ndjson").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "application/x-ndjson"
        );
        assert_eq!(resp.headers()["x-accel-buffering"], "no");

        let events = events(&body_text(resp).await);
        assert_eq!(
            events[0],
            UiEvent::LogLine {
                text: "Reviewing PR #42 in default-org/default-repo".into()
            }
        );
        assert!(matches!(&events[2], UiEvent::PhaseUpdate { phase } if phase.tag == "waiting"));
        assert!(events.contains(&UiEvent::PayloadReady {
            text: "Looks good".into()
        }));
        assert_eq!(
            events.last(),
            Some(&UiEvent::ProcessFinished {
                had_payload: true,
                exit_code: Some(0)
            })
        );
    }

    #[tokio::test]
    async fn test_html_stream_escapes_helper_output() {
        let (_dir, script) = helper_script(r#"echo "</script><b>x</b>""#);
        let resp = get(&script, "/review-pr/?pr=7&repo=acme/widgets").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
        let body = body_text(resp).await;
        assert!(body.contains("acme/widgets"));
        assert!(body.contains("relayApply("));
        assert!(!body.contains("</script><b>"));
    }

    #[tokio::test]
    async fn test_dropped_body_terminates_helper() {
        let (dir, script) = helper_script(
            r#"echo $$ > "$(dirname "$0")/helper.pid"
echo started
sleep 30"#,
        );
        let resp = get(&script, "/review-pr/?pr=7&format=ndjson").await;
        assert_eq!(resp.status(), StatusCode::OK);

        let mut body = resp.into_body();
        let first = body.frame().await.unwrap().unwrap();
        assert!(first.is_data());

        let pid_file = dir.path().join("helper.pid");
        let mut waited = Duration::ZERO;
        while std::fs::read_to_string(&pid_file)
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
        {
            assert!(waited < Duration::from_secs(5), "helper never wrote pid");
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += Duration::from_millis(20);
        }
        let pid: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        drop(body);
        assert!(wait_for_exit(pid, Duration::from_secs(5)).await);
    }

    #[test]
    fn test_settings_from_section() {
        let section = ReviewSection {
            default_repo: "acme/widgets".into(),
            poll_interval_ms: 250,
            ..ReviewSection::default()
        };
        let settings = ReviewSettings::from(&section);
        assert_eq!(settings.default_repo, "acme/widgets");
        assert_eq!(settings.options.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.phases, PhaseTable::default());
    }
}
