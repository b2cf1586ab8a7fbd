//! The cooperative loop that ties a helper run to one client.
//!
//! Each iteration checks the client, then the helper, then pulls whatever
//! output is queued and pushes every resulting event through the renderer
//! into the sink before producing the next. The helper is terminated on
//! every way out of the loop.

use std::convert::Infallible;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::event::UiEvent;
use super::extract::{Markers, PayloadExtractor};
use super::lines::{Line, LineAssembler};
use super::process::ProcessRunner;
use super::render::Renderer;
use super::translate::{EventTranslator, PhaseTable};
use crate::errors::RelayError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_DRAIN_STEP: Duration = Duration::from_millis(10);

/// Outbound half of a client connection.
#[async_trait]
pub trait EventSink: Send {
    /// Deliver one rendered chunk. Fails with
    /// [`RelayError::ClientDisconnected`] once the client is gone.
    async fn deliver(&mut self, chunk: String) -> Result<(), RelayError>;

    /// Cheap check for a client that went away between deliveries.
    fn client_gone(&self) -> bool;
}

/// Feeds a streaming response body; the receiver is dropped with the
/// connection.
#[async_trait]
impl EventSink for mpsc::Sender<Result<String, Infallible>> {
    async fn deliver(&mut self, chunk: String) -> Result<(), RelayError> {
        self.send(Ok(chunk))
            .await
            .map_err(|_| RelayError::ClientDisconnected)
    }

    fn client_gone(&self) -> bool {
        self.is_closed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    /// Sleep between polls when the helper has produced nothing new.
    pub poll_interval: Duration,
    /// Upper bound on the final read after the helper exits.
    pub drain_timeout: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Identifies one relay in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelayToken(Uuid);

impl RelayToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RelayToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RelayToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a relay ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Finished {
        had_payload: bool,
        exit_code: Option<i32>,
    },
    ClientDisconnected,
    Failed {
        message: String,
    },
}

pub struct StreamRelay<S, R> {
    token: RelayToken,
    runner: ProcessRunner,
    assembler: LineAssembler,
    extractor: PayloadExtractor,
    translator: EventTranslator,
    renderer: R,
    sink: S,
    options: RelayOptions,
}

impl<S: EventSink, R: Renderer> StreamRelay<S, R> {
    pub fn new(runner: ProcessRunner, renderer: R, sink: S) -> Self {
        Self {
            token: RelayToken::new(),
            runner,
            assembler: LineAssembler::new(),
            extractor: PayloadExtractor::default(),
            translator: EventTranslator::default(),
            renderer,
            sink,
            options: RelayOptions::default(),
        }
    }

    pub fn with_markers(mut self, markers: Markers) -> Self {
        self.extractor = PayloadExtractor::new(markers);
        self
    }

    pub fn with_phases(mut self, phases: PhaseTable) -> Self {
        self.translator = EventTranslator::new(phases);
        self
    }

    pub fn with_options(mut self, options: RelayOptions) -> Self {
        self.options = options;
        self
    }

    pub fn token(&self) -> RelayToken {
        self.token
    }

    /// Relay the helper's output until it exits, fails or the client leaves.
    ///
    /// Consumes the relay: one relay serves exactly one helper run.
    pub async fn run(mut self) -> RelayOutcome {
        let span = info_span!("relay", token = %self.token, pid = ?self.runner.pid());
        async move {
            info!("relay started");
            let outcome = match self.drive().await {
                Ok((had_payload, exit_code)) => {
                    info!(had_payload, ?exit_code, "helper finished");
                    RelayOutcome::Finished {
                        had_payload,
                        exit_code,
                    }
                }
                Err(RelayError::ClientDisconnected) => {
                    info!("client disconnected; terminating helper");
                    RelayOutcome::ClientDisconnected
                }
                Err(err) => {
                    error!("relay failed: {}", err);
                    let message = err.to_string();
                    let event = self.translator.error(message.clone());
                    if let Err(e) = self.emit(&event).await {
                        debug!("could not report relay error to client: {}", e);
                    }
                    RelayOutcome::Failed { message }
                }
            };
            self.runner.terminate().await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self) -> Result<(bool, Option<i32>), RelayError> {
        if let Some(preamble) = self.renderer.preamble() {
            self.sink.deliver(preamble).await?;
        }

        loop {
            if self.sink.client_gone() {
                return Err(RelayError::ClientDisconnected);
            }

            if !self.runner.is_alive()? {
                self.drain().await?;
                if let Some(line) = self.assembler.flush() {
                    self.process_line(line).await?;
                }

                let had_payload = self.extractor.finish();
                let exit_code = self.runner.exit_code();
                let finished = self.translator.finished(had_payload, exit_code);
                self.emit(&finished).await?;
                return Ok((had_payload, exit_code));
            }

            let bytes = self.runner.read_available()?;
            if bytes.is_empty() {
                tokio::time::sleep(self.options.poll_interval).await;
            } else {
                self.process_bytes(&bytes).await?;
            }
        }
    }

    /// Final read after the helper exited, one poll interval at a time so a
    /// departing client is still noticed.
    async fn drain(&mut self) -> Result<(), RelayError> {
        let deadline = tokio::time::Instant::now() + self.options.drain_timeout;
        let step = self.options.poll_interval.max(MIN_DRAIN_STEP);
        while !self.runner.output_closed() {
            if self.sink.client_gone() {
                return Err(RelayError::ClientDisconnected);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                warn!(
                    limit = ?self.options.drain_timeout,
                    "helper output still open after exit; dropping the rest"
                );
                break;
            }
            let rest = self.runner.drain_remaining(step.min(deadline - now)).await?;
            self.process_bytes(&rest).await?;
        }
        Ok(())
    }

    async fn process_bytes(&mut self, bytes: &[u8]) -> Result<(), RelayError> {
        let lines: Vec<Line> = self.assembler.feed(bytes).collect();
        for line in lines {
            self.process_line(line).await?;
        }
        Ok(())
    }

    async fn process_line(&mut self, line: Line) -> Result<(), RelayError> {
        let extracted = self.extractor.push(&line);
        for event in self.translator.translate(extracted) {
            self.emit(&event).await?;
        }
        Ok(())
    }

    async fn emit(&mut self, event: &UiEvent) -> Result<(), RelayError> {
        debug!(?event, "emit");
        let chunk = self.renderer.render(event)?;
        self.sink.deliver(chunk).await
    }
}
