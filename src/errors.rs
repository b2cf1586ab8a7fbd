//! Typed error hierarchy for bunnify.
//!
//! - `ValidationError`: review request parameters rejected before spawning
//! - `SpawnError`: the helper process could not be started
//! - `RelayError`: failures while a relay is streaming
//! - `BookmarkError`: the bookmarks file could not be loaded
//! - `ExpandError`: a bookmark URL is missing parameter values

use std::path::PathBuf;

use thiserror::Error;

/// A review request whose parameters failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("PR number is required. Usage: /review-pr/?pr=12345&repo=owner/name")]
    MissingPrNumber,

    #[error("PR number must be numeric, got '{0}'")]
    NonNumericPrNumber(String),

    #[error("Repository must be in format 'owner/name', got '{0}'")]
    MalformedRepo(String),
}

/// The helper process could not be launched.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("Helper not found at {}", path.display())]
    HelperMissing { path: PathBuf },

    #[error("Failed to create output pipe: {0}")]
    Pipe(#[source] std::io::Error),

    #[error("Failed to start output reader: {0}")]
    Reader(#[source] std::io::Error),

    #[error("Failed to spawn helper {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures that end a running relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Real read failure on the helper's output.
    #[error("Failed to read helper output: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to poll helper status: {0}")]
    Poll(#[source] std::io::Error),

    #[error("Failed to render event: {0}")]
    Render(#[source] serde_json::Error),

    /// The client went away. Not reported to anyone, only triggers cleanup.
    #[error("Client disconnected")]
    ClientDisconnected,
}

/// Errors from loading or querying bookmarks.
#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("Failed to read bookmarks file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in bookmarks file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bookmarks file must contain a JSON object at the top level")]
    NotAnObject,

    #[error("Bookmark '{0}' must be a JSON object")]
    NotABookmark(String),

    #[error("Invalid bookmark key '{0}': keys may only contain letters, digits and '_'")]
    InvalidKey(String),

    #[error("Bookmark '{key}' is missing required field '{field}'")]
    MissingField { key: String, field: &'static str },

    #[error("Bookmark '{key}' has a non-string value for '{field}'")]
    WrongType { key: String, field: &'static str },

    #[error("Bookmark key \"{0}\" is reserved and cannot be used. Reserved keywords: h, help")]
    ReservedKey(String),
}

/// A bookmark URL could not be filled in from the values given.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    #[error("Bookmark '{key}' requires a parameter.\nUsage: {key} <value>")]
    ParameterRequired { key: String },

    #[error("Bookmark '{key}' requires parameter(s): {}\nUsage: {usage}", .required.join(", "))]
    ParametersRequired {
        key: String,
        required: Vec<String>,
        usage: String,
    },

    #[error("Missing required parameter: {name}\nUsage: /{key}/?{name}=value")]
    MissingQueryParameter { key: String, name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_messages_name_the_input() {
        let err = ValidationError::NonNumericPrNumber("12a".into());
        assert!(err.to_string().contains("12a"));

        let err = ValidationError::MalformedRepo("bad repo".into());
        assert!(err.to_string().contains("owner/name"));
        assert!(err.to_string().contains("bad repo"));
    }

    #[test]
    fn spawn_error_helper_missing_carries_path() {
        let err = SpawnError::HelperMissing {
            path: PathBuf::from("/opt/helper.sh"),
        };
        match &err {
            SpawnError::HelperMissing { path } => {
                assert_eq!(path, &PathBuf::from("/opt/helper.sh"));
            }
            _ => panic!("Expected HelperMissing"),
        }
        assert!(err.to_string().contains("/opt/helper.sh"));
    }

    #[test]
    fn spawn_error_keeps_io_source() {
        use std::error::Error as _;
        let err = SpawnError::Spawn {
            path: PathBuf::from("helper"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let source = err.source().expect("source");
        assert!(source.to_string().contains("denied"));
    }

    #[test]
    fn relay_error_read_is_matchable() {
        let err = RelayError::Read(std::io::Error::other("broken pipe"));
        assert!(matches!(err, RelayError::Read(_)));
        assert!(err.to_string().contains("broken pipe"));
    }

    #[test]
    fn bookmark_error_converts_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: BookmarkError = json_err.into();
        assert!(matches!(err, BookmarkError::Json(_)));
    }

    #[test]
    fn expand_error_messages_include_usage() {
        let err = ExpandError::ParametersRequired {
            key: "pr".into(),
            required: vec!["id".into(), "repo".into()],
            usage: "pr <id> <repo>".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("requires parameter(s): id, repo"));
        assert!(msg.ends_with("Usage: pr <id> <repo>"));

        let err = ExpandError::MissingQueryParameter {
            key: "g".into(),
            name: "q".into(),
        };
        assert_eq!(
            err.to_string(),
            "Missing required parameter: q\nUsage: /g/?q=value"
        );
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ValidationError::MissingPrNumber);
        assert_std_error(&SpawnError::HelperMissing {
            path: PathBuf::from("x"),
        });
        assert_std_error(&RelayError::ClientDisconnected);
        assert_std_error(&BookmarkError::NotAnObject);
        assert_std_error(&ExpandError::ParameterRequired { key: "g".into() });
    }
}
