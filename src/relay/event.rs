use serde::{Deserialize, Serialize};

/// A coarse progress stage shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// Stable machine-readable tag, e.g. `waiting`.
    pub tag: String,
    /// Human-readable status text.
    pub label: String,
}

impl Phase {
    pub fn new(tag: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            label: label.into(),
        }
    }

    /// Phase entered when the payload start marker is seen.
    pub fn capturing() -> Self {
        Self::new("capturing", "Processing review...")
    }
}

/// One unit of progress delivered to the client, in production order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    LogLine {
        text: String,
    },
    PhaseUpdate {
        phase: Phase,
    },
    PayloadReady {
        text: String,
    },
    ProcessFinished {
        had_payload: bool,
        exit_code: Option<i32>,
    },
    RelayError {
        message: String,
    },
}

impl UiEvent {
    /// Whether the stream ends after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UiEvent::ProcessFinished { .. } | UiEvent::RelayError { .. }
        )
    }
}
