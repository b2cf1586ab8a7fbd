//! Marker-delimited payload extraction.
//!
//! The helper prints free-form progress text, then the result between two
//! marker lines:
//!
//! ```text
//! Posting review request...
//! ---PAYLOAD_START---
//! <payload>
//! ---PAYLOAD_END---
//! Cleaning up...
//! ```
//!
//! [`PayloadExtractor`] consumes one [`Line`] at a time and tells the caller
//! what that line was.

use tracing::warn;

use super::lines::Line;

pub const DEFAULT_START_MARKER: &str = "---PAYLOAD_START---";
pub const DEFAULT_END_MARKER: &str = "---PAYLOAD_END---";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    Scanning,
    Capturing,
}

/// What a single line turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Ordinary output seen while scanning.
    Log(String),
    /// The start marker; capture begins with the next line.
    PayloadStarted,
    /// A line appended to the payload being captured.
    Captured,
    /// The end marker, with the finished payload text.
    PayloadReady(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub start: String,
    pub end: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_MARKER.to_string(),
            end: DEFAULT_END_MARKER.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct PayloadExtractor {
    markers: Markers,
    state: ExtractionState,
    payload: String,
    completed: usize,
}

impl PayloadExtractor {
    pub fn new(markers: Markers) -> Self {
        Self {
            markers,
            state: ExtractionState::Scanning,
            payload: String::new(),
            completed: 0,
        }
    }

    pub fn state(&self) -> ExtractionState {
        self.state
    }

    /// Number of payload sections closed by an end marker so far.
    pub fn completed_payloads(&self) -> usize {
        self.completed
    }

    pub fn push(&mut self, line: &Line) -> Extracted {
        match self.state {
            ExtractionState::Scanning => {
                if line.text.contains(&self.markers.start) {
                    self.state = ExtractionState::Capturing;
                    Extracted::PayloadStarted
                } else {
                    Extracted::Log(line.text.clone())
                }
            }
            ExtractionState::Capturing => {
                if line.text.contains(&self.markers.end) {
                    self.state = ExtractionState::Scanning;
                    self.completed += 1;
                    let payload = strip_blank_lines(&std::mem::take(&mut self.payload));
                    Extracted::PayloadReady(payload)
                } else {
                    self.payload.push_str(&line.text);
                    self.payload.push_str(line.ending.as_str());
                    Extracted::Captured
                }
            }
        }
    }

    /// Close out extraction once the helper has exited.
    ///
    /// A payload still being captured is discarded. Returns whether any
    /// payload was completed during the run.
    pub fn finish(&mut self) -> bool {
        if self.state == ExtractionState::Capturing {
            warn!(
                captured_bytes = self.payload.len(),
                "helper exited before the payload end marker; discarding partial payload"
            );
            self.payload.clear();
            self.state = ExtractionState::Scanning;
        }
        self.completed > 0
    }
}

impl Default for PayloadExtractor {
    fn default() -> Self {
        Self::new(Markers::default())
    }
}

/// Drop whitespace-only lines from both ends and the final terminator.
fn strip_blank_lines(text: &str) -> String {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return String::new();
    };
    let last = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);
    let joined: String = lines[first..=last].concat();
    joined
        .strip_suffix("\r\n")
        .or_else(|| joined.strip_suffix('\n'))
        .unwrap_or(joined.as_str())
        .to_string()
}
