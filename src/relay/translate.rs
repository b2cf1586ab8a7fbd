//! Mapping from extracted lines to UI events.
//!
//! Coarse progress comes from an ordered [`PhaseTable`] of substring triggers
//! matched against log lines. The table is data, so a helper that words its
//! output differently only needs a different table.

use serde::{Deserialize, Serialize};

use super::event::{Phase, UiEvent};
use super::extract::Extracted;

/// One `trigger substring → phase` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRule {
    pub trigger: String,
    pub tag: String,
    pub label: String,
}

impl PhaseRule {
    pub fn new(trigger: &str, tag: &str, label: &str) -> Self {
        Self {
            trigger: trigger.to_string(),
            tag: tag.to_string(),
            label: label.to_string(),
        }
    }

    fn phase(&self) -> Phase {
        Phase::new(&self.tag, &self.label)
    }
}

/// Ordered trigger table. The first rule whose trigger occurs in a line wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTable {
    rules: Vec<PhaseRule>,
}

impl PhaseTable {
    pub fn new(rules: Vec<PhaseRule>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn rules(&self) -> &[PhaseRule] {
        &self.rules
    }

    pub fn lookup(&self, line: &str) -> Option<Phase> {
        self.rules
            .iter()
            .find(|rule| line.contains(&rule.trigger))
            .map(PhaseRule::phase)
    }
}

impl Default for PhaseTable {
    fn default() -> Self {
        Self::new(vec![
            PhaseRule::new("Posting review request", "posting", "Posting review request..."),
            PhaseRule::new(
                "Waiting for Copilot",
                "waiting",
                "Waiting for Copilot response (max 60s)...",
            ),
            PhaseRule::new("Cleaning up", "cleaning_up", "Cleaning up..."),
            PhaseRule::new(
                "Copilot did not respond",
                "timed_out",
                "Copilot did not respond within timeout",
            ),
        ])
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventTranslator {
    phases: PhaseTable,
}

impl EventTranslator {
    pub fn new(phases: PhaseTable) -> Self {
        Self { phases }
    }

    /// Events for one extracted line, in the order they must be delivered.
    ///
    /// A log line comes before any phase change it triggers. Blank log lines
    /// produce nothing.
    pub fn translate(&self, extracted: Extracted) -> Vec<UiEvent> {
        match extracted {
            Extracted::Log(text) => {
                if text.trim().is_empty() {
                    return Vec::new();
                }
                let phase = self.phases.lookup(&text);
                let mut events = vec![UiEvent::LogLine { text }];
                if let Some(phase) = phase {
                    events.push(UiEvent::PhaseUpdate { phase });
                }
                events
            }
            Extracted::PayloadStarted => vec![UiEvent::PhaseUpdate {
                phase: Phase::capturing(),
            }],
            Extracted::Captured => Vec::new(),
            Extracted::PayloadReady(text) => vec![UiEvent::PayloadReady { text }],
        }
    }

    pub fn finished(&self, had_payload: bool, exit_code: Option<i32>) -> UiEvent {
        UiEvent::ProcessFinished {
            had_payload,
            exit_code,
        }
    }

    pub fn error(&self, message: impl Into<String>) -> UiEvent {
        UiEvent::RelayError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_line_without_trigger() {
        let translator = EventTranslator::default();
        let events = translator.translate(Extracted::Log("Fetching PR metadata".into()));
        assert_eq!(
            events,
            vec![UiEvent::LogLine {
                text: "Fetching PR metadata".into()
            }]
        );
    }

    #[test]
    fn test_trigger_emits_log_then_phase() {
        let translator = EventTranslator::default();
        let events =
            translator.translate(Extracted::Log("==> Waiting for Copilot to respond".into()));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], UiEvent::LogLine { .. }));
        match &events[1] {
            UiEvent::PhaseUpdate { phase } => assert_eq!(phase.tag, "waiting"),
            other => panic!("Expected PhaseUpdate, got {:?}", other),
        }
    }

    #[test]
    fn test_first_rule_in_table_order_wins() {
        let table = PhaseTable::new(vec![
            PhaseRule::new("Cleaning", "first", "First"),
            PhaseRule::new("Cleaning up", "second", "Second"),
        ]);
        assert_eq!(table.lookup("Cleaning up...").unwrap().tag, "first");
        // Only one phase even when both triggers occur
        let translator = EventTranslator::new(table);
        let events = translator.translate(Extracted::Log("Cleaning up...".into()));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_blank_log_lines_are_dropped() {
        let translator = EventTranslator::default();
        assert!(translator.translate(Extracted::Log(String::new())).is_empty());
        assert!(translator.translate(Extracted::Log("  \t".into())).is_empty());
    }

    #[test]
    fn test_captured_lines_produce_nothing() {
        let translator = EventTranslator::default();
        assert!(translator.translate(Extracted::Captured).is_empty());
    }

    #[test]
    fn test_payload_events() {
        let translator = EventTranslator::default();
        assert_eq!(
            translator.translate(Extracted::PayloadStarted),
            vec![UiEvent::PhaseUpdate {
                phase: Phase::capturing()
            }]
        );
        assert_eq!(
            translator.translate(Extracted::PayloadReady("LGTM".into())),
            vec![UiEvent::PayloadReady {
                text: "LGTM".into()
            }]
        );
    }

    #[test]
    fn test_empty_table_never_matches() {
        let translator = EventTranslator::new(PhaseTable::empty());
        let events = translator.translate(Extracted::Log("Posting review request".into()));
        assert_eq!(events.len(), 1);
    }
}
