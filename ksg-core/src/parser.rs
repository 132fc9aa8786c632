//! Deterministic parser (C8, spec §4.8): rule-based intent classification
//! for obvious inputs, so the agent loop can short-circuit full LLM
//! planning when confidence is high.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Classification outcomes (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    TaskCreate,
    Reminder,
    CalendarCreate,
    Recall,
    Ambiguous,
}

#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
}

/// Confidence floor at which the agent loop may skip LLM planning
/// entirely (spec §4.8, §4.9 `SKIP_LLM_FOR_OBVIOUS_INTENTS`).
pub const SHORT_CIRCUIT_CONFIDENCE: f32 = 0.9;

struct Rule {
    intent: Intent,
    confidence: f32,
    pattern: Regex,
}

/// Ordered, priority-first rule set. The first confident match wins
/// (spec §4.8) — recall and reminder patterns are checked before the
/// more general task-creation fallback so "remind me to buy milk" isn't
/// misclassified as a bare task.
pub struct DeterministicParser {
    rules: Vec<Rule>,
}

impl DeterministicParser {
    #[must_use]
    pub fn new() -> Self {
        let specs: &[(Intent, f32, &str)] = &[
            (
                Intent::Recall,
                0.95,
                r"(?i)\b(recall|remember|what (was|is) (my|the)|what did (i|you) (say|do)|show me (my|the) (steps|procedure|notes?))\b",
            ),
            (
                Intent::Reminder,
                0.95,
                r"(?i)\b(remind me|set a reminder|don'?t let me forget)\b",
            ),
            (
                Intent::CalendarCreate,
                0.93,
                r"(?i)\b(schedule|add to (my )?calendar|book (a )?(meeting|appointment)|calendar event)\b",
            ),
            (
                Intent::TaskCreate,
                0.9,
                r"(?i)^(log ?in|sign ?in|fill (out|in)|submit|create|add|buy|order|pay|send|book)\b",
            ),
        ];
        let rules = specs
            .iter()
            .map(|(intent, confidence, pattern)| Rule {
                intent: *intent,
                confidence: *confidence,
                pattern: Regex::new(pattern).expect("static pattern is valid"),
            })
            .collect();
        Self { rules }
    }

    /// Classifies raw user text. Falls through to `Ambiguous` at low
    /// confidence when no rule matches (spec §4.8).
    #[must_use]
    pub fn classify(&self, text: &str) -> Classification {
        for rule in &self.rules {
            if rule.pattern.is_match(text) {
                return Classification {
                    intent: rule.intent,
                    confidence: rule.confidence,
                };
            }
        }
        Classification {
            intent: Intent::Ambiguous,
            confidence: 0.3,
        }
    }
}

impl Default for DeterministicParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminder_is_classified_with_high_confidence() {
        let parser = DeterministicParser::new();
        let c = parser.classify("remind me to drink water in an hour");
        assert_eq!(c.intent, Intent::Reminder);
        assert!(c.confidence >= SHORT_CIRCUIT_CONFIDENCE);
    }

    #[test]
    fn recall_keywords_take_priority_over_task_create() {
        let parser = DeterministicParser::new();
        let c = parser.classify("recall the steps for logging into example.com");
        assert_eq!(c.intent, Intent::Recall);
    }

    #[test]
    fn calendar_phrasing_is_detected() {
        let parser = DeterministicParser::new();
        let c = parser.classify("schedule a meeting with Sam tomorrow at 3pm");
        assert_eq!(c.intent, Intent::CalendarCreate);
    }

    #[test]
    fn unrecognized_text_is_ambiguous_and_below_threshold() {
        let parser = DeterministicParser::new();
        let c = parser.classify("tell me something interesting about whales");
        assert_eq!(c.intent, Intent::Ambiguous);
        assert!(c.confidence < SHORT_CIRCUIT_CONFIDENCE);
    }

    #[test]
    fn log_in_request_is_task_create() {
        let parser = DeterministicParser::new();
        let c = parser.classify("log into example.com with email ada@example.com and password hunter2");
        assert_eq!(c.intent, Intent::TaskCreate);
        assert!(c.confidence >= SHORT_CIRCUIT_CONFIDENCE);
    }
}
