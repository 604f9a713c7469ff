// GestureGate - Gesture Sequence Validator
//
// Cyclic state machine over the configured label list. The only state is the
// cursor. A match advances it (wrapping to 0 after the last label), a
// mismatch either holds it or sends it back to 0 depending on the policy.

use serde::Deserialize;

use crate::classify::ClassificationResult;
use crate::events::FeedbackDecision;

/// What a mismatch does to the cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Cursor stays where it is; the user retries the same gesture.
    #[default]
    Hold,
    /// Cursor goes back to the first label.
    Reset,
}

#[derive(Debug, Clone)]
pub struct SequenceValidator {
    expected: Vec<String>,
    cursor: usize,
    policy: MismatchPolicy,
    unknown_label: String,
    completed_cycles: u64,
}

impl SequenceValidator {
    /// Returns `None` for an empty label list: a cursor over nothing has no
    /// valid state.
    pub fn new(
        expected: Vec<String>,
        policy: MismatchPolicy,
        unknown_label: impl Into<String>,
    ) -> Option<Self> {
        if expected.is_empty() {
            return None;
        }
        Some(Self {
            expected,
            cursor: 0,
            policy,
            unknown_label: unknown_label.into(),
            completed_cycles: 0,
        })
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn expected_label(&self) -> &str {
        &self.expected[self.cursor]
    }

    pub fn len(&self) -> usize {
        self.expected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles
    }

    /// Apply one classification result. A result with no candidates is
    /// judged as the unknown label.
    pub fn validate(&mut self, result: &ClassificationResult) -> FeedbackDecision {
        let actual = match result.top() {
            Some((label, _)) => label.to_string(),
            None => self.unknown_label.clone(),
        };
        self.apply(actual)
    }

    /// Apply an already selected label.
    pub fn apply(&mut self, actual: String) -> FeedbackDecision {
        let expected = &self.expected[self.cursor];

        if actual == *expected {
            self.cursor = (self.cursor + 1) % self.expected.len();
            let completed = self.cursor == 0;
            if completed {
                self.completed_cycles += 1;
                log::info!(
                    "Gesture sequence completed ({} cycles so far)",
                    self.completed_cycles
                );
            } else {
                log::info!(
                    "Matched {:?}, next expected {:?} ({}/{})",
                    actual,
                    self.expected[self.cursor],
                    self.cursor,
                    self.expected.len()
                );
            }
            return FeedbackDecision::Matched {
                label: actual,
                completed,
            };
        }

        let decision = FeedbackDecision::Mismatched {
            expected: expected.clone(),
            actual,
        };
        if self.policy == MismatchPolicy::Reset && self.cursor != 0 {
            log::info!("Mismatch resets the sequence (was at {})", self.cursor);
            self.cursor = 0;
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Candidate;

    fn validator(policy: MismatchPolicy) -> SequenceValidator {
        let labels = ["default", "up-down", "left-right"]
            .iter()
            .map(|l| l.to_string())
            .collect();
        SequenceValidator::new(labels, policy, "unknown").unwrap()
    }

    fn result_for(label: &str) -> ClassificationResult {
        ClassificationResult::PlainLabel {
            candidates: vec![
                Candidate {
                    label: "noise".into(),
                    score: 0.05,
                },
                Candidate {
                    label: label.into(),
                    score: 0.9,
                },
            ],
            anomaly: None,
        }
    }

    fn mismatched(expected: &str, actual: &str) -> FeedbackDecision {
        FeedbackDecision::Mismatched {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(SequenceValidator::new(Vec::new(), MismatchPolicy::Hold, "unknown").is_none());
    }

    #[test]
    fn wrong_label_holds_cursor() {
        let mut v = validator(MismatchPolicy::Hold);

        assert_eq!(
            v.validate(&result_for("up-down")),
            mismatched("default", "up-down")
        );
        assert_eq!(v.cursor(), 0);
        assert_eq!(
            v.validate(&result_for("up-down")),
            mismatched("default", "up-down")
        );
        assert_eq!(v.cursor(), 0);

        assert!(v.validate(&result_for("default")).is_match());
        assert_eq!(v.cursor(), 1);
    }

    #[test]
    fn full_cycle_wraps_and_completes_once() {
        let mut v = validator(MismatchPolicy::Hold);
        let decisions: Vec<_> = ["default", "up-down", "left-right"]
            .iter()
            .map(|l| v.validate(&result_for(l)))
            .collect();

        let completions = decisions
            .iter()
            .filter(|d| matches!(d, FeedbackDecision::Matched { completed: true, .. }))
            .count();
        assert_eq!(completions, 1);
        assert_eq!(
            decisions[2],
            FeedbackDecision::Matched {
                label: "left-right".into(),
                completed: true
            }
        );
        assert_eq!(v.cursor(), 0);
        assert_eq!(v.completed_cycles(), 1);
    }

    #[test]
    fn empty_result_is_unknown_mismatch() {
        let mut v = validator(MismatchPolicy::Hold);
        v.validate(&result_for("default"));

        let empty = ClassificationResult::PlainLabel {
            candidates: Vec::new(),
            anomaly: None,
        };
        assert_eq!(v.validate(&empty), mismatched("up-down", "unknown"));
        assert_eq!(v.cursor(), 1);
    }

    #[test]
    fn reset_policy_returns_to_start() {
        let mut v = validator(MismatchPolicy::Reset);
        v.validate(&result_for("default"));
        v.validate(&result_for("up-down"));
        assert_eq!(v.cursor(), 2);

        assert_eq!(
            v.validate(&result_for("default")),
            mismatched("left-right", "default")
        );
        assert_eq!(v.cursor(), 0);
    }

    #[test]
    fn single_label_sequence_completes_every_match() {
        let mut v =
            SequenceValidator::new(vec!["default".into()], MismatchPolicy::Hold, "unknown")
                .unwrap();
        for _ in 0..3 {
            assert_eq!(
                v.apply("default".into()),
                FeedbackDecision::Matched {
                    label: "default".into(),
                    completed: true
                }
            );
        }
        assert_eq!(v.completed_cycles(), 3);
    }
}
