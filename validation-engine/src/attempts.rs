//! Bounded-retry and override governance for one order's attempt history.
//!
//! The tracker owns no persistence. Callers pass the stored history in,
//! the tracker derives the current state, and every verdict is appended
//! as an immutable [`AttemptRecord`] whose number strictly increases and
//! never resets within an order's lifetime.

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{AttemptRecord, ValidationResult, ValidationStatus};

/// Where an order stands in the retry/override lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// No attempts recorded yet.
    FirstAttempt,
    /// At least one non-passing attempt, below the override threshold.
    Retrying,
    /// Enough non-passing attempts that an override may be authorized.
    OverrideEligible,
    /// The caller overrode a non-passing verdict; the order proceeds.
    Overridden,
    /// A passing verdict closed the order.
    Resolved,
}

impl AttemptState {
    /// Terminal states accept no further attempts or overrides.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Overridden | AttemptState::Resolved)
    }
}

/// Retry/override state machine for a single order.
#[derive(Debug)]
pub struct AttemptTracker {
    order_id: Uuid,
    history: Vec<AttemptRecord>,
    override_threshold: u32,
    min_justification_chars: usize,
}

impl AttemptTracker {
    pub fn new(order_id: Uuid, override_threshold: u32, min_justification_chars: usize) -> Self {
        Self {
            order_id,
            history: Vec::new(),
            override_threshold,
            min_justification_chars,
        }
    }

    /// Rebuilds the tracker from caller-persisted history. Attempt
    /// numbers must strictly increase; anything else is rejected before
    /// the pipeline runs.
    pub fn from_history(
        order_id: Uuid,
        history: Vec<AttemptRecord>,
        override_threshold: u32,
        min_justification_chars: usize,
    ) -> EngineResult<Self> {
        let mut previous = 0u32;
        for record in &history {
            if record.attempt_number <= previous {
                return Err(EngineError::InvalidRequest(format!(
                    "attempt history for order {} is not strictly increasing ({} after {})",
                    order_id, record.attempt_number, previous
                )));
            }
            previous = record.attempt_number;
        }
        Ok(Self {
            order_id,
            history,
            override_threshold,
            min_justification_chars,
        })
    }

    pub fn order_id(&self) -> Uuid {
        self.order_id
    }

    pub fn history(&self) -> &[AttemptRecord] {
        &self.history
    }

    pub fn latest(&self) -> Option<&AttemptRecord> {
        self.history.last()
    }

    /// Current lifecycle state, derived entirely from the history.
    pub fn state(&self) -> AttemptState {
        let Some(latest) = self.history.last() else {
            return AttemptState::FirstAttempt;
        };
        if latest.result.overridden {
            return AttemptState::Overridden;
        }
        if latest.result.status == ValidationStatus::Valid {
            return AttemptState::Resolved;
        }
        if latest.attempt_number >= self.override_threshold {
            AttemptState::OverrideEligible
        } else {
            AttemptState::Retrying
        }
    }

    pub fn next_attempt_number(&self) -> u32 {
        self.history
            .last()
            .map(|record| record.attempt_number + 1)
            .unwrap_or(1)
    }

    /// Appends a verdict to the history and returns the stored record.
    pub fn record_attempt(&mut self, dictation: &str, result: ValidationResult) -> &AttemptRecord {
        let record = AttemptRecord::new(self.next_attempt_number(), dictation, result);
        debug!(
            order_id = %self.order_id,
            attempt_number = record.attempt_number,
            status = %record.result.status,
            "Recorded validation attempt"
        );
        self.history.push(record);
        &self.history[self.history.len() - 1]
    }

    /// Gate for the explicit caller override action. Passes only in
    /// [`AttemptState::OverrideEligible`] with a justification of at
    /// least the configured length; rejections mutate nothing.
    pub fn authorize_override(&self, justification: &str) -> EngineResult<()> {
        if self.state() != AttemptState::OverrideEligible {
            let attempts = self.latest().map(|r| r.attempt_number).unwrap_or(0);
            return Err(EngineError::OverrideNotEligible {
                attempts,
                required: self.override_threshold,
            });
        }
        let length = justification.trim().chars().count();
        if length < self.min_justification_chars {
            return Err(EngineError::JustificationTooShort {
                length,
                minimum: self.min_justification_chars,
            });
        }
        info!(
            order_id = %self.order_id,
            attempts = self.latest().map(|r| r.attempt_number).unwrap_or(0),
            "Override authorized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    const JUSTIFICATION: &str = "Clinical urgency confirmed with the attending radiologist.";

    fn verdict(status: ValidationStatus, overridden: bool) -> ValidationResult {
        ValidationResult {
            status,
            feedback: "test feedback".to_string(),
            compliance_score: 4,
            suggested_diagnosis_codes: Vec::new(),
            suggested_procedure_codes: Vec::new(),
            overridden,
            provider: "test".to_string(),
            checked_at: Utc::now(),
        }
    }

    fn failing_history(attempts: u32) -> Vec<AttemptRecord> {
        (1..=attempts)
            .map(|n| {
                AttemptRecord::new(n, "dictation", verdict(ValidationStatus::Invalid, false))
            })
            .collect()
    }

    fn tracker(history: Vec<AttemptRecord>) -> AttemptTracker {
        AttemptTracker::from_history(Uuid::new_v4(), history, 3, 20)
            .expect("well-formed history")
    }

    #[test]
    fn test_empty_history_starts_at_first_attempt() {
        let tracker = tracker(Vec::new());
        assert_eq!(tracker.state(), AttemptState::FirstAttempt);
        assert_eq!(tracker.next_attempt_number(), 1);
    }

    #[test]
    fn test_failures_below_threshold_are_retrying() {
        let tracker = tracker(failing_history(2));
        assert_eq!(tracker.state(), AttemptState::Retrying);
        assert_eq!(tracker.next_attempt_number(), 3);
    }

    #[test]
    fn test_threshold_failures_unlock_override_eligibility() {
        let tracker = tracker(failing_history(3));
        assert_eq!(tracker.state(), AttemptState::OverrideEligible);
    }

    #[test]
    fn test_passing_verdict_resolves_from_any_depth() {
        let mut history = failing_history(4);
        history.push(AttemptRecord::new(
            5,
            "dictation",
            verdict(ValidationStatus::Valid, false),
        ));
        let tracker = tracker(history);
        assert_eq!(tracker.state(), AttemptState::Resolved);
        assert!(tracker.state().is_terminal());
    }

    #[test]
    fn test_override_result_is_terminal() {
        let mut history = failing_history(3);
        history.push(AttemptRecord::new(
            4,
            "dictation",
            verdict(ValidationStatus::Invalid, true),
        ));
        let tracker = tracker(history);
        assert_eq!(tracker.state(), AttemptState::Overridden);
        assert!(tracker.state().is_terminal());
    }

    #[test]
    fn test_history_must_strictly_increase() {
        for numbers in [vec![1, 1], vec![2, 1], vec![0]] {
            let history: Vec<AttemptRecord> = numbers
                .into_iter()
                .map(|n| {
                    AttemptRecord::new(n, "dictation", verdict(ValidationStatus::Invalid, false))
                })
                .collect();
            let result = AttemptTracker::from_history(Uuid::new_v4(), history, 3, 20);
            assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
        }
    }

    #[test]
    fn test_numbering_gaps_are_tolerated() {
        let history = vec![
            AttemptRecord::new(1, "dictation", verdict(ValidationStatus::Invalid, false)),
            AttemptRecord::new(4, "dictation", verdict(ValidationStatus::Invalid, false)),
        ];
        let tracker = tracker(history);
        assert_eq!(tracker.state(), AttemptState::OverrideEligible);
        assert_eq!(tracker.next_attempt_number(), 5);
    }

    #[test]
    fn test_record_attempt_appends_with_next_number() {
        let mut tracker = tracker(failing_history(1));
        let record =
            tracker.record_attempt("new dictation", verdict(ValidationStatus::Valid, false));
        assert_eq!(record.attempt_number, 2);
        assert_eq!(record.dictation_snapshot, "new dictation");
        assert_eq!(tracker.state(), AttemptState::Resolved);
        assert_eq!(tracker.history().len(), 2);
    }

    #[test]
    fn test_override_authorized_after_threshold_with_justification() {
        let tracker = tracker(failing_history(3));
        assert!(tracker.authorize_override(JUSTIFICATION).is_ok());
    }

    #[test]
    fn test_override_rejected_before_threshold() {
        let tracker = tracker(failing_history(1));
        match tracker.authorize_override(JUSTIFICATION) {
            Err(EngineError::OverrideNotEligible { attempts, required }) => {
                assert_eq!(attempts, 1);
                assert_eq!(required, 3);
            }
            other => panic!("expected OverrideNotEligible, got {other:?}"),
        }
    }

    #[test]
    fn test_short_justification_rejected() {
        let tracker = tracker(failing_history(3));
        match tracker.authorize_override("  too short  ") {
            Err(EngineError::JustificationTooShort { length, minimum }) => {
                assert_eq!(length, 9);
                assert_eq!(minimum, 20);
            }
            other => panic!("expected JustificationTooShort, got {other:?}"),
        }
    }

    #[test]
    fn test_terminal_states_refuse_override() {
        let mut history = failing_history(3);
        history.push(AttemptRecord::new(
            4,
            "dictation",
            verdict(ValidationStatus::Valid, false),
        ));
        let tracker = tracker(history);
        assert!(matches!(
            tracker.authorize_override(JUSTIFICATION),
            Err(EngineError::OverrideNotEligible { .. })
        ));
    }

    #[test]
    fn test_rejection_leaves_history_untouched() {
        let tracker = tracker(failing_history(1));
        let before = tracker.history().len();
        let _ = tracker.authorize_override(JUSTIFICATION);
        assert_eq!(tracker.history().len(), before);
    }
}
