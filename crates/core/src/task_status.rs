//! Task lifecycle state machine and prompt status vocabulary.
//!
//! A task moves strictly forward: `draft -> pilot_passed -> frozen ->
//! completed`. There is no rollback and no cancellation.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Task status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Prompts generated and persisted; pilot not yet run.
    Draft,
    /// Pilot batch accepted by a worker.
    PilotPassed,
    /// Prompt set and workflow snapshot locked in.
    Frozen,
    /// Every mass prompt submitted.
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PilotPassed => "pilot_passed",
            Self::Frozen => "frozen",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "draft" => Ok(Self::Draft),
            "pilot_passed" => Ok(Self::PilotPassed),
            "frozen" => Ok(Self::Frozen),
            "completed" => Ok(Self::Completed),
            other => Err(CoreError::Validation(format!(
                "Unknown task status '{other}'"
            ))),
        }
    }

    /// The single status reachable from `self`, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Draft => Some(Self::PilotPassed),
            Self::PilotPassed => Some(Self::Frozen),
            Self::Frozen => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    pub fn can_transition(self, to: Self) -> bool {
        self.next() == Some(to)
    }

    /// Ensure `action` may run from the current status, i.e. the task is in
    /// `required`.
    pub fn require(self, action: &'static str, required: Self) -> Result<(), CoreError> {
        if self == required {
            Ok(())
        } else {
            Err(CoreError::InvalidState {
                action,
                status: self.as_str().to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Prompt modes
// ---------------------------------------------------------------------------

/// Worst-case prompt cloned for the pilot run.
pub const MODE_PILOT: &str = "pilot";
/// Regular prompt submitted during mass generation.
pub const MODE_MASS: &str = "mass";

// ---------------------------------------------------------------------------
// Prompt status
// ---------------------------------------------------------------------------

pub const PROMPT_DRAFT: &str = "draft";
/// Claimed by a generation run but not yet accepted by a worker.
pub const PROMPT_SUBMITTING: &str = "submitting";
pub const PROMPT_QUEUED: &str = "queued";
pub const PROMPT_RUNNING: &str = "running";
pub const PROMPT_COMPLETED: &str = "completed";
pub const PROMPT_SUCCESS: &str = "success";
pub const PROMPT_FAILED: &str = "failed";
pub const PROMPT_ERROR: &str = "error";

/// Statuses after which polling stops.
pub const TERMINAL_PROMPT_STATUSES: &[&str] =
    &[PROMPT_COMPLETED, PROMPT_SUCCESS, PROMPT_FAILED, PROMPT_ERROR];

pub fn is_terminal_prompt_status(status: &str) -> bool {
    TERMINAL_PROMPT_STATUSES.contains(&status)
}

pub fn is_successful_prompt_status(status: &str) -> bool {
    matches!(status, PROMPT_COMPLETED | PROMPT_SUCCESS)
}

pub fn is_failed_prompt_status(status: &str) -> bool {
    matches!(status, PROMPT_FAILED | PROMPT_ERROR)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn forward_chain() {
        assert!(TaskStatus::Draft.can_transition(TaskStatus::PilotPassed));
        assert!(TaskStatus::PilotPassed.can_transition(TaskStatus::Frozen));
        assert!(TaskStatus::Frozen.can_transition(TaskStatus::Completed));
    }

    #[test]
    fn no_skips_or_reversals() {
        assert!(!TaskStatus::Draft.can_transition(TaskStatus::Frozen));
        assert!(!TaskStatus::Frozen.can_transition(TaskStatus::Draft));
        assert!(!TaskStatus::Completed.can_transition(TaskStatus::Draft));
        assert_eq!(TaskStatus::Completed.next(), None);
    }

    #[test]
    fn require_reports_current_status() {
        assert_matches!(
            TaskStatus::Draft.require("freeze", TaskStatus::PilotPassed),
            Err(CoreError::InvalidState { action: "freeze", status }) if status == "draft"
        );
        assert!(TaskStatus::Frozen.require("generate", TaskStatus::Frozen).is_ok());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            TaskStatus::Draft,
            TaskStatus::PilotPassed,
            TaskStatus::Frozen,
            TaskStatus::Completed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(TaskStatus::parse("generating").is_err());
    }

    #[test]
    fn terminal_prompt_statuses() {
        assert!(is_terminal_prompt_status("completed"));
        assert!(is_terminal_prompt_status("error"));
        assert!(!is_terminal_prompt_status("running"));
        assert!(is_failed_prompt_status("failed"));
        assert!(is_successful_prompt_status("success"));
    }
}
