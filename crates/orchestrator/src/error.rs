use datalabel_comfyui::api::ComfyUIApiError;
use datalabel_core::error::CoreError;

use crate::store::StoreError;

/// Errors surfaced by orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No healthy worker has free capacity")]
    NoWorkers,

    /// The worker stopped answering, or never freed capacity, while a
    /// submission was waiting on it.
    #[error("Worker '{worker}' is unavailable: {reason}")]
    Unavailable { worker: String, reason: String },

    /// A worker call failed for a reason other than memory pressure.
    #[error("Worker request failed: {0}")]
    Worker(#[from] ComfyUIApiError),

    #[error("Submission failed after {attempts} attempts: {source}")]
    SubmissionFailed {
        attempts: usize,
        #[source]
        source: ComfyUIApiError,
    },

    #[error("Pilot failed: {failed} of {total} pilot prompts did not succeed")]
    PilotFailed { failed: usize, total: usize },

    #[error("Generation queue is closed")]
    QueueClosed,
}

/// Coarse classification for callers that map errors onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request cannot succeed as sent (4xx).
    Client,
    /// Worker capacity or reachability; retry later (503).
    Unavailable,
    /// Persistence or other internal failure (500).
    Internal,
}

impl ErrorClass {
    pub fn status_code(self) -> u16 {
        match self {
            Self::Client => 400,
            Self::Unavailable => 503,
            Self::Internal => 500,
        }
    }
}

impl OrchestratorError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Core(_) => ErrorClass::Client,
            Self::Store(_) => ErrorClass::Internal,
            Self::NoWorkers
            | Self::Unavailable { .. }
            | Self::Worker(_)
            | Self::SubmissionFailed { .. }
            | Self::PilotFailed { .. }
            | Self::QueueClosed => ErrorClass::Unavailable,
        }
    }

    /// Not-found errors map to 404 rather than the generic client status.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Core(CoreError::NotFound { .. }) => 404,
            Self::Core(CoreError::InvalidState { .. }) => 409,
            other => other.class().status_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        let not_found = OrchestratorError::Core(CoreError::NotFound {
            entity: "task",
            id: 7,
        });
        assert_eq!(not_found.class(), ErrorClass::Client);
        assert_eq!(not_found.status_code(), 404);

        let invalid = OrchestratorError::Core(CoreError::InvalidState {
            action: "freeze",
            status: "draft".into(),
        });
        assert_eq!(invalid.status_code(), 409);

        let limit = OrchestratorError::Core(CoreError::BatchLimit {
            requested: 8,
            max: 4,
        });
        assert_eq!(limit.status_code(), 400);
    }

    #[test]
    fn worker_errors_map_to_503() {
        assert_eq!(OrchestratorError::NoWorkers.status_code(), 503);
        let oom = OrchestratorError::SubmissionFailed {
            attempts: 3,
            source: ComfyUIApiError::ApiError {
                status: 500,
                body: "out of memory".into(),
            },
        };
        assert_eq!(oom.class(), ErrorClass::Unavailable);
    }

    #[test]
    fn store_errors_are_internal() {
        let err = OrchestratorError::Store(StoreError::Missing {
            entity: "worker",
            id: 1,
        });
        assert_eq!(err.status_code(), 500);
    }
}
