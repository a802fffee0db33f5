//! Error taxonomy for the runtime.
//!
//! Construction-time failures (`UnsupportedEnvironment`, `SourceUnavailable`,
//! `TargetDatabase`, `Viewport`) are returned from `start_session`. Per-tick
//! `TrackerProcessing` failures are recovered by the frame loop and never
//! reach the caller.

use crate::tracker::TrackerId;

/// Errors produced while building or validating a reference database.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("duplicate target name \"{0}\"")]
    DuplicateTargetName(String),
    #[error("invalid target \"{name}\": {reason}")]
    InvalidTarget { name: String, reason: String },
    #[error("reference database is locked while its tracker is running")]
    Locked,
    #[error("reference database is empty")]
    Empty,
    #[error("detector rejected the reference targets: {0}")]
    Untrainable(String),
}

/// Top-level runtime error.
#[derive(thiserror::Error, Debug)]
pub enum ArError {
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),
    #[error("source {source_index} unavailable: {reason}")]
    SourceUnavailable { source_index: usize, reason: String },
    #[error("target database error: {0}")]
    TargetDatabase(#[from] DatabaseError),
    #[error("tracker {tracker} failed to process sample: {reason}")]
    TrackerProcessing { tracker: TrackerId, reason: String },
    #[error("viewport error: {0}")]
    Viewport(String),
    #[error("invalid session options: {0}")]
    InvalidOptions(String),
    #[error("operation not allowed in state {0}")]
    InvalidState(&'static str),
}

impl ArError {
    /// Fatal errors abort session start; recoverable ones are absorbed by the loop.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ArError::TrackerProcessing { .. })
    }
}

pub type ArResult<T> = std::result::Result<T, ArError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_converts_into_runtime_error() {
        let err: ArError = DatabaseError::DuplicateTargetName("mage".into()).into();
        assert!(matches!(
            err,
            ArError::TargetDatabase(DatabaseError::DuplicateTargetName(ref n)) if n == "mage"
        ));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_processing_error_is_recoverable() {
        let err = ArError::TrackerProcessing {
            tracker: TrackerId::new(2),
            reason: "backend crashed".into(),
        };
        assert!(err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "tracker T2 failed to process sample: backend crashed"
        );
    }
}
