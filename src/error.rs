use crate::time::{Day, Month};
use crate::units::Units;

/// Every way a lifecycle operation can fail. Guard failures abort before any
/// mutation; conflicts are the only retryable class.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("leave module is disabled")]
    Disabled,
    #[error("{0}")]
    Validation(String),
    #[error("insufficient leave balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Units, available: Units },
    #[error("an overlapping leave request already exists ({id})")]
    Overlap { id: String },
    #[error("{entity} was modified concurrently; reload and retry")]
    VersionConflict { entity: &'static str },
    #[error("actor is not permitted to perform {permission} for this employee")]
    Forbidden { permission: String },
    #[error("month {month} is closed")]
    MonthClosed { month: Month },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("attendance sync failed for {date}: {detail}")]
    Attendance { date: Day, detail: String },
    #[error(transparent)]
    Storage(#[from] sled::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification for callers that map errors to a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Forbidden,
    NotFound,
    Internal,
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) | EngineError::InsufficientBalance { .. } => {
                ErrorKind::Validation
            }
            EngineError::Overlap { .. } | EngineError::VersionConflict { .. } => {
                ErrorKind::Conflict
            }
            EngineError::Disabled
            | EngineError::Forbidden { .. }
            | EngineError::MonthClosed { .. } => ErrorKind::Forbidden,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Attendance { .. }
            | EngineError::Storage(_)
            | EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Conflicts are safe to retry after the caller reloads; nothing else is.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<sled::transaction::TransactionError<EngineError>> for EngineError {
    fn from(err: sled::transaction::TransactionError<EngineError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => EngineError::Storage(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(
            EngineError::VersionConflict {
                entity: "leave request"
            }
            .is_retryable()
        );
        assert!(
            EngineError::Overlap {
                id: "leave_1xyz".into()
            }
            .is_retryable()
        );
        assert!(!EngineError::Disabled.is_retryable());
        assert!(!EngineError::validation("reason is required").is_retryable());
    }

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(
            EngineError::InsufficientBalance {
                requested: Units::from_whole_days(3),
                available: Units::half_day(),
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::NotFound {
                entity: "leave type",
                id: "lt_1abc".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EngineError::MonthClosed {
                month: Month {
                    year: 2026,
                    month: 1
                }
            }
            .kind(),
            ErrorKind::Forbidden
        );
    }
}
