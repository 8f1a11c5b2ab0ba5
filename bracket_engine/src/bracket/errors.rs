//! Bracket engine error types.

use thiserror::Error;

use super::models::{BracketId, CompetitorId, MatchId, MatchStatus};
use crate::db::StoreError;

/// Coarse classification callers map onto their own responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad generation parameters
    InvalidArgument,
    /// Operation not allowed in the match's current state
    InvalidState,
    /// The bracket graph does not accept the operation (double progression or generator defect)
    StructuralConflict,
    /// Referenced bracket or match does not exist
    NotFound,
    /// Concurrent write detected; the whole operation may be retried
    Conflict,
    /// Storage failure
    Internal,
}

/// Bracket engine errors
#[derive(Debug, Error)]
pub enum BracketError {
    #[error("Unsupported bracket size {0}: expected one of 4, 8, 16, 32")]
    UnsupportedBracketSize(u32),

    #[error("Invalid field size {0}: must be a power of two and at least 2")]
    InvalidFieldSize(usize),

    #[error("Insufficient competitors: need {needed}, have {current}")]
    NotEnoughCompetitors { needed: usize, current: usize },

    #[error("Competitor {0} is seeded more than once")]
    DuplicateCompetitor(CompetitorId),

    #[error("Match {match_id} is not completed (status: {status})")]
    MatchNotCompleted {
        match_id: MatchId,
        status: MatchStatus,
    },

    #[error("Match {0} has no winner")]
    MissingWinner(MatchId),

    #[error("Match {0} is missing an opponent")]
    MissingOpponent(MatchId),

    #[error("Competitor {winner} is not playing in match {match_id}")]
    WinnerNotInMatch {
        match_id: MatchId,
        winner: CompetitorId,
    },

    #[error("Match {0} already has a result")]
    AlreadyCompleted(MatchId),

    #[error("Match {match_id} cannot move from {from} to {to}")]
    InvalidStatusChange {
        match_id: MatchId,
        from: MatchStatus,
        to: MatchStatus,
    },

    #[error("Match {0} already has both slots filled")]
    SlotsFull(MatchId),

    #[error("Competitor {competitor} already sits in match {match_id}")]
    AlreadyAdvanced {
        match_id: MatchId,
        competitor: CompetitorId,
    },

    #[error("Grand finals bracket {0} already has a reset match")]
    ResetAlreadyExists(BracketId),

    #[error("Bracket not found: {0}")]
    BracketNotFound(BracketId),

    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl BracketError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BracketError::UnsupportedBracketSize(_)
            | BracketError::InvalidFieldSize(_)
            | BracketError::NotEnoughCompetitors { .. }
            | BracketError::DuplicateCompetitor(_) => ErrorKind::InvalidArgument,
            BracketError::MatchNotCompleted { .. }
            | BracketError::MissingWinner(_)
            | BracketError::MissingOpponent(_)
            | BracketError::WinnerNotInMatch { .. }
            | BracketError::AlreadyCompleted(_)
            | BracketError::InvalidStatusChange { .. } => ErrorKind::InvalidState,
            BracketError::SlotsFull(_)
            | BracketError::AlreadyAdvanced { .. }
            | BracketError::ResetAlreadyExists(_) => ErrorKind::StructuralConflict,
            BracketError::BracketNotFound(_) | BracketError::MatchNotFound(_) => {
                ErrorKind::NotFound
            }
            BracketError::Store(
                StoreError::VersionConflict { .. } | StoreError::DuplicateRow { .. },
            ) => ErrorKind::Conflict,
            BracketError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Whether rerunning the whole operation can succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Get a client-safe error message
    ///
    /// Storage errors are sanitized so SQL details never leave the process.
    pub fn client_message(&self) -> String {
        match self {
            BracketError::Store(
                StoreError::VersionConflict { .. } | StoreError::DuplicateRow { .. },
            ) => "Bracket was modified concurrently, try again".to_string(),
            BracketError::Store(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for bracket operations
pub type BracketResult<T> = Result<T, BracketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            BracketError::UnsupportedBracketSize(6).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(BracketError::MissingWinner(1).kind(), ErrorKind::InvalidState);
        assert_eq!(
            BracketError::SlotsFull(4).kind(),
            ErrorKind::StructuralConflict
        );
        assert_eq!(BracketError::MatchNotFound(4).kind(), ErrorKind::NotFound);
        assert_eq!(
            BracketError::Store(StoreError::VersionConflict {
                match_id: 4,
                expected: 2
            })
            .kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        let conflict = BracketError::Store(StoreError::VersionConflict {
            match_id: 1,
            expected: 1,
        });
        assert!(conflict.is_retryable());
        assert!(!BracketError::SlotsFull(1).is_retryable());
        assert!(!BracketError::Store(StoreError::Decode("bad".to_string())).is_retryable());
    }

    #[test]
    fn test_lost_insert_race_is_retryable() {
        let err = BracketError::Store(StoreError::DuplicateRow {
            constraint: "ux_matches_bracket_reset".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
        assert_eq!(
            err.client_message(),
            "Bracket was modified concurrently, try again"
        );
    }

    #[test]
    fn test_client_message_hides_storage_details() {
        let err = BracketError::Store(StoreError::Decode("column slot_a_state".to_string()));
        assert_eq!(err.client_message(), "Internal server error");

        let err = BracketError::NotEnoughCompetitors {
            needed: 2,
            current: 1,
        };
        assert_eq!(err.client_message(), "Insufficient competitors: need 2, have 1");
    }
}
