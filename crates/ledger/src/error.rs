//! Error types for ledger operations

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Ledger errors
///
/// Every operation surfaces its failure as one of these kinds; the caller
/// maps them onto transport responses via [`LedgerError::status_code`].
#[derive(Error, Debug)]
pub enum LedgerError {
    // ========== Validation / conflict ==========
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Already joined this event")]
    AlreadyJoined,

    #[error("Already on a team")]
    AlreadyOnTeam,

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Capacity reached: {0}")]
    CapacityReached(String),

    #[error("Insufficient balance: budget {budget}, committed {committed}, requested {requested}")]
    InsufficientBalance {
        budget: i64,
        committed: i64,
        requested: i64,
    },

    #[error("Team cap exceeded: cap {cap}, requested {requested}")]
    ExceedsTeamCap { cap: i64, requested: i64 },

    #[error("Special reward already assigned to another team: {}", rewards.join(", "))]
    RewardAlreadyAssigned { rewards: Vec<String> },

    #[error("Event is not in its active window")]
    EventNotActive,

    // ========== Authorization ==========
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid invite token")]
    InvalidToken,

    #[error("Invalid join signature")]
    InvalidSignature,

    // ========== Missing entities ==========
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    // ========== Storage ==========
    #[error("Database error: {0}")]
    Storage(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
}

impl LedgerError {
    pub fn not_found(what: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            what,
            id: id.to_string(),
        }
    }

    /// HTTP-style status the transport layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            LedgerError::InvalidInput(_)
            | LedgerError::AlreadyJoined
            | LedgerError::AlreadyOnTeam
            | LedgerError::AlreadyExists(_)
            | LedgerError::CapacityReached(_)
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::ExceedsTeamCap { .. }
            | LedgerError::RewardAlreadyAssigned { .. }
            | LedgerError::EventNotActive => 400,
            LedgerError::Forbidden(_)
            | LedgerError::InvalidToken
            | LedgerError::InvalidSignature => 403,
            LedgerError::NotFound { .. } => 404,
            LedgerError::Storage(_) | LedgerError::Pool(_) => 500,
        }
    }

    /// Machine-checkable kind tag, stable across message wording changes
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidInput(_) => "invalid_input",
            LedgerError::AlreadyJoined => "already_joined",
            LedgerError::AlreadyOnTeam => "already_on_team",
            LedgerError::AlreadyExists(_) => "already_exists",
            LedgerError::CapacityReached(_) => "capacity_reached",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::ExceedsTeamCap { .. } => "exceeds_team_cap",
            LedgerError::RewardAlreadyAssigned { .. } => "reward_already_assigned",
            LedgerError::EventNotActive => "event_not_active",
            LedgerError::Forbidden(_) => "forbidden",
            LedgerError::InvalidToken => "invalid_token",
            LedgerError::InvalidSignature => "invalid_signature",
            LedgerError::NotFound { .. } => "not_found",
            LedgerError::Storage(_) | LedgerError::Pool(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(LedgerError::AlreadyJoined.status_code(), 400);
        assert_eq!(
            LedgerError::InsufficientBalance {
                budget: 100,
                committed: 60,
                requested: 50
            }
            .status_code(),
            400
        );
        assert_eq!(
            LedgerError::Forbidden("not a leader".into()).status_code(),
            403
        );
        assert_eq!(LedgerError::InvalidToken.status_code(), 403);
        assert_eq!(LedgerError::not_found("team", "x").status_code(), 404);
    }

    #[test]
    fn test_reward_conflict_lists_names() {
        let err = LedgerError::RewardAlreadyAssigned {
            rewards: vec!["Best Demo".into(), "Crowd Favorite".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Best Demo"));
        assert!(msg.contains("Crowd Favorite"));
        assert_eq!(err.kind(), "reward_already_assigned");
    }

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(LedgerError::EventNotActive.kind(), "event_not_active");
        assert_eq!(LedgerError::AlreadyOnTeam.kind(), "already_on_team");
        assert_eq!(
            LedgerError::CapacityReached("max teams".into()).kind(),
            "capacity_reached"
        );
    }
}
