//! Error types surfaced to the device that initiated an action.

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for lobby and round commands
pub type GameResult<T> = Result<T, GameError>;

/// Failures reported by a [`crate::store::RowStore`] backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("row not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Backend(String),
}

/// Errors that can occur while driving a lobby or a round
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Bad name, empty message, unknown room
    #[error("{0}")]
    Validation(String),

    /// Vote cap reached or too few ready players
    #[error("{0}")]
    Capacity(String),

    /// Action requested in the wrong round state
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Shared store is not configured. Multi-device mode is unavailable.")]
    NotConfigured,
}

impl GameError {
    /// Short machine-readable code, mirrors the variant
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Validation(_) => "VALIDATION",
            GameError::Capacity(_) => "CAPACITY",
            GameError::Precondition(_) => "PRECONDITION",
            GameError::Store(_) => "STORE",
            GameError::NotConfigured => "NOT_CONFIGURED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_converts() {
        let err: GameError = StoreError::Unavailable("timeout".to_string()).into();
        assert_eq!(err.code(), "STORE");
        assert_eq!(err.to_string(), "store unavailable: timeout");
    }

    #[test]
    fn test_user_facing_messages() {
        let err = GameError::Capacity("You can only vote for up to 2 players.".to_string());
        assert_eq!(err.to_string(), "You can only vote for up to 2 players.");
        assert!(GameError::NotConfigured.to_string().contains("not configured"));
    }
}
