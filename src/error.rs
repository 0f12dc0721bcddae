use chess::Color;

use crate::game::utils::color_name;

/// Why a move was not applied. The session state is unchanged whenever one
/// of these is returned, except for `ClockExpired`, which ends the game.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectedMove {
    #[error("game is already over")]
    GameOver,

    #[error("illegal move {from}{to}")]
    Illegal { from: String, to: String },

    #[error("not a square: {0}")]
    BadSquare(String),

    #[error("not a promotion piece: {0}")]
    BadPromotion(char),

    #[error("clock ran out before the move was made")]
    ClockExpired,

    #[error("engine move does not belong to {}", color_name(*.0))]
    StaleEngineMove(Color),
}

/// Failures of the external analysis engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no engine available: {0}")]
    Unavailable(String),

    #[error("game is already over")]
    GameOver,

    #[error("{} has no engine moves left", color_name(*.0))]
    BudgetExhausted(Color),

    #[error("engine i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive is not valid json: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}
