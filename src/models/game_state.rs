use chess::Color;

use crate::game::rules::RulesEngine;
use crate::game::utils::color_name;

/// Why a game ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Checkmate,
    Timeout,
    Stalemate,
    Repetition,
    InsufficientMaterial,
    FiftyMoveRule,
}

impl EndReason {
    pub fn describe(self) -> &'static str {
        match self {
            EndReason::Checkmate => "by checkmate",
            EndReason::Timeout => "on time",
            EndReason::Stalemate => "by stalemate",
            EndReason::Repetition => "by repetition",
            EndReason::InsufficientMaterial => "by insufficient material",
            EndReason::FiftyMoveRule => "by 50-move rule",
        }
    }
}

/// Final result; `winner` is `None` for a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOutcome {
    pub winner: Option<Color>,
    pub reason: EndReason,
}

impl GameOutcome {
    pub fn win(winner: Color, reason: EndReason) -> Self {
        Self {
            winner: Some(winner),
            reason,
        }
    }

    pub fn draw(reason: EndReason) -> Self {
        Self {
            winner: None,
            reason,
        }
    }

    pub fn winner_text(&self) -> String {
        match self.winner {
            Some(color) => format!("{} wins", color_name(color)),
            None => "Draw".to_string(),
        }
    }

    /// e.g. "Black wins on time"
    pub fn summary(&self) -> String {
        format!("{} {}", self.winner_text(), self.reason.describe())
    }
}

/// Result text archived for a game left unfinished
pub const ABANDONED: &str = "Game abandoned";

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingMove(Color),
    Terminal(GameOutcome),
}

/// Game state for the session: the position plus its result once over
pub struct GameState<R> {
    pub position: R,
    pub result: Option<GameOutcome>,
}

impl<R: RulesEngine> GameState<R> {
    pub fn new(position: R) -> Self {
        Self {
            position,
            result: None,
        }
    }

    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    pub fn move_count(&self) -> usize {
        self.position.move_history_length()
    }

    pub fn is_terminal(&self) -> bool {
        self.result.is_some()
    }

    pub fn phase(&self) -> SessionPhase {
        match self.result {
            Some(outcome) => SessionPhase::Terminal(outcome),
            None => SessionPhase::AwaitingMove(self.turn()),
        }
    }
}
