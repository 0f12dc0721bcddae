use actix::Message;
use serde::{Deserialize, Serialize};

use crate::game::archive::ArchivedGame;
use crate::game::session::SessionSnapshot;
use crate::models::config::GameOptions;

/// Message sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ClientMessage {
    pub action: String,
    #[serde(default, alias = "from")]
    pub move_from: Option<String>,
    #[serde(default, alias = "to")]
    pub move_to: Option<String>,
    pub promotion: Option<String>,
    pub square: Option<String>,
    pub options: Option<GameOptions>,
}

/// Message sent from server to client
#[derive(Serialize, Debug, Clone, Default)]
pub struct ServerMessage {
    pub message_type: String,
    pub state: Option<SessionSnapshot>,
    pub error: Option<String>,
    pub available_moves: Option<Vec<AvailableMove>>,
    pub last_move: Option<LastMove>,
    pub game_status: Option<String>,
    pub color: Option<String>,
    pub progress: Option<u8>,
    pub options: Option<GameOptions>,
    pub archive: Option<Vec<ArchiveEntry>>,
}

impl ServerMessage {
    pub fn new(message_type: &str) -> Self {
        Self {
            message_type: message_type.to_string(),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new("error")
        }
    }

    pub fn state(snapshot: SessionSnapshot) -> Self {
        Self {
            state: Some(snapshot),
            ..Self::new("state")
        }
    }
}

/// Destination square offered for a selected piece
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AvailableMove {
    pub to: String,
    pub capture: bool,
}

/// Last move information
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LastMove {
    pub san: String,
    pub uci: String,
    pub color: String,
    pub engine: bool,
}

/// Archived game plus the fields the archive list displays
#[derive(Serialize, Debug, Clone)]
pub struct ArchiveEntry {
    #[serde(flatten)]
    pub game: ArchivedGame,
    pub played_at: String,
    pub analysis_url: String,
}

impl From<ArchivedGame> for ArchiveEntry {
    fn from(game: ArchivedGame) -> Self {
        Self {
            played_at: game.played_at(),
            analysis_url: game.analysis_url(),
            game,
        }
    }
}

/// Message type for WebSocket communication
#[derive(Message)]
#[rtype(result = "()")]
pub struct ChessWebSocketMessage(pub String);
