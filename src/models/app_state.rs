use actix::Addr;

use crate::models::config::ServerConfig;
use crate::websocket::SessionActor;

/// Application state shared between connections
pub struct AppState {
    pub session: Addr<SessionActor>,
    pub config: ServerConfig,
}
