pub mod handler;
pub mod session_actor;

pub use handler::{ws_index, ChessWebSocket};
pub use session_actor::{ClientCommand, Connect, Disconnect, ListArchive, SessionActor};
