pub mod archive;
pub mod broker;
pub mod clock;
pub mod notation;
pub mod rules;
pub mod session;
pub mod utils;

pub use archive::{ArchiveStore, ArchivedGame, JsonFileArchive, MemoryArchive};
pub use broker::{EngineBroker, EngineEvent, EngineTicket, RequestState, UciMove};
pub use clock::{ClockController, ManualTime, SystemTime, TimeSource};
pub use rules::{ChessRules, RulesEngine};
pub use session::{AppliedMove, EngineUpdate, GameSession, MoveSource, SessionSnapshot};
