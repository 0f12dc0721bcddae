pub mod uci;

pub use uci::{EngineProcess, UciEngine};
