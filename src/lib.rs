//! Two-player clocked chess with a bounded number of engine hints per side.

pub mod engine;
pub mod error;
pub mod game;
pub mod models;
pub mod routes;
pub mod websocket;
