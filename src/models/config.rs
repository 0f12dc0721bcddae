use chess::Color;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Time control and hint budget for one side
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideOptions {
    pub minutes: u8,
    pub increment_secs: u8,
    pub engine_moves: u8,
}

impl Default for SideOptions {
    fn default() -> Self {
        Self {
            minutes: 1,
            increment_secs: 1,
            engine_moves: 1,
        }
    }
}

impl SideOptions {
    pub const MINUTES: (u8, u8) = (1, 10);
    pub const INCREMENT: (u8, u8) = (0, 5);
    pub const ENGINE_MOVES: (u8, u8) = (0, 5);

    fn clamped(self) -> Self {
        Self {
            minutes: self.minutes.clamp(Self::MINUTES.0, Self::MINUTES.1),
            increment_secs: self.increment_secs.clamp(Self::INCREMENT.0, Self::INCREMENT.1),
            engine_moves: self.engine_moves.clamp(Self::ENGINE_MOVES.0, Self::ENGINE_MOVES.1),
        }
    }
}

fn step(value: u8, delta: i8, (lo, hi): (u8, u8)) -> u8 {
    (i16::from(value) + i16::from(delta)).clamp(i16::from(lo), i16::from(hi)) as u8
}

/// Per-side game configuration. A pending copy is edited freely and only
/// takes effect when a new game starts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameOptions {
    pub white: SideOptions,
    pub black: SideOptions,
}

impl GameOptions {
    /// Values outside the allowed ranges are pulled back inside them
    pub fn clamped(self) -> Self {
        Self {
            white: self.white.clamped(),
            black: self.black.clamped(),
        }
    }

    pub fn side(&self, side: Color) -> &SideOptions {
        match side {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn side_mut(&mut self, side: Color) -> &mut SideOptions {
        match side {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    pub fn adjust_minutes(&mut self, side: Color, delta: i8) {
        let opts = self.side_mut(side);
        opts.minutes = step(opts.minutes, delta, SideOptions::MINUTES);
    }

    pub fn adjust_increment(&mut self, side: Color, delta: i8) {
        let opts = self.side_mut(side);
        opts.increment_secs = step(opts.increment_secs, delta, SideOptions::INCREMENT);
    }

    pub fn adjust_engine_moves(&mut self, side: Color, delta: i8) {
        let opts = self.side_mut(side);
        opts.engine_moves = step(opts.engine_moves, delta, SideOptions::ENGINE_MOVES);
    }

    /// Same time control for both sides
    pub fn set_preset(&mut self, minutes: u8, increment_secs: u8) {
        for side in [Color::White, Color::Black] {
            let opts = self.side_mut(side);
            opts.minutes = minutes.clamp(SideOptions::MINUTES.0, SideOptions::MINUTES.1);
            opts.increment_secs =
                increment_secs.clamp(SideOptions::INCREMENT.0, SideOptions::INCREMENT.1);
        }
    }

    pub fn initial_ms(&self) -> [u64; 2] {
        [
            u64::from(self.white.minutes) * 60_000,
            u64::from(self.black.minutes) * 60_000,
        ]
    }

    pub fn increment_ms(&self) -> [u64; 2] {
        [
            u64::from(self.white.increment_secs) * 1_000,
            u64::from(self.black.increment_secs) * 1_000,
        ]
    }

    pub fn engine_moves(&self) -> [u8; 2] {
        [self.white.engine_moves, self.black.engine_moves]
    }

    /// "minutes+increment", e.g. "3+2"
    pub fn time_control_label(&self, side: Color) -> String {
        let opts = self.side(side);
        format!("{}+{}", opts.minutes, opts.increment_secs)
    }
}

/// Server settings, read from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub static_dir: PathBuf,
    pub archive_path: PathBuf,
    pub engine_path: Option<PathBuf>,
    pub engine_depth: u8,
    pub tick: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            static_dir: PathBuf::from("./static"),
            archive_path: PathBuf::from("./archive.json"),
            engine_path: None,
            engine_depth: 20,
            tick: Duration::from_millis(100),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(bind) = lookup("ONE_HINT_BIND") {
            config.bind = bind;
        }
        if let Some(dir) = lookup("ONE_HINT_STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("ONE_HINT_ARCHIVE") {
            config.archive_path = PathBuf::from(path);
        }
        config.engine_path = lookup("ONE_HINT_ENGINE")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        if let Some(depth) = lookup("ONE_HINT_DEPTH") {
            config.engine_depth = parse_number("ONE_HINT_DEPTH", &depth)?;
            if config.engine_depth == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "ONE_HINT_DEPTH",
                    value: depth,
                });
            }
        }
        if let Some(tick) = lookup("ONE_HINT_TICK_MS") {
            let ms: u64 = parse_number("ONE_HINT_TICK_MS", &tick)?;
            config.tick = Duration::from_millis(ms.max(1));
        }
        Ok(config)
    }
}

fn parse_number<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn adjustments_are_clamped() {
        let mut options = GameOptions::default();
        options.adjust_minutes(Color::White, -5);
        assert_eq!(options.white.minutes, 1);
        options.adjust_minutes(Color::White, 20);
        assert_eq!(options.white.minutes, 10);
        options.adjust_increment(Color::Black, 9);
        assert_eq!(options.black.increment_secs, 5);
        options.adjust_engine_moves(Color::Black, -3);
        assert_eq!(options.black.engine_moves, 0);
        assert_eq!(options.white.engine_moves, 1);
    }

    #[test]
    fn preset_sets_both_sides() {
        let mut options = GameOptions::default();
        options.set_preset(3, 2);
        assert_eq!(options.time_control_label(Color::White), "3+2");
        assert_eq!(options.time_control_label(Color::Black), "3+2");
        assert_eq!(options.initial_ms(), [180_000, 180_000]);
        assert_eq!(options.increment_ms(), [2_000, 2_000]);
    }

    #[test]
    fn deserialised_options_can_be_clamped() {
        let options: GameOptions = serde_json::from_str(
            r#"{"white":{"minutes":0,"increment_secs":9,"engine_moves":2},
                "black":{"minutes":7,"increment_secs":0,"engine_moves":99}}"#,
        )
        .unwrap();
        let options = options.clamped();
        assert_eq!(options.white.minutes, 1);
        assert_eq!(options.white.increment_secs, 5);
        assert_eq!(options.black.engine_moves, 5);
        assert_eq!(options.engine_moves(), [2, 5]);
    }

    #[test]
    fn server_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("ONE_HINT_BIND", "0.0.0.0:9000"),
            ("ONE_HINT_ENGINE", "/usr/bin/stockfish"),
            ("ONE_HINT_DEPTH", "12"),
        ]
        .into_iter()
        .collect();
        let config = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.engine_path, Some(PathBuf::from("/usr/bin/stockfish")));
        assert_eq!(config.engine_depth, 12);
        assert_eq!(config.tick, Duration::from_millis(100));
    }

    #[test]
    fn server_config_rejects_bad_numbers() {
        let err = ServerConfig::from_lookup(|k| (k == "ONE_HINT_DEPTH").then(|| "deep".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("ONE_HINT_DEPTH"));
        assert!(ServerConfig::from_lookup(|k| (k == "ONE_HINT_DEPTH").then(|| "0".to_string())).is_err());
    }
}
