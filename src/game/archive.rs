//! Append-only record of finished and abandoned games.

use chess::Color;
use chrono::{Local, TimeZone};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::ArchiveError;
use crate::game::utils::encode_uri_component;

/// Immutable snapshot of a concluded game
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ArchivedGame {
    pub pgn: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub winner: String,
    pub white_time_control: String,
    pub black_time_control: String,
    pub white_hints: u8,
    pub black_hints: u8,
}

impl ArchivedGame {
    pub fn time_control(&self, side: Color) -> &str {
        match side {
            Color::White => &self.white_time_control,
            Color::Black => &self.black_time_control,
        }
    }

    pub fn hints(&self, side: Color) -> u8 {
        match side {
            Color::White => self.white_hints,
            Color::Black => self.black_hints,
        }
    }

    /// Local time of the game as `YYYY-MM-DD HH:MM:SS`
    pub fn played_at(&self) -> String {
        match Local.timestamp_millis_opt(self.timestamp).single() {
            Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => String::from("unknown"),
        }
    }

    /// Link that opens the game in the lichess analysis board
    pub fn analysis_url(&self) -> String {
        format!(
            "https://lichess.org/analysis/pgn/{}",
            encode_uri_component(&self.pgn)
        )
    }
}

/// Durable storage behind the archive
pub trait ArchivePersistence {
    fn append(&mut self, game: ArchivedGame) -> Result<(), ArchiveError>;

    /// All games, most recent first
    fn list_all(&self) -> Result<Vec<ArchivedGame>, ArchiveError>;
}

#[derive(Debug, Default)]
pub struct MemoryArchive {
    games: Vec<ArchivedGame>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchivePersistence for MemoryArchive {
    fn append(&mut self, game: ArchivedGame) -> Result<(), ArchiveError> {
        self.games.insert(0, game);
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<ArchivedGame>, ArchiveError> {
        Ok(self.games.clone())
    }
}

/// The whole archive as one JSON array, newest first. Writes go to a
/// sibling temp file that is synced and renamed over the original. A file
/// that no longer parses is moved aside on the next append.
#[derive(Debug, Clone)]
pub struct JsonFileArchive {
    path: PathBuf,
}

impl JsonFileArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unreadable archive is moved before a fresh one is started
    pub fn quarantine_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".bad");
        PathBuf::from(name)
    }
}

impl ArchivePersistence for JsonFileArchive {
    fn append(&mut self, game: ArchivedGame) -> Result<(), ArchiveError> {
        let mut games = match self.list_all() {
            Ok(games) => games,
            Err(ArchiveError::Serde(e)) => {
                let aside = self.quarantine_path();
                warn!(
                    "Archive {} is unreadable ({}), moving it to {}",
                    self.path.display(),
                    e,
                    aside.display()
                );
                fs::rename(&self.path, &aside)?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        games.insert(0, game);

        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(&games)?)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<ArchivedGame>, ArchiveError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Archive as seen by the session: storage failures are logged and
/// swallowed, a lost entry never stops play.
pub struct ArchiveStore {
    backend: Box<dyn ArchivePersistence>,
}

impl ArchiveStore {
    pub fn new(backend: Box<dyn ArchivePersistence>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryArchive::new()))
    }

    /// Persist `game`; returns whether it was written
    pub fn record(&mut self, game: ArchivedGame) -> bool {
        let winner = game.winner.clone();
        match self.backend.append(game) {
            Ok(()) => {
                info!("Archived game: {}", winner);
                true
            }
            Err(e) => {
                error!("Failed to archive game ({}): {}", winner, e);
                false
            }
        }
    }

    pub fn list(&self) -> Vec<ArchivedGame> {
        self.backend.list_all().unwrap_or_else(|e| {
            error!("Failed to read archive: {}", e);
            Vec::new()
        })
    }
}
