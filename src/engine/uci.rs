//! External UCI engine running as a child process.

use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use log::{debug, info, warn};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;

use crate::error::EngineError;

/// Command side of an analysis engine. Output arrives separately as a
/// stream of lines, so nothing here blocks waiting for the engine.
pub trait EngineProcess {
    fn send(&mut self, command: &str) -> io::Result<()>;

    fn set_position(&mut self, fen: &str) -> io::Result<()> {
        self.send(&format!("position fen {}", fen))
    }

    fn search(&mut self, depth: u8) -> io::Result<()> {
        self.send(&format!("go depth {}", depth))
    }

    fn stop(&mut self) -> io::Result<()> {
        self.send("stop")
    }
}

pub struct UciEngine {
    child: Child,
    stdin: ChildStdin,
}

impl UciEngine {
    /// Launch the engine binary and start the UCI handshake. Stdout is read
    /// on a dedicated thread and forwarded line by line; the returned stream
    /// ends when the engine exits.
    pub fn spawn(path: &Path) -> Result<(Self, UnboundedReceiver<String>), EngineError> {
        info!("Starting engine {}", path.display());
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Unavailable("engine stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Unavailable("engine stdout not captured".to_string()))?;

        let (tx, rx) = unbounded();
        thread::Builder::new()
            .name("uci-reader".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    match line {
                        Ok(line) => {
                            if tx.unbounded_send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Error reading engine output: {}", e);
                            break;
                        }
                    }
                }
                debug!("Engine output closed");
            })?;

        let mut engine = UciEngine { child, stdin };
        engine.send("uci")?;
        engine.send("isready")?;
        Ok((engine, rx))
    }
}

impl EngineProcess for UciEngine {
    fn send(&mut self, command: &str) -> io::Result<()> {
        debug!("[engine] << {}", command);
        writeln!(self.stdin, "{}", command)?;
        self.stdin.flush()
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        let _ = self.send("quit");
        if let Err(e) = self.child.kill() {
            debug!("Engine already exited: {}", e);
        }
        let _ = self.child.wait();
    }
}
