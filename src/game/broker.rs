//! Engine Move Broker: one in-flight request to the external engine.
//!
//! States run `Idle -> Thinking -> {Completed, Cancelled, Failed} -> Idle`.
//! The broker only interprets engine output and reports typed events; it
//! never touches the board, the clocks or the move budget.

use chess::{Color, Piece, Square};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::{debug, info, warn};
use std::fmt;
use std::str::FromStr;

use crate::engine::EngineProcess;
use crate::error::EngineError;
use crate::game::utils::{color_name, parse_promotion, parse_square, promotion_char};

pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Thinking,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRequest {
    pub id: RequestId,
    pub side: Color,
    pub target_depth: u8,
    pub progress: u8,
    pub state: RequestState,
}

/// A move in coordinate notation, e.g. "e2e4" or "e7e8q"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UciMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Piece>,
}

impl FromStr for UciMove {
    type Err = EngineError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let bad = || EngineError::Protocol(format!("malformed move {:?}", text));
        if !text.is_ascii() || !(4..=5).contains(&text.len()) {
            return Err(bad());
        }
        let from = parse_square(&text[0..2]).map_err(|_| bad())?;
        let to = parse_square(&text[2..4]).map_err(|_| bad())?;
        let promotion = match text.chars().nth(4) {
            Some(ch) => Some(parse_promotion(ch).map_err(|_| bad())?),
            None => None,
        };
        Ok(UciMove {
            from,
            to,
            promotion,
        })
    }
}

impl fmt::Display for UciMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(piece) = self.promotion {
            write!(f, "{}", promotion_char(piece))?;
        }
        Ok(())
    }
}

/// Events delivered to the subscriber of a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Progress { id: RequestId, side: Color, percent: u8 },
    Completed { id: RequestId, side: Color, mv: UciMove },
    Cancelled { id: RequestId },
    Failed { id: RequestId, reason: String },
}

/// Classification of one line of engine output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineLine<'a> {
    Progress { depth: u32 },
    BestMove(Option<&'a str>),
    ReadyOk,
    Other,
}

pub fn classify_line(line: &str) -> EngineLine<'_> {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some("info") => {
            while let Some(token) = tokens.next() {
                if token == "depth" {
                    if let Some(Ok(depth)) = tokens.next().map(str::parse::<u32>) {
                        return EngineLine::Progress { depth };
                    }
                    break;
                }
            }
            EngineLine::Other
        }
        Some("bestmove") => match tokens.next() {
            Some("(none)") | None => EngineLine::BestMove(None),
            Some(mv) => EngineLine::BestMove(Some(mv)),
        },
        Some("readyok") => EngineLine::ReadyOk,
        _ => EngineLine::Other,
    }
}

/// Handle returned for an accepted request. The event stream ends once the
/// request completes, fails or is superseded.
pub struct EngineTicket {
    pub id: RequestId,
    pub events: UnboundedReceiver<EngineEvent>,
}

pub struct EngineBroker {
    engine: Option<Box<dyn EngineProcess>>,
    ready: bool,
    current: Option<EngineRequest>,
    last: Option<EngineRequest>,
    subscriber: Option<UnboundedSender<EngineEvent>>,
    // Searches that were stopped but whose `bestmove` has not arrived yet
    stale_searches: usize,
    next_id: RequestId,
}

impl EngineBroker {
    pub fn new() -> Self {
        Self {
            engine: None,
            ready: false,
            current: None,
            last: None,
            subscriber: None,
            stale_searches: 0,
            next_id: 1,
        }
    }

    /// Take ownership of a freshly started engine. It becomes available once
    /// it answers `readyok`. A request still running on the old engine fails
    /// and its `Failed` event is returned.
    pub fn attach(&mut self, engine: Box<dyn EngineProcess>) -> Option<EngineEvent> {
        let replaced = self.detach("engine replaced");
        self.engine = Some(engine);
        self.ready = false;
        self.stale_searches = 0;
        replaced
    }

    /// Forget the engine (it exited or broke). Fails any request in flight.
    pub fn detach(&mut self, reason: &str) -> Option<EngineEvent> {
        let event = self.fail(reason);
        if self.engine.take().is_some() {
            warn!("Engine detached: {}", reason);
        }
        self.ready = false;
        event
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some() && self.ready
    }

    pub fn state(&self) -> RequestState {
        self.current
            .as_ref()
            .map(|r| r.state)
            .unwrap_or(RequestState::Idle)
    }

    pub fn current(&self) -> Option<&EngineRequest> {
        self.current.as_ref()
    }

    /// The most recently finished request
    pub fn last(&self) -> Option<&EngineRequest> {
        self.last.as_ref()
    }

    /// Start a search for `side` on `fen`, superseding any request in flight
    pub fn request_move(
        &mut self,
        fen: &str,
        side: Color,
        target_depth: u8,
    ) -> Result<EngineTicket, EngineError> {
        if !self.is_available() {
            return Err(EngineError::Unavailable(if self.engine.is_some() {
                "engine is still loading".to_string()
            } else {
                "no engine loaded".to_string()
            }));
        }
        self.cancel();

        let id = self.next_id;
        self.next_id += 1;
        let target_depth = target_depth.max(1);

        let sent = match self.engine.as_mut() {
            Some(engine) => engine
                .set_position(fen)
                .and_then(|_| engine.search(target_depth)),
            None => return Err(EngineError::Unavailable("no engine loaded".to_string())),
        };
        if let Err(e) = sent {
            warn!("Engine request {} failed to start: {}", id, e);
            self.last = Some(EngineRequest {
                id,
                side,
                target_depth,
                progress: 0,
                state: RequestState::Failed,
            });
            return Err(EngineError::Io(e));
        }

        info!(
            "Engine request {} for {} at depth {}",
            id,
            color_name(side),
            target_depth
        );
        let (tx, rx) = unbounded();
        self.subscriber = Some(tx);
        self.current = Some(EngineRequest {
            id,
            side,
            target_depth,
            progress: 0,
            state: RequestState::Thinking,
        });
        Ok(EngineTicket { id, events: rx })
    }

    /// Cancel the request in flight, if any. Its remaining output is
    /// discarded and its subscriber receives `Cancelled`.
    pub fn cancel(&mut self) -> Option<EngineEvent> {
        let id = self.current.as_ref()?.id;
        if let Some(engine) = self.engine.as_mut() {
            match engine.stop() {
                Ok(()) => self.stale_searches += 1,
                Err(e) => warn!("Failed to stop engine search {}: {}", id, e),
            }
        }
        info!("Engine request {} cancelled", id);
        Some(self.finish(RequestState::Cancelled, EngineEvent::Cancelled { id }))
    }

    /// Fail the request in flight, if any
    pub fn fail(&mut self, reason: &str) -> Option<EngineEvent> {
        let id = self.current.as_ref()?.id;
        warn!("Engine request {} failed: {}", id, reason);
        Some(self.finish(
            RequestState::Failed,
            EngineEvent::Failed {
                id,
                reason: reason.to_string(),
            },
        ))
    }

    /// Interpret one line of engine output
    pub fn handle_line(&mut self, line: &str) -> Option<EngineEvent> {
        debug!("[engine] >> {}", line);
        match classify_line(line) {
            EngineLine::ReadyOk => {
                if !self.ready {
                    info!("Engine ready");
                }
                self.ready = true;
                None
            }
            EngineLine::Progress { .. } if self.stale_searches > 0 => None,
            EngineLine::BestMove(_) if self.stale_searches > 0 => {
                self.stale_searches -= 1;
                None
            }
            EngineLine::Progress { depth } => {
                let request = self.current.as_mut()?;
                let percent = (depth.saturating_mul(100) / u32::from(request.target_depth)).min(100) as u8;
                if percent <= request.progress {
                    return None;
                }
                request.progress = percent;
                let event = EngineEvent::Progress {
                    id: request.id,
                    side: request.side,
                    percent,
                };
                self.emit(event.clone());
                Some(event)
            }
            EngineLine::BestMove(Some(text)) => {
                let request = self.current.as_ref()?;
                let (id, side) = (request.id, request.side);
                match text.parse::<UciMove>() {
                    Ok(mv) => {
                        info!("Engine request {} completed: {}", id, mv);
                        if let Some(request) = self.current.as_mut() {
                            request.progress = 100;
                        }
                        Some(self.finish(
                            RequestState::Completed,
                            EngineEvent::Completed { id, side, mv },
                        ))
                    }
                    Err(e) => self.fail(&e.to_string()),
                }
            }
            EngineLine::BestMove(None) => {
                self.current.as_ref()?;
                self.fail("engine returned no move")
            }
            EngineLine::Other => None,
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(subscriber) = &self.subscriber {
            let _ = subscriber.unbounded_send(event);
        }
    }

    fn finish(&mut self, state: RequestState, event: EngineEvent) -> EngineEvent {
        if let Some(mut request) = self.current.take() {
            request.state = state;
            self.last = Some(request);
        }
        self.emit(event.clone());
        // Dropping the sender ends the subscriber's stream
        self.subscriber = None;
        event
    }
}

impl Default for EngineBroker {
    fn default() -> Self {
        Self::new()
    }
}
