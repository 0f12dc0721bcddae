//! Actor that owns the one `GameSession`. Websocket commands, clock ticks
//! and engine output all arrive as messages to this actor, so they are
//! handled one at a time.

use actix::prelude::*;
use futures::StreamExt;
use log::{info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::UciEngine;
use crate::game::archive::ArchivedGame;
use crate::game::broker::EngineEvent;
use crate::game::session::{AppliedMove, EngineUpdate, GameSession, MoveSource};
use crate::game::utils::color_to_string;
use crate::models::{
    ArchiveEntry, AvailableMove, ChessWebSocketMessage, ClientMessage, LastMove, ServerMessage,
};

/// A websocket joined
#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub id: String,
    pub addr: Recipient<ChessWebSocketMessage>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: String,
}

/// A parsed client message from connection `id`
#[derive(Message)]
#[rtype(result = "()")]
pub struct ClientCommand {
    pub id: String,
    pub msg: ClientMessage,
}

#[derive(Message)]
#[rtype(result = "Vec<ArchivedGame>")]
pub struct ListArchive;

/// One line printed by the engine
pub struct EngineOutput(pub String);

pub struct SessionActor {
    session: GameSession,
    clients: HashMap<String, Recipient<ChessWebSocketMessage>>,
    tick: Duration,
    engine_path: Option<PathBuf>,
}

impl SessionActor {
    pub fn new(session: GameSession, tick: Duration, engine_path: Option<PathBuf>) -> Self {
        Self {
            session,
            clients: HashMap::new(),
            tick,
            engine_path,
        }
    }

    fn send_to(&self, id: &str, message: &ServerMessage) {
        if let Some(addr) = self.clients.get(id) {
            match serde_json::to_string(message) {
                Ok(text) => addr.do_send(ChessWebSocketMessage(text)),
                Err(e) => warn!("Failed to serialize {}: {}", message.message_type, e),
            }
        }
    }

    fn broadcast(&self, message: &ServerMessage) {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize {}: {}", message.message_type, e);
                return;
            }
        };
        for addr in self.clients.values() {
            addr.do_send(ChessWebSocketMessage(text.clone()));
        }
    }

    fn broadcast_state(&self) {
        self.broadcast(&ServerMessage::state(self.session.snapshot()));
    }

    fn broadcast_game_over(&self, summary: String) {
        self.broadcast(&ServerMessage {
            game_status: Some(summary),
            state: Some(self.session.snapshot()),
            ..ServerMessage::new("game_over")
        });
    }

    fn announce_move(&self, applied: &AppliedMove) {
        self.broadcast(&ServerMessage {
            last_move: Some(LastMove {
                san: applied.san.clone(),
                uci: applied.uci.clone(),
                color: color_to_string(applied.side),
                engine: applied.source == MoveSource::Engine,
            }),
            state: Some(self.session.snapshot()),
            ..ServerMessage::new("state")
        });
        if let Some(outcome) = applied.outcome {
            self.broadcast_game_over(outcome.summary());
        }
    }

    fn start_engine(&mut self, ctx: &mut Context<Self>) {
        let path = match &self.engine_path {
            Some(path) => path.clone(),
            None => {
                info!("No engine configured, hints disabled");
                return;
            }
        };
        match UciEngine::spawn(&path) {
            Ok((engine, lines)) => {
                self.session.attach_engine(Box::new(engine));
                ctx.add_stream(lines.map(EngineOutput));
            }
            Err(e) => warn!("Failed to start engine {}: {}", path.display(), e),
        }
    }

    fn handle_client(&mut self, id: &str, msg: ClientMessage, ctx: &mut Context<Self>) {
        match msg.action.as_str() {
            "state" => self.send_to(id, &ServerMessage::state(self.session.snapshot())),
            "move" => {
                let (from, to) = match (msg.move_from, msg.move_to) {
                    (Some(from), Some(to)) => (from, to),
                    _ => {
                        self.send_to(id, &ServerMessage::error("Move requires from and to positions"));
                        return;
                    }
                };
                let promotion = msg.promotion.and_then(|p| p.chars().next());
                match self.session.apply_human_move(&from, &to, promotion) {
                    Ok(applied) => self.announce_move(&applied),
                    Err(rejected) => {
                        self.send_to(
                            id,
                            &ServerMessage {
                                error: Some(rejected.to_string()),
                                state: Some(self.session.snapshot()),
                                ..ServerMessage::new("rejected")
                            },
                        );
                        // The clock may have flagged while the move was checked
                        if let Some(outcome) = self.session.result() {
                            self.broadcast_game_over(outcome.summary());
                        }
                    }
                }
            }
            "legal_moves" => {
                let square = msg.square.or(msg.move_from).unwrap_or_default();
                match self.session.legal_targets(&square) {
                    Ok(targets) => {
                        let moves = targets
                            .into_iter()
                            .map(|t| AvailableMove {
                                to: t.to.to_string(),
                                capture: t.capture,
                            })
                            .collect();
                        self.send_to(
                            id,
                            &ServerMessage {
                                available_moves: Some(moves),
                                ..ServerMessage::new("legal_moves")
                            },
                        );
                    }
                    Err(e) => self.send_to(id, &ServerMessage::error(e.to_string())),
                }
            }
            "engine_move" => match self.session.request_engine_move() {
                Ok(ticket) => {
                    ctx.add_stream(ticket.events);
                    self.broadcast_state();
                }
                Err(e) => {
                    info!("Engine move refused: {}", e);
                    self.send_to(id, &ServerMessage::error(e.to_string()));
                }
            },
            "new_game" => {
                if self.session.reset_if_empty() {
                    self.broadcast_state();
                } else {
                    self.send_to(id, &ServerMessage::new("confirm_required"));
                }
            }
            "confirm_new_game" => {
                self.session.confirmed_restart();
                self.broadcast_state();
            }
            "get_options" => self.send_to(
                id,
                &ServerMessage {
                    options: Some(*self.session.pending_options()),
                    ..ServerMessage::new("options")
                },
            ),
            "set_options" => match msg.options {
                Some(options) => {
                    self.session.set_pending_options(options);
                    self.send_to(
                        id,
                        &ServerMessage {
                            options: Some(*self.session.pending_options()),
                            ..ServerMessage::new("options")
                        },
                    );
                }
                None => self.send_to(id, &ServerMessage::error("set_options requires options")),
            },
            "archive" => {
                let entries = self
                    .session
                    .archive()
                    .list()
                    .into_iter()
                    .map(ArchiveEntry::from)
                    .collect();
                self.send_to(
                    id,
                    &ServerMessage {
                        archive: Some(entries),
                        ..ServerMessage::new("archive")
                    },
                );
            }
            other => {
                info!("Unknown action: {}", other);
                self.send_to(id, &ServerMessage::error(format!("Unknown action: {}", other)));
            }
        }
    }
}

impl Actor for SessionActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_engine(ctx);
        ctx.run_interval(self.tick, |act, _ctx| {
            if let Some(outcome) = act.session.poll_clock() {
                act.broadcast_game_over(outcome.summary());
            }
        });
    }
}

impl Handler<Connect> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Self::Context) {
        info!("Client {} connected ({} total)", msg.id, self.clients.len() + 1);
        self.clients.insert(msg.id.clone(), msg.addr);
        self.send_to(&msg.id, &ServerMessage::state(self.session.snapshot()));
    }
}

impl Handler<Disconnect> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Self::Context) {
        self.clients.remove(&msg.id);
        info!("Client {} disconnected ({} left)", msg.id, self.clients.len());
    }
}

impl Handler<ClientCommand> for SessionActor {
    type Result = ();

    fn handle(&mut self, cmd: ClientCommand, ctx: &mut Self::Context) {
        self.handle_client(&cmd.id, cmd.msg, ctx);
    }
}

impl Handler<ListArchive> for SessionActor {
    type Result = MessageResult<ListArchive>;

    fn handle(&mut self, _: ListArchive, _: &mut Self::Context) -> Self::Result {
        MessageResult(self.session.archive().list())
    }
}

impl StreamHandler<EngineOutput> for SessionActor {
    fn handle(&mut self, line: EngineOutput, _: &mut Self::Context) {
        match self.session.handle_engine_line(&line.0) {
            Some(EngineUpdate::Moved(applied)) => self.announce_move(&applied),
            Some(EngineUpdate::Rejected(_)) | Some(EngineUpdate::Failed(_)) => {
                self.broadcast_state()
            }
            // Progress reaches clients through the request's own event stream
            Some(EngineUpdate::Progress { .. }) | None => {}
        }
    }

    fn finished(&mut self, _: &mut Self::Context) {
        if self.session.engine_disconnected("engine exited").is_some() {
            self.broadcast(&ServerMessage::error("Engine exited during search"));
        }
        self.broadcast_state();
    }
}

impl StreamHandler<EngineEvent> for SessionActor {
    fn handle(&mut self, event: EngineEvent, _: &mut Self::Context) {
        match event {
            EngineEvent::Progress { side, percent, .. } => self.broadcast(&ServerMessage {
                color: Some(color_to_string(side)),
                progress: Some(percent),
                ..ServerMessage::new("progress")
            }),
            EngineEvent::Failed { reason, .. } => {
                self.broadcast(&ServerMessage::error(format!("Engine move failed: {}", reason)))
            }
            EngineEvent::Completed { .. } | EngineEvent::Cancelled { .. } => {}
        }
    }

    // The request is over; the session actor keeps running
    fn finished(&mut self, _: &mut Self::Context) {}
}
