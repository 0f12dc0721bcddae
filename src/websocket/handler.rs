use actix::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{info, warn};
use uuid::Uuid;

use crate::models::{AppState, ChessWebSocketMessage, ClientMessage, ServerMessage};
use crate::websocket::session_actor::{ClientCommand, Connect, Disconnect, SessionActor};

/// One browser connection. Parses client JSON and forwards it to the
/// session actor; everything the session sends back is written as text.
pub struct ChessWebSocket {
    pub id: String,
    pub session: Addr<SessionActor>,
}

impl Actor for ChessWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection started: {}", self.id);
        self.session.do_send(Connect {
            id: self.id.clone(),
            addr: ctx.address().recipient(),
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        info!("WebSocket connection closed: {}", self.id);
        self.session.do_send(Disconnect {
            id: self.id.clone(),
        });
        Running::Stop
    }
}

impl Handler<ChessWebSocketMessage> for ChessWebSocket {
    type Result = ();

    fn handle(&mut self, msg: ChessWebSocketMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl ChessWebSocket {
    fn reply_error(&self, message: String, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(&ServerMessage::error(message)) {
            Ok(text) => ctx.text(text),
            Err(e) => warn!("Failed to serialize error reply: {}", e),
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChessWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => {
                match serde_json::from_str::<ClientMessage>(text.as_ref()) {
                    Ok(client_msg) => {
                        info!("{} -> {}", self.id, client_msg.action);
                        self.session.do_send(ClientCommand {
                            id: self.id.clone(),
                            msg: client_msg,
                        });
                    }
                    Err(e) => {
                        warn!("Error parsing client message: {}", e);
                        self.reply_error(format!("Invalid message format: {}", e), ctx);
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary messages are not supported");
                self.reply_error("Binary messages are not supported".to_string(), ctx);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Connection closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            _ => {
                ctx.stop();
            }
        }
    }
}

/// WebSocket connection handler
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let ws = ChessWebSocket {
        id: Uuid::new_v4().to_string(),
        session: app_state.session.clone(),
    };
    ws::start(ws, &req, stream)
}
