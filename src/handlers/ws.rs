// src/handlers/ws.rs

use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    engine::{ExamEngine, Outbound},
    error::{AppError, SessionError},
    models::message::{ClientMessage, ServerMessage},
    state::AppState,
    utils::jwt::{bearer_token, verify_jwt},
};

#[derive(Debug, Deserialize)]
pub struct SocketParams {
    /// Browsers cannot set headers on a WebSocket handshake.
    pub token: Option<String>,
}

/// Upgrades to the exam socket.
///
/// The bearer token (header or `?token=`) identifies the participant for
/// every message on the connection.
pub async fn exam_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<SocketParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or(params.token)
        .ok_or_else(|| AppError::AuthError("Missing token".to_string()))?;
    let claims = verify_jwt(&token, &state.config.jwt_secret)?;
    let engine = state.engine.clone();

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, engine, claims.sub)))
}

async fn handle_socket(socket: WebSocket, engine: Arc<ExamEngine>, user_id: String) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<ServerMessage>>(engine.config().outbound_capacity());
    let id = Uuid::new_v4();
    info!("Connection {} opened for {}", id, user_id);

    // Writer pump: the only place that awaits the socket.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(msg.as_ref()) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {:?}: {}", msg, e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut conn = Connection {
        id,
        user_id,
        engine,
        tx,
        joined: HashSet::new(),
    };

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => conn.handle_text(text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Connection {} read error: {}", conn.id, e);
                break;
            }
        }
    }

    conn.close();
    writer.abort();
}

/// Per-connection state of the reader loop.
struct Connection {
    id: Uuid,
    user_id: String,
    engine: Arc<ExamEngine>,
    tx: Outbound,
    joined: HashSet<String>,
}

impl Connection {
    async fn handle_text(&mut self, text: &str) {
        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                self.reply(ServerMessage::Error {
                    message: format!("malformed message: {}", e),
                })
                .await;
                return;
            }
        };
        if let Err(e) = msg.validate() {
            self.reply(ServerMessage::Error {
                message: e.to_string(),
            })
            .await;
            return;
        }
        debug!("{} <- {:?}", self.user_id, msg);

        match msg {
            ClientMessage::Join(req) => {
                let joined = self
                    .engine
                    .join(
                        &req.paper_key,
                        &req.title,
                        &self.user_id,
                        self.id,
                        self.tx.clone(),
                    )
                    .await;
                match joined {
                    Ok(_) => {
                        self.joined.insert(req.paper_key);
                    }
                    // The termination notice has already been delivered.
                    Err(SessionError::SessionEnded) => {}
                    Err(e) => {
                        warn!("Join of {} to {} failed: {}", self.user_id, req.paper_key, e);
                        self.reply(ServerMessage::Error {
                            message: e.to_string(),
                        })
                        .await;
                    }
                }
            }
            ClientMessage::SubmitAnswer(req) => {
                let result = self
                    .engine
                    .submit(
                        &req.paper_key,
                        &self.user_id,
                        req.question_index,
                        req.option_id,
                    )
                    .await;
                let reply = match result {
                    Ok(correct) => ServerMessage::AnswerResult {
                        question_index: req.question_index,
                        accepted: true,
                        correct: Some(correct),
                        reason: None,
                    },
                    Err(e) => {
                        debug!("Submission by {} rejected: {}", self.user_id, e);
                        ServerMessage::AnswerResult {
                            question_index: req.question_index,
                            accepted: false,
                            correct: None,
                            reason: Some(e.reason().to_string()),
                        }
                    }
                };
                self.reply(reply).await;
            }
            ClientMessage::FocusLost(req) => {
                let reply = match self.engine.report_focus_loss(&req.paper_key, &self.user_id) {
                    Ok(strike) => ServerMessage::ProctorWarning {
                        strikes: strike.strikes,
                        flagged: strike.flagged,
                    },
                    Err(e) => ServerMessage::Error {
                        message: e.to_string(),
                    },
                };
                self.reply(reply).await;
            }
            ClientMessage::Leave(req) => {
                self.engine.leave(&req.paper_key, &self.user_id, self.id);
                self.joined.remove(&req.paper_key);
            }
        }
    }

    async fn reply(&self, msg: ServerMessage) {
        if self.tx.send(Arc::new(msg)).await.is_err() {
            debug!("Connection {} writer gone", self.id);
        }
    }

    fn close(&mut self) {
        for paper_key in self.joined.drain() {
            self.engine.leave(&paper_key, &self.user_id, self.id);
        }
        info!("Connection {} closed for {}", self.id, self.user_id);
    }
}
