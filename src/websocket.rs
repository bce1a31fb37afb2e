//! # Voice WebSocket Handler
//!
//! One actor per connected client. The actor is the connection-event
//! dispatcher: it owns the connection id, creates and tears down the
//! conversation session, and hands audio events to pipeline workers
//! without ever blocking on them.
//!
//! ## WebSocket Protocol:
//! 1. **Connect**: server assigns a connection id and replies with
//!    `connection_status` (including whether the engine is ready)
//! 2. **Audio**: client sends `audio_data` with a base64 payload; the
//!    eventual `audio_response` carries the transcription and reply
//! 3. **Clear**: client sends `clear_conversation`; server confirms with
//!    `conversation_cleared`
//! 4. **Disconnect**: session removed; in-flight results for the gone
//!    connection are dropped silently
//!
//! ## Message Format:
//! All frames are JSON text tagged with a `type` field. Binary frames are
//! not part of the protocol.

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::pipeline::{AudioJob, FailureReason, Outcome, PipelineResult};
use crate::state::AppState;

/// How often the server pings an idle connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a client may stay silent before the connection is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Messages the client sends to the server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One recorded clip, base64 encoded (optionally data-URL wrapped)
    AudioData { audio: String },

    /// Discard this connection's conversation history
    ClearConversation,
}

/// Messages the server sends to the client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connect acknowledgement with the assigned connection id
    ConnectionStatus {
        status: String,
        user_id: String,
        model_ready: bool,
    },

    /// Terminal outcome of one audio submission
    AudioResponse {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        transcription: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        user_id: String,
    },

    /// Outcome of a clear request
    ConversationCleared { status: String, message: String },
}

impl ServerMessage {
    /// Wire form of a pipeline result.
    pub fn from_result(result: &PipelineResult) -> Self {
        match &result.outcome {
            Outcome::Success {
                transcription,
                response,
            } => ServerMessage::AudioResponse {
                success: true,
                transcription: Some(transcription.clone()),
                response: Some(response.clone()),
                error: None,
                user_id: result.user_id.clone(),
            },
            Outcome::Failure(reason) => ServerMessage::AudioResponse {
                success: false,
                transcription: None,
                response: None,
                error: Some(reason.user_message()),
                user_id: result.user_id.clone(),
            },
        }
    }
}

/// An audio submission with no payload carries nothing to process.
fn is_empty_payload(audio: &str) -> bool {
    audio.trim().is_empty()
}

/// WebSocket actor for one voice-chat connection.
pub struct VoiceWebSocket {
    /// Connection id, unique for the lifetime of this connection
    user_id: String,

    /// Shared application state (registry, pipeline, metrics)
    state: AppState,

    /// Last time the client gave any sign of life
    last_heartbeat: Instant,
}

impl VoiceWebSocket {
    pub fn new(state: AppState) -> Self {
        Self {
            user_id: Uuid::new_v4().to_string(),
            state,
            last_heartbeat: Instant::now(),
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        if let Ok(json) = serde_json::to_string(message) {
            ctx.text(json);
        }
    }

    /// Handle one `audio_data` event.
    ///
    /// Empty payloads are rejected synchronously with no worker dispatch.
    /// Everything else becomes an [`AudioJob`] on a fire-and-forget worker;
    /// the dispatcher keeps handling other events while the job runs, and
    /// the result comes back through this actor's address so it can only
    /// ever reach the originating connection.
    fn handle_audio(&mut self, audio: String, ctx: &mut ws::WebsocketContext<Self>) {
        if is_empty_payload(&audio) {
            let result =
                PipelineResult::failure(self.user_id.clone(), FailureReason::EmptyAudio);
            self.send(ctx, &ServerMessage::from_result(&result));
            return;
        }

        self.state.record_audio_job_dispatched();

        let job = AudioJob::new(self.user_id.clone(), audio);
        let pipeline = self.state.pipeline.clone();
        let state = self.state.clone();
        let user_id = self.user_id.clone();
        let addr = ctx.address();

        tokio::spawn(async move {
            // A panicking stage must not take the worker down without a
            // terminal event; treat it as an internal error.
            let result = match AssertUnwindSafe(pipeline.run(job)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    error!(user_id = %user_id, "pipeline worker panicked");
                    PipelineResult::failure(user_id, FailureReason::Internal)
                }
            };

            if matches!(result.outcome, Outcome::Failure(_)) {
                state.record_audio_job_failed();
            }

            // If the connection is already gone this is a no-op: the
            // result is undeliverable and simply dropped.
            addr.do_send(DeliverResult(result));
        });
    }

    /// Handle a `clear_conversation` event.
    fn handle_clear(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let cleared = self.state.engine_ready() && self.state.registry.reset(&self.user_id);

        let message = if cleared {
            info!(user_id = %self.user_id, "conversation cleared");
            ServerMessage::ConversationCleared {
                status: "success".to_string(),
                message: "Conversation history cleared.".to_string(),
            }
        } else {
            ServerMessage::ConversationCleared {
                status: "failure".to_string(),
                message: "Could not clear (model/session issue).".to_string(),
            }
        };

        self.send(ctx, &message);
    }
}

/// Pipeline result addressed back to the originating connection.
#[derive(Message)]
#[rtype(result = "()")]
struct DeliverResult(PipelineResult);

impl Actor for VoiceWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let model_ready = self.state.engine_ready();
        info!(user_id = %self.user_id, model_ready, "user connected");

        self.state.increment_active_connections();

        // Each user gets their own independent conversation session, but
        // only when the engine can actually use it.
        if model_ready {
            self.state.registry.create(&self.user_id);
            debug!(user_id = %self.user_id, "conversation session created");
        }

        self.send(
            ctx,
            &ServerMessage::ConnectionStatus {
                status: "connected".to_string(),
                user_id: self.user_id.clone(),
                model_ready,
            },
        );

        // Heartbeat: ping on an interval, drop clients that stay silent.
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(user_id = %act.user_id, "heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(user_id = %self.user_id, "user disconnected");
        self.state.registry.remove(&self.user_id);
        self.state.decrement_active_connections();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VoiceWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::AudioData { audio }) => {
                    self.handle_audio(audio, ctx);
                }
                Ok(ClientMessage::ClearConversation) => {
                    self.handle_clear(ctx);
                }
                Err(err) => {
                    // Unknown or malformed events are ignored, matching the
                    // original dispatcher's behavior.
                    warn!(user_id = %self.user_id, error = %err, "unparseable client message");
                }
            },
            Ok(ws::Message::Binary(_)) => {
                warn!(user_id = %self.user_id, "binary frames are not part of the protocol");
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(user_id = %self.user_id, ?reason, "client closed connection");
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(user_id = %self.user_id, "unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(user_id = %self.user_id, error = %err, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}

impl Handler<DeliverResult> for VoiceWebSocket {
    type Result = ();

    fn handle(&mut self, msg: DeliverResult, ctx: &mut Self::Context) {
        self.send(ctx, &ServerMessage::from_result(&msg.0));
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to a fresh [`VoiceWebSocket`] actor.
pub async fn voice_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    debug!(peer = ?req.connection_info().peer_addr(), "websocket connection request");
    ws::start(VoiceWebSocket::new(state.get_ref().clone()), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_audio_data_parses() {
        let json = r#"{"type":"audio_data","audio":"AAAA"}"#;
        match serde_json::from_str::<ClientMessage>(json).unwrap() {
            ClientMessage::AudioData { audio } => assert_eq!(audio, "AAAA"),
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_client_clear_conversation_parses() {
        let json = r#"{"type":"clear_conversation"}"#;
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(json).unwrap(),
            ClientMessage::ClearConversation
        ));
    }

    #[test]
    fn test_unknown_event_fails_to_parse() {
        let json = r#"{"type":"launch_missiles"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_connection_status_wire_format() {
        let msg = ServerMessage::ConnectionStatus {
            status: "connected".to_string(),
            user_id: "abc".to_string(),
            model_ready: true,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "connection_status");
        assert_eq!(json["status"], "connected");
        assert_eq!(json["user_id"], "abc");
        assert_eq!(json["model_ready"], true);
    }

    #[test]
    fn test_success_result_wire_format() {
        let result = PipelineResult {
            user_id: "abc".to_string(),
            outcome: Outcome::Success {
                transcription: "hello".to_string(),
                response: "hi!".to_string(),
            },
        };
        let json = serde_json::to_value(ServerMessage::from_result(&result)).unwrap();
        assert_eq!(json["type"], "audio_response");
        assert_eq!(json["success"], true);
        assert_eq!(json["transcription"], "hello");
        assert_eq!(json["response"], "hi!");
        assert_eq!(json["user_id"], "abc");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failure_result_wire_format() {
        let result =
            PipelineResult::failure("abc", FailureReason::Unintelligible);
        let json = serde_json::to_value(ServerMessage::from_result(&result)).unwrap();
        assert_eq!(json["type"], "audio_response");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Could not understand audio");
        assert_eq!(json["user_id"], "abc");
        assert!(json.get("transcription").is_none());
        assert!(json.get("response").is_none());
    }

    #[test]
    fn test_empty_payload_detection() {
        assert!(is_empty_payload(""));
        assert!(is_empty_payload("   "));
        assert!(!is_empty_payload("AAAA"));
    }
}
