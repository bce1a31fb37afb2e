//! # Audio Processing Pipeline
//!
//! The per-utterance orchestrator: one inbound audio event becomes one
//! [`AudioJob`], one pipeline run, and exactly one [`PipelineResult`]
//! routed back to the originating connection.
//!
//! ## Stages:
//! 1. **Transport decode**: strip the data-URL prefix, decode base64
//! 2. **Transcode**: compressed container → WAV via the transcoder adapter
//! 3. **Recognize**: WAV → text via the speech-to-text adapter
//! 4. **Respond**: conversation engine keyed by connection id, or the
//!    rule-based fallback when no engine is configured
//!
//! Each run executes entirely on a worker task spawned by the connection
//! dispatcher, so a slow vendor call never blocks other connections. Every
//! adapter failure is converted to a typed outcome here; nothing escapes a
//! worker as an unhandled fault.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::audio::{decode_transport, Transcoder};
use crate::engine::{fallback, ChatOutcome, ConversationEngine};
use crate::session::{ChatTurn, SessionRegistry};
use crate::transcription::{SpeechToText, TranscriptionError};

/// Reply when the engine is configured but this connection has no session.
pub const NO_SESSION_REPLY: &str = "Sorry, I'm having trouble thinking right now.";

/// Reply when the engine call fails for a non-content reason.
pub const ENGINE_TROUBLE_REPLY: &str = "I encountered an issue with the AI model.";

/// One discrete audio submission awaiting processing.
#[derive(Debug, Clone)]
pub struct AudioJob {
    /// Connection that submitted the clip and will receive the result
    pub user_id: String,

    /// Transport-encoded audio payload (base64, possibly data-URL wrapped)
    pub payload: String,

    /// When the event was received; ordering across jobs is not guaranteed
    pub submitted_at: DateTime<Utc>,
}

impl AudioJob {
    pub fn new(user_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            payload: payload.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Why a pipeline run failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The submission carried no audio payload at all.
    EmptyAudio,

    /// The recognizer heard no recognizable speech.
    Unintelligible,

    /// The recognizer service was unreachable or errored.
    TranscriptionService(String),

    /// Transcoding or any other server-side stage failed; details are in
    /// the server log, the client sees an opaque message.
    Internal,
}

impl FailureReason {
    /// Stable machine-readable tag for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::EmptyAudio => "empty_audio",
            FailureReason::Unintelligible => "unintelligible",
            FailureReason::TranscriptionService(_) => "transcription_service_error",
            FailureReason::Internal => "internal_error",
        }
    }

    /// Message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            FailureReason::EmptyAudio => "No audio data received".to_string(),
            FailureReason::Unintelligible => "Could not understand audio".to_string(),
            FailureReason::TranscriptionService(detail) => {
                format!("Speech recognition service error: {}", detail)
            }
            FailureReason::Internal => {
                "Internal server error during audio processing.".to_string()
            }
        }
    }
}

/// Terminal outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { transcription: String, response: String },
    Failure(FailureReason),
}

/// Outcome tagged with its owning connection, so the dispatcher can route
/// it back correctly even though the run happened asynchronously.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub user_id: String,
    pub outcome: Outcome,
}

impl PipelineResult {
    pub fn failure(user_id: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            user_id: user_id.into(),
            outcome: Outcome::Failure(reason),
        }
    }
}

/// The orchestrator. One instance is built at startup and shared (via
/// `Arc`) by every connection; all per-run state lives on the stack of
/// `run`, so concurrent workers never contend except on one session's
/// history lock.
pub struct AudioPipeline {
    registry: Arc<SessionRegistry>,
    transcoder: Arc<dyn Transcoder>,
    speech: Arc<dyn SpeechToText>,
    engine: Option<Arc<dyn ConversationEngine>>,
    min_speech_bytes: usize,
}

impl AudioPipeline {
    pub fn new(
        registry: Arc<SessionRegistry>,
        transcoder: Arc<dyn Transcoder>,
        speech: Arc<dyn SpeechToText>,
        engine: Option<Arc<dyn ConversationEngine>>,
        min_speech_bytes: usize,
    ) -> Self {
        Self {
            registry,
            transcoder,
            speech,
            engine,
            min_speech_bytes,
        }
    }

    /// Process one audio job to its terminal result.
    pub async fn run(&self, job: AudioJob) -> PipelineResult {
        let user_id = job.user_id.clone();
        let submitted_at = job.submitted_at;
        let outcome = self.process(job).await;

        let elapsed_ms = (Utc::now() - submitted_at).num_milliseconds();
        let outcome_tag = match &outcome {
            Outcome::Success { .. } => "success",
            Outcome::Failure(reason) => reason.as_str(),
        };
        info!(user_id = %user_id, outcome = outcome_tag, elapsed_ms, "pipeline run complete");

        PipelineResult { user_id, outcome }
    }

    async fn process(&self, job: AudioJob) -> Outcome {
        // Stage 1: transport decode.
        let encoded = match decode_transport(&job.payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(user_id = %job.user_id, error = %e, "audio payload decode failed");
                return Outcome::Failure(FailureReason::Internal);
            }
        };

        // Advisory only: very short clips almost never transcribe, but the
        // downstream stages still run so the failure mode stays uniform.
        if encoded.len() < self.min_speech_bytes {
            warn!(
                user_id = %job.user_id,
                bytes = encoded.len(),
                threshold = self.min_speech_bytes,
                "audio clip is very short, recognition will likely fail"
            );
        }

        // Stage 2: container → waveform.
        let wav = match self.transcoder.to_wav(&encoded).await {
            Ok(wav) => wav,
            Err(e) => {
                error!(user_id = %job.user_id, error = %e, "transcoding failed");
                return Outcome::Failure(FailureReason::Internal);
            }
        };

        // Stage 3: waveform → text.
        let transcription = match self.speech.recognize(&wav).await {
            Ok(text) => text,
            Err(TranscriptionError::Unintelligible) => {
                info!(user_id = %job.user_id, "no recognizable speech in clip");
                return Outcome::Failure(FailureReason::Unintelligible);
            }
            Err(TranscriptionError::Service(detail)) => {
                error!(user_id = %job.user_id, detail = %detail, "recognizer service error");
                return Outcome::Failure(FailureReason::TranscriptionService(detail));
            }
            Err(TranscriptionError::InvalidWaveform(detail)) => {
                // The transcoder produced this waveform, so a parse failure
                // is our bug, not the client's.
                error!(user_id = %job.user_id, detail = %detail, "transcoder emitted unusable waveform");
                return Outcome::Failure(FailureReason::Internal);
            }
        };

        info!(user_id = %job.user_id, transcription = %transcription, "utterance transcribed");

        // Stage 4: conversation engine or fallback.
        let response = self.respond(&job.user_id, &transcription).await;

        Outcome::Success {
            transcription,
            response,
        }
    }

    /// Compute the reply text for a transcribed utterance.
    ///
    /// Engine-level failures are a *successful* pipeline outcome carrying
    /// explanatory text: the caller's question is "did we get something to
    /// say back", and we did. The session history is only extended when the
    /// engine actually replied.
    async fn respond(&self, user_id: &str, transcription: &str) -> String {
        let engine = match &self.engine {
            Some(engine) => engine,
            None => return fallback::respond(transcription).to_string(),
        };

        let session = match self.registry.get(user_id) {
            Some(session) => session,
            None => {
                warn!(user_id = %user_id, "audio for a connection without a session");
                return NO_SESSION_REPLY.to_string();
            }
        };

        // Hold the history lock across the engine call: the exchange for
        // this connection is one atomic read-modify-write.
        let mut history = session.lock_history().await;
        match engine.chat(&history, transcription).await {
            Ok(ChatOutcome::Reply(reply)) => {
                history.push(ChatTurn::user(transcription));
                history.push(ChatTurn::model(reply.clone()));
                reply
            }
            Ok(ChatOutcome::ContentFiltered(reason)) => {
                warn!(user_id = %user_id, reason = %reason, "engine blocked the utterance");
                format!("I can't respond to that due to content safety: {}", reason)
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "engine call failed");
                ENGINE_TROUBLE_REPLY.to_string()
            }
        }
    }
}
