//! Conversation engine: the stateful chat abstraction behind each session,
//! plus the rule-based fallback used when no engine is configured.
//!
//! The engine call returns a tagged outcome instead of making callers probe
//! error objects for block reasons: a content-safety rejection is a normal,
//! representable result (`ChatOutcome::ContentFiltered`), distinct from the
//! transport and protocol failures in [`EngineError`].

pub mod fallback;
pub mod gemini;

pub use gemini::GeminiEngine;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::ChatTurn;

/// Outcome of a conversational engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    /// The engine produced a reply to speak back.
    Reply(String),

    /// The engine refused on content-safety grounds; the reason is the
    /// engine's block-category label, suitable for a user-facing message.
    ContentFiltered(String),
}

/// Errors from one engine call.
#[derive(Debug, Error)]
pub enum EngineError {
    /// HTTP transport or connection error.
    #[error("engine request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("engine request timed out")]
    Timeout,

    /// The response could not be parsed as the expected JSON shape.
    #[error("failed to parse engine response: {0}")]
    Parse(String),

    /// The engine answered but carried no usable reply text.
    #[error("engine returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EngineError::Timeout
        } else {
            EngineError::Request(e.to_string())
        }
    }
}

/// Stateful per-user chat abstraction.
///
/// `chat` appends nothing itself: the caller owns the history and decides,
/// based on the outcome, whether the exchange is recorded. `probe` is a
/// single non-conversational call used by the connectivity test endpoint.
#[async_trait]
pub trait ConversationEngine: Send + Sync {
    async fn chat(&self, history: &[ChatTurn], utterance: &str)
        -> Result<ChatOutcome, EngineError>;

    async fn probe(&self, prompt: &str) -> Result<String, EngineError>;

    fn model_name(&self) -> &str;
}
