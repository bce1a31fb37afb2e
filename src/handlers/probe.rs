//! Engine connectivity probe.
//!
//! `GET /test-gemini` issues a single non-conversational call so a
//! deployment can verify the engine key and model without opening a
//! voice connection. No session is involved and nothing is recorded.

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::error;

use crate::state::AppState;

/// Prompt used for the connectivity check.
const PROBE_PROMPT: &str = "Say hello in a friendly way for an API test!";

pub async fn test_engine(state: web::Data<AppState>) -> HttpResponse {
    let engine = match &state.engine {
        Some(engine) => engine.clone(),
        None => {
            return HttpResponse::InternalServerError().json(json!({
                "error": "Gemini API not configured or model initialization failed"
            }));
        }
    };

    match engine.probe(PROBE_PROMPT).await {
        Ok(response) => HttpResponse::Ok().json(json!({
            "success": true,
            "response": response,
            "model_name": engine.model_name(),
        })),
        Err(e) => {
            error!(error = %e, "engine probe failed");
            HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::engine::{ChatOutcome, ConversationEngine, EngineError};
    use crate::pipeline::AudioPipeline;
    use crate::session::{ChatTurn, SessionRegistry};
    use crate::transcription::{SpeechToText, TranscriptionError};
    use crate::audio::{TranscodeError, Transcoder};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoopTranscoder;

    #[async_trait]
    impl Transcoder for NoopTranscoder {
        async fn to_wav(&self, encoded: &[u8]) -> Result<Vec<u8>, TranscodeError> {
            Ok(encoded.to_vec())
        }
    }

    struct NoopSpeech;

    #[async_trait]
    impl SpeechToText for NoopSpeech {
        async fn recognize(&self, _wav: &[u8]) -> Result<String, TranscriptionError> {
            Ok(String::new())
        }
    }

    struct ProbeOnlyEngine {
        reply: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl ConversationEngine for ProbeOnlyEngine {
        async fn chat(
            &self,
            _history: &[ChatTurn],
            _utterance: &str,
        ) -> Result<ChatOutcome, EngineError> {
            Ok(ChatOutcome::Reply("unused".to_string()))
        }

        async fn probe(&self, _prompt: &str) -> Result<String, EngineError> {
            match self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(detail) => Err(EngineError::Request(detail.to_string())),
            }
        }

        fn model_name(&self) -> &str {
            "probe-test-model"
        }
    }

    fn state_with_engine(engine: Option<Arc<dyn ConversationEngine>>) -> web::Data<AppState> {
        let registry = Arc::new(SessionRegistry::new());
        let pipeline = Arc::new(AudioPipeline::new(
            registry.clone(),
            Arc::new(NoopTranscoder),
            Arc::new(NoopSpeech),
            engine.clone(),
            500,
        ));
        web::Data::new(AppState::new(
            AppConfig::default(),
            registry,
            pipeline,
            engine,
        ))
    }

    #[actix_web::test]
    async fn test_probe_without_engine_is_500() {
        let state = state_with_engine(None);
        let response = test_engine(state).await;
        assert_eq!(response.status().as_u16(), 500);
    }

    #[actix_web::test]
    async fn test_probe_success() {
        let state = state_with_engine(Some(Arc::new(ProbeOnlyEngine {
            reply: Ok("Hello from the probe!"),
        })));
        let response = test_engine(state).await;
        assert_eq!(response.status().as_u16(), 200);
    }

    #[actix_web::test]
    async fn test_probe_engine_failure_is_500() {
        let state = state_with_engine(Some(Arc::new(ProbeOnlyEngine {
            reply: Err("quota exceeded"),
        })));
        let response = test_engine(state).await;
        assert_eq!(response.status().as_u16(), 500);
    }
}
