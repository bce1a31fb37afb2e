//! Gemini `generateContent` client.
//!
//! Stateless over the wire: every call ships the session's full history
//! plus the new utterance, so the only conversation state in the process
//! is the history each [`crate::session::Session`] owns. Connection
//! details come from [`EngineConfig`]; the base URL is overridable so
//! tests can point the client at a local stub.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ChatOutcome, ConversationEngine, EngineError};
use crate::config::EngineConfig;
use crate::session::ChatTurn;

/// System instruction shaping replies for speech output.
const SYSTEM_INSTRUCTION: &str = "You are a friendly and engaging voice assistant. \
    Keep your responses conversational, concise (generally 1-3 sentences unless more \
    detail is clearly needed), and natural for speech. Refer to previous parts of the \
    conversation if relevant.";

/// Harm categories blocked at medium-and-above severity.
const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub struct GeminiEngine {
    client: Client,
    config: EngineConfig,
}

impl GeminiEngine {
    pub fn from_config(config: &EngineConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }

    /// Build the request body for a chat turn: system instruction, prior
    /// history, the new utterance, generation config, safety settings.
    fn request_body(&self, history: &[ChatTurn], utterance: &str) -> Value {
        let mut contents: Vec<Value> = history
            .iter()
            .map(|turn| {
                json!({
                    "role": turn.role.as_str(),
                    "parts": [{ "text": turn.text }]
                })
            })
            .collect();
        contents.push(json!({
            "role": "user",
            "parts": [{ "text": utterance }]
        }));

        json!({
            "system_instruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
            "contents": contents,
            "generationConfig": {
                "temperature": self.config.temperature,
                "topP": self.config.top_p,
                "topK": self.config.top_k,
                "maxOutputTokens": self.config.max_output_tokens
            },
            "safetySettings": SAFETY_CATEGORIES.iter().map(|category| json!({
                "category": category,
                "threshold": "BLOCK_MEDIUM_AND_ABOVE"
            })).collect::<Vec<_>>()
        })
    }

    /// Interpret a generateContent response document.
    ///
    /// A `promptFeedback.blockReason` or a `SAFETY` finish reason is a
    /// content-filter outcome, not an error: the pipeline owes the user an
    /// explanation either way. Everything else must carry reply text.
    fn parse_response(doc: &Value) -> Result<ChatOutcome, EngineError> {
        if let Some(reason) = doc["promptFeedback"]["blockReason"].as_str() {
            return Ok(ChatOutcome::ContentFiltered(reason.to_string()));
        }

        let candidate = &doc["candidates"][0];
        if candidate["finishReason"].as_str() == Some("SAFETY") {
            return Ok(ChatOutcome::ContentFiltered("SAFETY".to_string()));
        }

        let parts = candidate["content"]["parts"]
            .as_array()
            .ok_or(EngineError::EmptyResponse)?;

        let text: String = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::EmptyResponse);
        }

        Ok(ChatOutcome::Reply(text.to_string()))
    }

    async fn generate(&self, body: Value) -> Result<ChatOutcome, EngineError> {
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::Request(format!(
                "engine returned HTTP {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let doc: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Parse(e.to_string()))?;

        Self::parse_response(&doc)
    }
}

#[async_trait]
impl ConversationEngine for GeminiEngine {
    async fn chat(
        &self,
        history: &[ChatTurn],
        utterance: &str,
    ) -> Result<ChatOutcome, EngineError> {
        self.generate(self.request_body(history, utterance)).await
    }

    /// Single non-conversational call: no history, no system instruction.
    async fn probe(&self, prompt: &str) -> Result<String, EngineError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        match self.generate(body).await? {
            ChatOutcome::Reply(text) => Ok(text),
            ChatOutcome::ContentFiltered(reason) => Err(EngineError::Request(format!(
                "probe prompt blocked: {}",
                reason
            ))),
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn test_engine() -> GeminiEngine {
        let mut config = AppConfig::default().engine;
        config.api_key = "test-key".to_string();
        GeminiEngine::from_config(&config)
    }

    #[test]
    fn test_endpoint_includes_model() {
        let engine = test_engine();
        assert_eq!(
            engine.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn test_request_body_carries_history_in_order() {
        let engine = test_engine();
        let history = vec![ChatTurn::user("first"), ChatTurn::model("second")];
        let body = engine.request_body(&history, "third");

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "first");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "third");

        // Generation knobs from the config.
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_parse_reply() {
        let doc = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello " }, { "text": "there!" }] },
                "finishReason": "STOP"
            }]
        });
        let outcome = GeminiEngine::parse_response(&doc).unwrap();
        assert_eq!(outcome, ChatOutcome::Reply("Hello there!".to_string()));
    }

    #[test]
    fn test_parse_prompt_block() {
        let doc = json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        });
        let outcome = GeminiEngine::parse_response(&doc).unwrap();
        assert_eq!(outcome, ChatOutcome::ContentFiltered("SAFETY".to_string()));
    }

    #[test]
    fn test_parse_safety_finish_reason() {
        let doc = json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        });
        let outcome = GeminiEngine::parse_response(&doc).unwrap();
        assert_eq!(outcome, ChatOutcome::ContentFiltered("SAFETY".to_string()));
    }

    #[test]
    fn test_parse_empty_candidates_is_an_error() {
        let doc = json!({ "candidates": [] });
        let err = GeminiEngine::parse_response(&doc).unwrap_err();
        assert!(matches!(err, EngineError::EmptyResponse));
    }

    #[test]
    fn test_parse_blank_text_is_an_error() {
        let doc = json!({
            "candidates": [{ "content": { "parts": [{ "text": "   " }] } }]
        });
        let err = GeminiEngine::parse_response(&doc).unwrap_err();
        assert!(matches!(err, EngineError::EmptyResponse));
    }
}
