//! HTTP client for the Google Web Speech recognizer endpoint.
//!
//! The endpoint takes raw little-endian PCM with an `audio/l16` content
//! type and answers with newline-delimited JSON documents. Lines with an
//! empty `result` array are keep-alive filler; a request whose every line
//! is empty means the service heard no recognizable speech.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{parse_wav, SpeechToText, TranscriptionError};
use crate::config::SpeechConfig;

/// Recognizer client. One instance is shared by every pipeline worker;
/// `reqwest::Client` pools connections internally.
pub struct GoogleSpeechClient {
    client: Client,
    config: SpeechConfig,
}

impl GoogleSpeechClient {
    pub fn from_config(config: &SpeechConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    /// Extract the first transcript from the newline-delimited JSON reply.
    ///
    /// Returns `None` when every line carries an empty result set, which
    /// the adapter maps to [`TranscriptionError::Unintelligible`].
    fn extract_transcript(body: &str) -> Result<Option<String>, TranscriptionError> {
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let doc: serde_json::Value = serde_json::from_str(line)
                .map_err(|e| TranscriptionError::Service(format!("malformed reply: {}", e)))?;

            let transcript = doc["result"][0]["alternative"][0]["transcript"].as_str();
            if let Some(text) = transcript {
                let text = text.trim();
                if !text.is_empty() {
                    return Ok(Some(text.to_string()));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl SpeechToText for GoogleSpeechClient {
    async fn recognize(&self, wav: &[u8]) -> Result<String, TranscriptionError> {
        let info = parse_wav(wav)?;
        debug!(
            sample_rate = info.sample_rate,
            channels = info.channels,
            duration_ms = info.duration_ms(),
            "submitting waveform to recognizer"
        );

        let mut request = self
            .client
            .post(&self.config.base_url)
            .query(&[
                ("client", "chromium"),
                ("lang", self.config.language.as_str()),
                ("pFilter", "0"),
            ])
            .header(
                "Content-Type",
                format!("audio/l16; rate={}", info.sample_rate),
            )
            .body(info.pcm);

        if !self.config.api_key.is_empty() {
            request = request.query(&[("key", self.config.api_key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranscriptionError::Service(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranscriptionError::Service(format!(
                "recognizer returned HTTP {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::Service(e.to_string()))?;

        match Self::extract_transcript(&body)? {
            Some(text) => Ok(text),
            None => Err(TranscriptionError::Unintelligible),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_transcript_from_second_line() {
        // First line is the usual empty filler document.
        let body = concat!(
            "{\"result\":[]}\n",
            "{\"result\":[{\"alternative\":[{\"transcript\":\"hello world\",",
            "\"confidence\":0.92}],\"final\":true}],\"result_index\":0}\n",
        );
        let transcript = GoogleSpeechClient::extract_transcript(body).unwrap();
        assert_eq!(transcript.as_deref(), Some("hello world"));
    }

    #[test]
    fn test_all_empty_lines_mean_no_speech() {
        let body = "{\"result\":[]}\n{\"result\":[]}\n";
        assert!(GoogleSpeechClient::extract_transcript(body)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_blank_body_means_no_speech() {
        assert!(GoogleSpeechClient::extract_transcript("")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_malformed_reply_is_a_service_error() {
        let err = GoogleSpeechClient::extract_transcript("not json at all").unwrap_err();
        assert!(matches!(err, TranscriptionError::Service(_)));
    }

    #[test]
    fn test_whitespace_transcript_is_skipped() {
        let body = "{\"result\":[{\"alternative\":[{\"transcript\":\"   \"}]}]}\n";
        assert!(GoogleSpeechClient::extract_transcript(body)
            .unwrap()
            .is_none());
    }
}
