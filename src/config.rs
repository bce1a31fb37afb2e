//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Special-case environment variables (HOST, PORT, GEMINI_API_KEY, SESSION_SECRET)
//! 2. Environment variables (APP_SERVER_HOST, APP_ENGINE_MODEL, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! The conversation-engine API key is deliberately env-first: leaving
//! `GEMINI_API_KEY` unset disables the engine and the server runs in
//! fallback-responder mode for every connection.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Placeholder secret shipped in the defaults. Startup warns when the
/// deployment has not overridden it.
pub const DEFAULT_SESSION_SECRET: &str = "your-default-secret-key";

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, engine, speech, audio)
/// keeps each vendor adapter's knobs next to each other and makes partial
/// overrides via environment variables predictable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub speech: SpeechConfig,
    pub audio: AudioConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to
/// - `port`: TCP port number to listen on
/// - `secret`: session secret for the connection layer (env `SESSION_SECRET`)
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub secret: String,
}

/// Conversation-engine configuration.
///
/// ## Fields:
/// - `api_key`: engine API key; empty string disables the engine entirely
/// - `base_url`: API root, overridable so tests can point at a local stub
/// - `model`: model name sent to the generateContent endpoint
/// - generation knobs (`temperature`, `top_p`, `top_k`, `max_output_tokens`)
///   tuned for short, natural spoken replies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl EngineConfig {
    /// The engine is configured only when a key is present.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Speech-recognizer configuration.
///
/// ## Fields:
/// - `base_url`: recognizer endpoint root
/// - `api_key`: key appended to the request when non-empty
/// - `language`: BCP-47 language tag sent with each utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub base_url: String,
    pub api_key: String,
    pub language: String,
    pub timeout_secs: u64,
}

/// Audio transcoding and validation settings.
///
/// ## Fields:
/// - `ffmpeg_path`: transcoder binary; must be on PATH if left relative
/// - `target_sample_rate`: waveform rate handed to the recognizer
/// - `min_speech_bytes`: advisory lower bound, shorter clips are still
///   processed, but a warning is logged because recognition will likely fail
/// - `transcode_timeout_secs`: hard cap on one ffmpeg invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub ffmpeg_path: String,
    pub target_sample_rate: u32,
    pub min_speech_bytes: usize,
    pub transcode_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8116,
                secret: DEFAULT_SESSION_SECRET.to_string(),
            },
            engine: EngineConfig {
                api_key: String::new(), // engine disabled until a key is provided
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                model: "gemini-1.5-flash".to_string(),
                temperature: 0.7,
                top_p: 0.9, // slightly raised for more naturalness in speech
                top_k: 40,
                max_output_tokens: 1024,
                timeout_secs: 30,
            },
            speech: SpeechConfig {
                base_url: "http://www.google.com/speech-api/v2/recognize".to_string(),
                api_key: String::new(),
                language: "en-US".to_string(),
                timeout_secs: 15,
            },
            audio: AudioConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                target_sample_rate: 16000,
                min_speech_bytes: 500,
                transcode_timeout_secs: 20,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Loading process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    ///    (APP_SERVER_PORT becomes server.port, and so on)
    /// 4. Apply the special-case variables deployment platforms and the
    ///    original tooling expect: HOST, PORT, GEMINI_API_KEY, SESSION_SECRET
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("GEMINI_API_KEY") {
            settings = settings.set_override("engine.api_key", key)?;
        }

        if let Ok(secret) = env::var("SESSION_SECRET") {
            settings = settings.set_override("server.secret", secret)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching configuration errors at startup prevents runtime failures
    /// deep inside a pipeline worker and produces a clear message about
    /// what is wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.engine.model.is_empty() {
            return Err(anyhow::anyhow!("Engine model name cannot be empty"));
        }

        if self.engine.max_output_tokens == 0 {
            return Err(anyhow::anyhow!(
                "Engine max_output_tokens must be greater than 0"
            ));
        }

        if self.speech.language.is_empty() {
            return Err(anyhow::anyhow!("Speech language cannot be empty"));
        }

        if self.audio.target_sample_rate == 0 {
            return Err(anyhow::anyhow!(
                "Audio target sample rate must be greater than 0"
            ));
        }

        if self.audio.min_speech_bytes == 0 {
            return Err(anyhow::anyhow!(
                "Minimum speech byte threshold must be greater than 0"
            ));
        }

        Ok(())
    }

    /// Whether the deployment still runs on the placeholder session secret.
    pub fn using_default_secret(&self) -> bool {
        self.server.secret == DEFAULT_SESSION_SECRET
    }
}
