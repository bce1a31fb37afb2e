//! # Voice Relay Backend - Main Application Entry Point
//!
//! A real-time voice chat relay: browser clients stream recorded audio
//! clips over a WebSocket, the server transcribes them, forwards the text
//! to a conversational engine (one isolated history per connection), and
//! sends the reply back to the originating connection.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **state**: shared application state and metrics
//! - **session**: per-connection conversation sessions and their registry
//! - **audio**: transport decoding and ffmpeg transcoding
//! - **transcription**: speech-to-text adapter over the recognizer service
//! - **engine**: conversation engine adapter and the rule-based fallback
//! - **pipeline**: the per-utterance orchestrator run on worker tasks
//! - **websocket**: the per-connection event dispatcher actor
//! - **handlers / middleware / health**: HTTP surface and telemetry

mod audio;
mod config;
mod engine;
mod error;
mod handlers;
mod health;
mod middleware;
mod pipeline;
mod session;
mod state;
mod transcription;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::audio::FfmpegTranscoder;
use crate::config::AppConfig;
use crate::engine::{ConversationEngine, GeminiEngine};
use crate::pipeline::AudioPipeline;
use crate::session::SessionRegistry;
use crate::state::AppState;
use crate::transcription::GoogleSpeechClient;

/// Global shutdown signal, set by the signal handler task and polled by
/// the main task to stop the server gracefully.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-relay-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}",
        config.server.host, config.server.port
    );

    if config.using_default_secret() {
        warn!("SESSION_SECRET not set, running with the default session secret");
    }

    // Conversation engine: optional. Without an API key the whole process
    // degrades to the rule-based fallback responder, logged exactly once.
    let conversation_engine: Option<Arc<dyn ConversationEngine>> =
        if config.engine.is_configured() {
            info!(model = %config.engine.model, "Conversation engine configured");
            Some(Arc::new(GeminiEngine::from_config(&config.engine)))
        } else {
            warn!("GEMINI_API_KEY not found. AI features will use fallback responses.");
            None
        };

    // The registry is owned here and injected everywhere it is needed;
    // there is no ambient global session table.
    let registry = Arc::new(SessionRegistry::new());
    let transcoder = Arc::new(FfmpegTranscoder::new(&config.audio));
    let speech = Arc::new(GoogleSpeechClient::from_config(&config.speech));

    let audio_pipeline = Arc::new(AudioPipeline::new(
        registry.clone(),
        transcoder,
        speech,
        conversation_engine.clone(),
        config.audio.min_speech_bytes,
    ));

    let app_state = AppState::new(
        config.clone(),
        registry,
        audio_pipeline,
        conversation_engine,
    );
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        // The browser client may be served from anywhere during
        // development, so CORS stays wide open.
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::RequestTelemetry)
            .route("/", web::get().to(handlers::index))
            .route("/test-gemini", web::get().to(handlers::test_engine))
            .route("/ws", web::get().to(websocket::voice_websocket))
            .route("/health", web::get().to(health::health_check))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics)),
            )
            .default_service(web::route().to(handlers::not_found))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Race the server against the shutdown signal.
    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` controls verbosity; the default keeps this crate at debug
/// and the framework at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_relay_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and set the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag without busy-waiting.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
