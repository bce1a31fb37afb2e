//! # Application State Management
//!
//! Shared state accessed by every HTTP handler and WebSocket connection.
//!
//! ## Arc<RwLock<T>> Pattern:
//! - **Arc**: multiple handlers hold a reference to the same state
//! - **RwLock**: many readers or one writer at a time
//! - Locks are only ever held for a clone or a counter bump, never across
//!   an await point
//!
//! The session registry, pipeline, and engine handles are plain `Arc`s:
//! they manage their own interior locking, and injecting them here (rather
//! than reaching for a module global) is what lets tests build an isolated
//! state per case.

use crate::config::AppConfig;
use crate::engine::ConversationEngine;
use crate::pipeline::AudioPipeline;
use crate::session::SessionRegistry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (readable at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Request and pipeline metrics (updated by every request)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,

    /// Connection id → conversation session mapping
    pub registry: Arc<SessionRegistry>,

    /// The audio processing pipeline shared by all connections
    pub pipeline: Arc<AudioPipeline>,

    /// Conversation engine, absent when no API key was configured
    pub engine: Option<Arc<dyn ConversationEngine>>,
}

/// Metrics collected across all HTTP requests and pipeline runs.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of request errors since server start
    pub error_count: u64,

    /// Currently connected WebSocket clients
    pub active_connections: u32,

    /// Audio jobs handed to a pipeline worker since server start
    pub audio_jobs_dispatched: u64,

    /// Audio jobs that ended in a failure outcome
    pub audio_jobs_failed: u64,

    /// Per-endpoint statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a specific endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: Arc<SessionRegistry>,
        pipeline: Arc<AudioPipeline>,
        engine: Option<Arc<dyn ConversationEngine>>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
            registry,
            pipeline,
            engine,
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately so other handlers are never
    /// blocked; AppConfig is cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Whether the conversation engine is available for this process.
    pub fn engine_ready(&self) -> bool {
        self.engine.is_some()
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record per-endpoint request metrics (called by the telemetry
    /// middleware on every response).
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn increment_active_connections(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_connections += 1;
    }

    pub fn decrement_active_connections(&self) {
        let mut metrics = self.metrics.write().unwrap();
        // Underflow protection: never drop below zero.
        if metrics.active_connections > 0 {
            metrics.active_connections -= 1;
        }
    }

    /// Record that an audio job was dispatched to a worker.
    pub fn record_audio_job_dispatched(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.audio_jobs_dispatched += 1;
    }

    /// Record a terminal failure outcome from a pipeline run.
    pub fn record_audio_job_failed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.audio_jobs_failed += 1;
    }

    /// Get a consistent snapshot of current metrics for the HTTP surface.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_connections: metrics.active_connections,
            audio_jobs_dispatched: metrics.audio_jobs_dispatched,
            audio_jobs_failed: metrics.audio_jobs_failed,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time in milliseconds for this endpoint.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate as a fraction (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Transcoder;
    use crate::transcription::SpeechToText;
    use async_trait::async_trait;

    struct NoopTranscoder;

    #[async_trait]
    impl Transcoder for NoopTranscoder {
        async fn to_wav(&self, encoded: &[u8]) -> Result<Vec<u8>, crate::audio::TranscodeError> {
            Ok(encoded.to_vec())
        }
    }

    struct NoopSpeech;

    #[async_trait]
    impl SpeechToText for NoopSpeech {
        async fn recognize(
            &self,
            _wav: &[u8],
        ) -> Result<String, crate::transcription::TranscriptionError> {
            Ok(String::new())
        }
    }

    fn test_state() -> AppState {
        let registry = Arc::new(SessionRegistry::new());
        let pipeline = Arc::new(AudioPipeline::new(
            registry.clone(),
            Arc::new(NoopTranscoder),
            Arc::new(NoopSpeech),
            None,
            500,
        ));
        AppState::new(AppConfig::default(), registry, pipeline, None)
    }

    #[test]
    fn test_request_counters() {
        let state = test_state();
        state.increment_request_count();
        state.increment_request_count();
        state.increment_error_count();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);
    }

    #[test]
    fn test_active_connections_never_underflow() {
        let state = test_state();
        state.decrement_active_connections();
        assert_eq!(state.get_metrics_snapshot().active_connections, 0);

        state.increment_active_connections();
        state.decrement_active_connections();
        assert_eq!(state.get_metrics_snapshot().active_connections, 0);
    }

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let state = test_state();
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = snapshot.endpoint_metrics.get("GET /health").unwrap();
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.total_duration_ms, 40);
        assert!((metric.average_duration_ms() - 20.0).abs() < f64::EPSILON);
        assert!((metric.error_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_engine_ready_reflects_injection() {
        let state = test_state();
        assert!(!state.engine_ready());
    }
}
