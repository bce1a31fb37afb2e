//! Container transcoding via an external ffmpeg process.
//!
//! The browser records compressed containers (webm/opus, ogg, mp4); the
//! recognizer wants a plain 16 kHz mono WAV. ffmpeg does the conversion
//! through stdin/stdout pipes so no temp files touch the disk:
//!
//! ```text
//! ffmpeg -hide_banner -loglevel error -i pipe:0 \
//!        -f wav -acodec pcm_s16le -ar 16000 -ac 1 pipe:1
//! ```
//!
//! Each call is a fresh short-lived process guarded by a timeout; a hung
//! ffmpeg must not pin a pipeline worker forever.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::AudioConfig;

/// Errors from one transcoding attempt.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The transcoder binary could not be spawned at all.
    #[error("failed to launch transcoder '{path}': {detail}")]
    EngineUnavailable { path: String, detail: String },

    /// ffmpeg rejected the input (exited non-zero).
    #[error("transcoding failed: {0}")]
    InvalidAudio(String),

    /// The process exceeded the configured timeout.
    #[error("transcoding timed out after {0:?}")]
    Timeout(Duration),

    /// Pipe I/O with the child process failed.
    #[error("transcoder I/O error: {0}")]
    Io(String),
}

/// Converts an arbitrary compressed audio container into a WAV waveform.
///
/// Stateless, pure function of the input bytes; implementors must be
/// `Send + Sync` so one instance serves every pipeline worker.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn to_wav(&self, encoded: &[u8]) -> Result<Vec<u8>, TranscodeError>;
}

/// ffmpeg-backed [`Transcoder`].
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    sample_rate: u32,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            sample_rate: config.target_sample_rate,
            timeout: Duration::from_secs(config.transcode_timeout_secs),
        }
    }

    /// Argument list for one conversion run.
    fn command_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-f".to_string(),
            "wav".to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "pipe:1".to_string(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_wav(&self, encoded: &[u8]) -> Result<Vec<u8>, TranscodeError> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.command_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranscodeError::EngineUnavailable {
                path: self.ffmpeg_path.clone(),
                detail: e.to_string(),
            })?;

        // Feed the whole clip, then close stdin so ffmpeg sees EOF and
        // flushes its output. Writing and reading must overlap: ffmpeg
        // writes WAV data while we are still feeding input, and a full
        // stdout pipe would deadlock against our blocked write.
        let mut stdin = child.stdin.take().expect("stdin was piped");
        let input = encoded.to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| TranscodeError::Io(e.to_string()))?,
            Err(_) => return Err(TranscodeError::Timeout(self.timeout)),
        };

        // A write error usually just means ffmpeg bailed early on garbage
        // input and closed its end; the exit status below is the real
        // diagnostic, so only log it.
        if let Ok(Err(e)) = writer.await {
            debug!("transcoder stdin write ended early: {}", e);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TranscodeError::InvalidAudio(if stderr.is_empty() {
                format!("transcoder exited with {}", output.status)
            } else {
                stderr
            }));
        }

        if output.stdout.is_empty() {
            return Err(TranscodeError::InvalidAudio(
                "transcoder produced no output".to_string(),
            ));
        }

        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AudioConfig {
        AudioConfig {
            ffmpeg_path: "ffmpeg".to_string(),
            target_sample_rate: 16000,
            min_speech_bytes: 500,
            transcode_timeout_secs: 20,
        }
    }

    #[test]
    fn test_command_args_request_mono_pcm_wav() {
        let transcoder = FfmpegTranscoder::new(&test_config());
        let args = transcoder.command_args();

        let joined = args.join(" ");
        assert!(joined.contains("-i pipe:0"));
        assert!(joined.contains("-f wav"));
        assert!(joined.contains("-acodec pcm_s16le"));
        assert!(joined.contains("-ar 16000"));
        assert!(joined.contains("-ac 1"));
        assert!(joined.ends_with("pipe:1"));
    }

    #[test]
    fn test_sample_rate_follows_config() {
        let mut config = test_config();
        config.target_sample_rate = 8000;
        let transcoder = FfmpegTranscoder::new(&config);
        assert!(transcoder.command_args().join(" ").contains("-ar 8000"));
    }

    #[tokio::test]
    async fn test_missing_binary_maps_to_engine_unavailable() {
        let mut config = test_config();
        config.ffmpeg_path = "/nonexistent/ffmpeg-binary".to_string();
        let transcoder = FfmpegTranscoder::new(&config);

        let err = transcoder.to_wav(b"anything").await.unwrap_err();
        assert!(matches!(err, TranscodeError::EngineUnavailable { .. }));
    }
}
