//! Minimal RIFF/WAVE container parsing.
//!
//! The recognizer wants raw little-endian PCM plus the sample rate, not a
//! container, so the client peels the header off the transcoder's output
//! here. Only what the pipeline produces is supported: PCM (format tag 1)
//! with a standard chunk layout. Anything else is a transcoder bug and
//! surfaces as `InvalidWaveform`.

use byteorder::{ByteOrder, LittleEndian};

use super::TranscriptionError;

/// Parsed WAV payload: the raw samples plus the format facts the
/// recognizer request needs.
#[derive(Debug, Clone, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub pcm: Vec<u8>,
}

impl WavInfo {
    /// Duration of the clip in milliseconds, for diagnostics.
    pub fn duration_ms(&self) -> u64 {
        let bytes_per_second =
            self.sample_rate as u64 * self.channels as u64 * (self.bits_per_sample as u64 / 8);
        if bytes_per_second == 0 {
            return 0;
        }
        self.pcm.len() as u64 * 1000 / bytes_per_second
    }
}

/// Parse a WAV container into sample data and format info.
pub fn parse_wav(bytes: &[u8]) -> Result<WavInfo, TranscriptionError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(TranscriptionError::InvalidWaveform(
            "missing RIFF/WAVE header".to_string(),
        ));
    }

    let mut sample_rate = None;
    let mut channels = None;
    let mut bits_per_sample = None;
    let mut pcm = None;

    // Walk the chunk list: 4-byte id, little-endian u32 size, payload
    // (padded to an even byte count).
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let chunk_id = &bytes[offset..offset + 4];
        let chunk_size = LittleEndian::read_u32(&bytes[offset + 4..offset + 8]) as usize;
        let body_start = offset + 8;
        let body_end = body_start.saturating_add(chunk_size).min(bytes.len());

        match chunk_id {
            b"fmt " => {
                let body = &bytes[body_start..body_end];
                if body.len() < 16 {
                    return Err(TranscriptionError::InvalidWaveform(
                        "fmt chunk too short".to_string(),
                    ));
                }
                let format_tag = LittleEndian::read_u16(&body[0..2]);
                if format_tag != 1 {
                    return Err(TranscriptionError::InvalidWaveform(format!(
                        "unsupported format tag {} (expected PCM)",
                        format_tag
                    )));
                }
                channels = Some(LittleEndian::read_u16(&body[2..4]));
                sample_rate = Some(LittleEndian::read_u32(&body[4..8]));
                bits_per_sample = Some(LittleEndian::read_u16(&body[14..16]));
            }
            b"data" => {
                pcm = Some(bytes[body_start..body_end].to_vec());
            }
            _ => {} // LIST, fact, etc., skip
        }

        offset = body_start + chunk_size + (chunk_size % 2);
    }

    match (sample_rate, channels, bits_per_sample, pcm) {
        (Some(sample_rate), Some(channels), Some(bits_per_sample), Some(pcm)) => Ok(WavInfo {
            sample_rate,
            channels,
            bits_per_sample,
            pcm,
        }),
        (None, ..) | (_, None, ..) | (_, _, None, _) => Err(TranscriptionError::InvalidWaveform(
            "missing fmt chunk".to_string(),
        )),
        _ => Err(TranscriptionError::InvalidWaveform(
            "missing data chunk".to_string(),
        )),
    }
}

#[cfg(test)]
pub(crate) fn build_wav(sample_rate: u32, channels: u16, pcm: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let data_len = pcm.len() as u32;
    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let pcm: Vec<u8> = (0..64).collect();
        let wav = build_wav(16000, 1, &pcm);

        let info = parse_wav(&wav).unwrap();
        assert_eq!(info.sample_rate, 16000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.pcm, pcm);
    }

    #[test]
    fn test_rejects_non_riff_input() {
        let err = parse_wav(b"OggS-not-a-wav-file").unwrap_err();
        assert!(matches!(err, TranscriptionError::InvalidWaveform(_)));
    }

    #[test]
    fn test_rejects_truncated_header() {
        let err = parse_wav(b"RIFF").unwrap_err();
        assert!(matches!(err, TranscriptionError::InvalidWaveform(_)));
    }

    #[test]
    fn test_rejects_missing_data_chunk() {
        let full = build_wav(16000, 1, &[0u8; 32]);
        // Keep header + fmt chunk, drop the data chunk entirely.
        let truncated = &full[..36];
        let err = parse_wav(truncated).unwrap_err();
        match err {
            TranscriptionError::InvalidWaveform(msg) => assert!(msg.contains("data")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_compressed_format_tag() {
        let mut wav = build_wav(16000, 1, &[0u8; 8]);
        // Patch the format tag to 85 (MP3).
        wav[20] = 85;
        wav[21] = 0;
        let err = parse_wav(&wav).unwrap_err();
        match err {
            TranscriptionError::InvalidWaveform(msg) => assert!(msg.contains("format tag")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_duration_ms() {
        // 16 kHz mono 16-bit: 32000 bytes per second.
        let info = WavInfo {
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
            pcm: vec![0u8; 32000],
        };
        assert_eq!(info.duration_ms(), 1000);
    }
}
