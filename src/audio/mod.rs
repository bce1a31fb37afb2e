//! Audio handling: transport payload decoding and container transcoding.

pub mod decode;
pub mod transcode;

pub use decode::{decode_transport, DecodeError};
pub use transcode::{FfmpegTranscoder, TranscodeError, Transcoder};
