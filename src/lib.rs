//! A lossless PCM to FLAC encoder.
//!
//! This crate is a from-scratch Rust port of the encoding pipeline found
//! in Justin Ruggles' `flake` FLAC encoder: per-frame stereo
//! decorrelation, fixed and LPC predictor search, Rice-coded residual
//! partitioning, and an optional variable block-size heuristic, wrapped
//! in a streaming [`encoder::FlacEncoder`] that writes a standards
//! compliant `.flac` stream (stream marker, STREAMINFO, VORBIS_COMMENT,
//! optional PADDING, then one frame per call to
//! [`encoder::FlacEncoder::encode_frame`]).
//!
//! ```no_run
//! use flac_encode::encoder::{EncodeParams, FlacEncoder};
//! use flac_encode::metadata::VorbisComment;
//!
//! # fn main() -> flac_encode::error::Result<()> {
//! let params = EncodeParams::from_compression_level(5)?;
//! let mut out = Vec::new();
//! let vc = VorbisComment::new();
//! let mut enc = FlacEncoder::init(&mut out, 2, 44100, 16, 0, params, &vc)?;
//! let silence = vec![0i32; 4096 * 2];
//! enc.encode_frame(&silence, 4096)?;
//! enc.close()?;
//! # Ok(())
//! # }
//! ```

pub mod bitio;
pub mod crc;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod lpc;
pub mod md5;
pub mod metadata;
pub mod pcm;
pub mod residual;
pub mod rice;
pub mod vbs;

/// Smallest block size a FLAC frame header can express.
pub const FLAC_MIN_BLOCKSIZE: u32 = 16;
/// Largest block size a FLAC frame header can express.
pub const FLAC_MAX_BLOCKSIZE: u32 = 65535;
/// Largest channel count this encoder (and the FLAC format) supports.
pub const FLAC_MAX_CH: u32 = 8;

pub use encoder::{EncodeParams, FlacEncoder, StereoMethod, ValidationOutcome};
pub use error::{EncodeError, Result};
pub use metadata::{StreamInfo, UserComment, UserCommentExt, VorbisComment};
pub use residual::{OrderMethod, PredictionType};
