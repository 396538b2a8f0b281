use thiserror::Error;

/// Errors surfaced by the public encoder API.
///
/// Validation and ordering errors leave the encoder state untouched; a
/// caller may fix the offending parameter and retry. A bitstream overflow
/// that survives the verbatim fallback is the only error that corresponds
/// to a dropped frame.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("invalid encoder parameters: {0}")]
    InvalidParams(&'static str),

    #[error("channel count {0} out of range [1,8]")]
    InvalidChannels(u32),

    #[error("sample rate {0} out of range [1,655350]")]
    InvalidSampleRate(u32),

    #[error("bits per sample {0} out of range [4,32]")]
    InvalidBitsPerSample(u32),

    #[error("block size {0} out of range [{min},{max}]", min = crate::FLAC_MIN_BLOCKSIZE, max = crate::FLAC_MAX_BLOCKSIZE)]
    InvalidBlockSize(u32),

    #[error("encode_frame called with block_size {0} larger than the configured block size {1}")]
    BlockTooLarge(u32, u32),

    #[error("encode_frame called after a short (final) block already closed the stream")]
    StreamEnded,

    #[error("frame exceeded the output buffer even after verbatim fallback")]
    BitstreamOverflow,

    #[error("vorbis comment entry {0:?} is not a valid FIELD=VALUE pair")]
    InvalidCommentEntry(String),

    #[error("vorbis comment block holds more than 1024 entries")]
    TooManyCommentEntries,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EncodeError>;
