//! FLAC metadata blocks: stream marker, STREAMINFO, VORBIS_COMMENT, and
//! PADDING (spec component C10).
//!
//! The metadata block header and STREAMINFO layout mirror
//! `libflake/metadata.c`'s `flake_metadata_write_streaminfo` and
//! `encode.c`'s `write_headers`. The VORBIS_COMMENT reader/writer is
//! adapted from this crate's own `BlockVorbisComment`/`UserComment`
//! FLAC-tag support (the original `flake` only ever wrote a bare vendor
//! string; this crate lets callers populate real tags).

use std::fmt;
use std::fmt::Display;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::bitio::BitWriter;
use crate::error::{EncodeError, Result};

pub const STREAMINFO_SIZE: u32 = 34;
pub const MAX_VORBIS_COMMENT_ENTRIES: usize = 1024;

/// The four-byte `fLaC` stream marker every FLAC file begins with.
pub const STREAM_MARKER: [u8; 4] = *b"fLaC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MetadataBlockType {
    StreamInfo = 0,
    Padding = 1,
    VorbisComment = 4,
}

/// Emit a 4-byte metadata block header: 1 last-flag bit, 7 block-type
/// bits, 24 size bits.
pub fn write_block_header(buf: &mut [u8; 4], last: bool, block_type: MetadataBlockType, size: u32) {
    let mut bw = BitWriter::new(buf);
    bw.write_bits(1, last as u32);
    bw.write_bits(7, block_type as u32);
    bw.write_bits(24, size);
    bw.flush();
}

/// The STREAMINFO fields, gathered at `close()` time once the true
/// min/max frame size and final sample count are known.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub min_block_size: u32,
    pub max_block_size: u32,
    pub min_frame_size: u32,
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
    pub total_samples: u64,
    pub md5_signature: [u8; 16],
}

impl StreamInfo {
    /// Serialize the 34-byte STREAMINFO payload (header not included).
    pub fn write_to(&self, out: &mut [u8; 34]) {
        out.fill(0);
        let mut bw = BitWriter::new(&mut out[..18]);
        bw.write_bits(16, self.min_block_size);
        bw.write_bits(16, self.max_block_size);
        bw.write_bits(24, self.min_frame_size);
        bw.write_bits(24, self.max_frame_size);
        bw.write_bits(20, self.sample_rate);
        bw.write_bits(3, self.channels - 1);
        bw.write_bits(5, self.bits_per_sample - 1);
        bw.write_bits(4, (self.total_samples >> 32) as u32);
        bw.flush();
        out[14..18].copy_from_slice(&(self.total_samples as u32).to_be_bytes());
        out[18..34].copy_from_slice(&self.md5_signature);
    }
}

/// One `FIELD=value` Vorbis comment entry.
#[derive(Debug, Clone)]
pub struct UserComment {
    comment: String,
    value_offset: Option<usize>,
}

impl UserComment {
    /// Build an entry from a raw `FIELD=value` string, validating it is
    /// non-empty, contains the `=` separator, and that every field-name
    /// byte before it falls in the allowed range `0x20..=0x7D` (ASCII
    /// printable, excluding `=` itself).
    pub fn parse(comment: impl Into<String>) -> Result<Self> {
        let comment = comment.into();
        match comment.find('=') {
            Some(0) | None => Err(EncodeError::InvalidCommentEntry(comment)),
            Some(offset) => {
                if comment.as_bytes()[..offset]
                    .iter()
                    .all(|&b| (0x20..=0x7D).contains(&b))
                {
                    Ok(UserComment {
                        comment,
                        value_offset: Some(offset),
                    })
                } else {
                    Err(EncodeError::InvalidCommentEntry(comment))
                }
            }
        }
    }

    fn new_unchecked(comment: String) -> Self {
        let value_offset = comment.find('=');
        UserComment {
            comment,
            value_offset,
        }
    }

    pub fn key(&self) -> &str {
        match self.value_offset {
            Some(offset) => &self.comment[..offset],
            None => &self.comment,
        }
    }

    pub fn value(&self) -> &str {
        match self.value_offset {
            Some(offset) => &self.comment[offset + 1..],
            None => "",
        }
    }

    pub fn entry(&self) -> &str {
        &self.comment
    }

    fn write_to<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.comment.len() as u32)?;
        writer.write_all(self.comment.as_bytes())?;
        Ok(())
    }
}

/// Convenience constructors for the common tag fields, mirroring the
/// `UserCommentExt` helpers this crate's FLAC tag support already
/// provides for tools that edit existing files.
pub trait UserCommentExt {
    fn title<S: Display>(value: S) -> Self;
    fn artist<S: Display>(value: S) -> Self;
    fn album<S: Display>(value: S) -> Self;
    fn date<S: Display>(value: S) -> Self;
    fn track_number<S: Display>(value: S) -> Self;
    fn track_total<S: Display>(value: S) -> Self;
    fn disc_number<S: Display>(value: S) -> Self;
    fn disc_total<S: Display>(value: S) -> Self;
    fn album_artist<S: Display>(value: S) -> Self;
}

impl UserCommentExt for UserComment {
    fn title<S: Display>(value: S) -> Self {
        Self::new_unchecked(format!("TITLE={}", value))
    }
    fn artist<S: Display>(value: S) -> Self {
        Self::new_unchecked(format!("ARTIST={}", value))
    }
    fn album<S: Display>(value: S) -> Self {
        Self::new_unchecked(format!("ALBUM={}", value))
    }
    fn date<S: Display>(value: S) -> Self {
        Self::new_unchecked(format!("DATE={}", value))
    }
    fn track_number<S: Display>(value: S) -> Self {
        Self::new_unchecked(format!("TRACKNUMBER={}", value))
    }
    fn track_total<S: Display>(value: S) -> Self {
        Self::new_unchecked(format!("TRACKTOTAL={}", value))
    }
    fn disc_number<S: Display>(value: S) -> Self {
        Self::new_unchecked(format!("DISCNUMBER={}", value))
    }
    fn disc_total<S: Display>(value: S) -> Self {
        Self::new_unchecked(format!("DISCTOTAL={}", value))
    }
    fn album_artist<S: Display>(value: S) -> Self {
        Self::new_unchecked(format!("ALBUMARTIST={}", value))
    }
}

/// A VORBIS_COMMENT metadata block: a vendor string plus up to 1024
/// `FIELD=value` entries.
#[derive(Debug, Clone)]
pub struct VorbisComment {
    pub vendor_string: String,
    comments: Vec<UserComment>,
}

impl Default for VorbisComment {
    fn default() -> Self {
        VorbisComment {
            vendor_string: concat!("flac-encode ", env!("CARGO_PKG_VERSION")).to_string(),
            comments: Vec::new(),
        }
    }
}

impl VorbisComment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: impl Into<String>) -> Result<()> {
        if self.comments.len() >= MAX_VORBIS_COMMENT_ENTRIES {
            return Err(EncodeError::TooManyCommentEntries);
        }
        self.comments.push(UserComment::parse(entry)?);
        Ok(())
    }

    pub fn push_comment(&mut self, comment: UserComment) -> Result<()> {
        if self.comments.len() >= MAX_VORBIS_COMMENT_ENTRIES {
            return Err(EncodeError::TooManyCommentEntries);
        }
        self.comments.push(comment);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserComment> {
        self.comments.iter()
    }

    /// Payload size in bytes (not including the 4-byte block header).
    pub fn encoded_size(&self) -> u32 {
        let mut size = 4 + self.vendor_string.len() as u32 + 4;
        for c in &self.comments {
            size += 4 + c.entry().len() as u32;
        }
        size
    }

    pub fn write_to<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.vendor_string.len() as u32)?;
        writer.write_all(self.vendor_string.as_bytes())?;
        writer.write_u32::<LittleEndian>(self.comments.len() as u32)?;
        for c in &self.comments {
            c.write_to(writer)?;
        }
        Ok(())
    }
}

impl fmt::Display for VorbisComment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.comments {
            writeln!(f, "{}", c.entry())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_header_packs_last_flag_type_and_size() {
        let mut buf = [0u8; 4];
        write_block_header(&mut buf, true, MetadataBlockType::StreamInfo, 34);
        assert_eq!(buf[0], 0b1000_0000);
        assert_eq!(u32::from_be_bytes(buf) & 0x00FF_FFFF, 34);
    }

    #[test]
    fn streaminfo_round_trips_field_widths() {
        let si = StreamInfo {
            min_block_size: 4096,
            max_block_size: 4096,
            min_frame_size: 100,
            max_frame_size: 2000,
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
            total_samples: 123_456_789,
            md5_signature: [0xAB; 16],
        };
        let mut out = [0u8; 34];
        si.write_to(&mut out);
        assert_eq!(u16::from_be_bytes([out[0], out[1]]), 4096);
        assert_eq!(&out[18..34], &[0xABu8; 16]);
    }

    #[test]
    fn comment_entry_requires_equals_sign() {
        assert!(UserComment::parse("TITLE=foo").is_ok());
        assert!(UserComment::parse("no equals here").is_err());
        assert!(UserComment::parse("=bar").is_err());
    }

    #[test]
    fn comment_entry_rejects_out_of_range_field_bytes() {
        // '~' is 0x7E, just past the allowed 0x20..=0x7D field-name range.
        assert!(UserComment::parse("TIT~LE=foo").is_err());
        // A literal newline in the field name is well below 0x20.
        assert!(UserComment::parse("TIT\nLE=foo").is_err());
    }

    #[test]
    fn vorbis_comment_rejects_more_than_1024_entries() {
        let mut vc = VorbisComment::new();
        for i in 0..MAX_VORBIS_COMMENT_ENTRIES {
            vc.push(format!("T{i}=v")).unwrap();
        }
        assert!(vc.push("ONE_TOO_MANY=v").is_err());
    }

    #[test]
    fn vorbis_comment_ext_helpers_produce_expected_keys() {
        let c = UserComment::title("My Song");
        assert_eq!(c.key(), "TITLE");
        assert_eq!(c.value(), "My Song");
    }
}
