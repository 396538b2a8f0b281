//! Top-level encoder: parameter presets, validation, and the streaming
//! frame-by-frame driver (spec component C9).
//!
//! Mirrors `libflake/encode.c`'s `flake_set_defaults`, `flake_validate_params`,
//! `flake_encode_init`, `flake_encode_frame`, and `flake_encode_close`,
//! plus `metadata.c`'s `flake_metadata_get_streaminfo`.

use std::io::{Seek, SeekFrom, Write};

use log::{debug, trace};

use crate::error::{EncodeError, Result};
use crate::frame::{self, FrameContext};
use crate::md5::Md5Accumulator;
use crate::metadata::{self, MetadataBlockType, StreamInfo, VorbisComment};
use crate::residual::{OrderMethod, PredictionType, ResidualParams};
use crate::vbs;
use crate::{FLAC_MAX_BLOCKSIZE, FLAC_MAX_CH, FLAC_MIN_BLOCKSIZE};

const SAMPLE_RATES: [u32; 16] = [
    0, 0, 0, 0, 8000, 16000, 22050, 24000, 32000, 44100, 48000, 96000, 0, 0, 0, 0,
];
const BIT_DEPTHS: [u32; 8] = [0, 8, 12, 0, 16, 20, 24, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StereoMethod {
    Independent,
    Estimate,
}

/// User-tunable encoding knobs, mirroring `FlakeEncodeParams`.
#[derive(Debug, Clone)]
pub struct EncodeParams {
    pub compression: u32,
    pub order_method: OrderMethod,
    pub stereo_method: StereoMethod,
    pub block_size: u32,
    pub padding_size: u32,
    pub min_prediction_order: u32,
    pub max_prediction_order: u32,
    pub prediction_type: PredictionType,
    pub min_partition_order: u32,
    pub max_partition_order: u32,
    pub variable_block_size: bool,
    pub allow_vbs: bool,
}

impl EncodeParams {
    /// Fill in every field from a compression level `0..=12`, mirroring
    /// `flake_set_defaults`. Levels 0-8 are libFLAC-compatible; 9-12 are
    /// Flake extensions (9-10 stay within the FLAC Subset and use
    /// variable block size, 11-12 step outside the Subset entirely).
    pub fn from_compression_level(level: u32) -> Result<Self> {
        if level > 12 {
            return Err(EncodeError::InvalidParams(
                "compression level must be in 0..=12",
            ));
        }

        let mut p = EncodeParams {
            compression: level,
            order_method: OrderMethod::Est,
            stereo_method: StereoMethod::Estimate,
            block_size: 4096,
            prediction_type: PredictionType::Lpc,
            min_prediction_order: 1,
            max_prediction_order: 8,
            min_partition_order: 0,
            max_partition_order: 5,
            padding_size: 8192,
            variable_block_size: false,
            allow_vbs: false,
        };

        match level {
            0 => {
                p.stereo_method = StereoMethod::Independent;
                p.block_size = 1152;
                p.prediction_type = PredictionType::Fixed;
                p.min_prediction_order = 2;
                p.max_prediction_order = 2;
                p.max_partition_order = 3;
            }
            1 => {
                p.block_size = 1152;
                p.prediction_type = PredictionType::Fixed;
                p.min_prediction_order = 2;
                p.max_prediction_order = 4;
                p.max_partition_order = 3;
            }
            2 => {
                p.block_size = 1152;
                p.prediction_type = PredictionType::Fixed;
                p.min_prediction_order = 0;
                p.max_prediction_order = 4;
                p.max_partition_order = 3;
            }
            3 => {
                p.stereo_method = StereoMethod::Independent;
                p.max_prediction_order = 6;
                p.max_partition_order = 4;
            }
            4 => {
                p.max_partition_order = 4;
            }
            5 => {}
            6 => {
                p.max_partition_order = 6;
            }
            7 => {
                p.order_method = OrderMethod::FourLevel;
                p.max_partition_order = 6;
            }
            8 => {
                p.order_method = OrderMethod::Log;
                p.max_prediction_order = 12;
                p.max_partition_order = 6;
            }
            9 => {
                p.order_method = OrderMethod::Log;
                p.max_prediction_order = 12;
                p.max_partition_order = 8;
                p.variable_block_size = true;
            }
            10 => {
                p.order_method = OrderMethod::Search;
                p.max_prediction_order = 12;
                p.max_partition_order = 8;
                p.variable_block_size = true;
            }
            11 => {
                p.block_size = 8192;
                p.order_method = OrderMethod::Log;
                p.max_prediction_order = 32;
                p.max_partition_order = 8;
                p.variable_block_size = true;
            }
            12 => {
                p.block_size = 8192;
                p.order_method = OrderMethod::Search;
                p.max_prediction_order = 32;
                p.max_partition_order = 8;
                p.variable_block_size = true;
            }
            _ => unreachable!(),
        }

        Ok(p)
    }
}

/// Whether a validated parameter set stays within the FLAC Subset (every
/// stream a standard decoder must accept) or steps outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Subset,
    NonSubset,
}

/// Validate stream parameters and encode params together, mirroring
/// `flake_validate_params`. Returns whether the result is Subset-legal.
pub fn validate(
    channels: u32,
    sample_rate: u32,
    bits_per_sample: u32,
    p: &EncodeParams,
) -> Result<ValidationOutcome> {
    if channels < 1 || channels > FLAC_MAX_CH {
        return Err(EncodeError::InvalidChannels(channels));
    }
    if sample_rate < 1 || sample_rate > 655_350 {
        return Err(EncodeError::InvalidSampleRate(sample_rate));
    }
    if bits_per_sample < 4 || bits_per_sample > 32 {
        return Err(EncodeError::InvalidBitsPerSample(bits_per_sample));
    }
    let mut subset = !(8..=24).contains(&bits_per_sample) || bits_per_sample % 4 != 0;

    if p.block_size < FLAC_MIN_BLOCKSIZE || p.block_size > FLAC_MAX_BLOCKSIZE {
        return Err(EncodeError::InvalidBlockSize(p.block_size));
    }
    if sample_rate <= 48_000 && p.block_size > 4608 {
        subset = true;
    }

    if p.min_prediction_order > p.max_prediction_order {
        return Err(EncodeError::InvalidParams(
            "min_prediction_order must be <= max_prediction_order",
        ));
    }
    match p.prediction_type {
        PredictionType::Fixed => {
            if p.max_prediction_order > 4 {
                return Err(EncodeError::InvalidParams(
                    "fixed prediction order must be 0..=4",
                ));
            }
        }
        PredictionType::Lpc => {
            if p.min_prediction_order < 1 || p.max_prediction_order > 32 {
                return Err(EncodeError::InvalidParams(
                    "LPC prediction order must be 1..=32",
                ));
            }
            if sample_rate <= 48_000 && p.max_prediction_order > 12 {
                subset = true;
            }
        }
        PredictionType::None => {}
    }

    if p.min_partition_order > p.max_partition_order {
        return Err(EncodeError::InvalidParams(
            "min_partition_order must be <= max_partition_order",
        ));
    }
    if p.max_partition_order > 8 {
        return Err(EncodeError::InvalidParams("partition order must be 0..=8"));
    }

    if p.block_size == 16 && (p.variable_block_size || p.allow_vbs) {
        return Err(EncodeError::InvalidParams(
            "block size of 16 is disallowed in variable block size mode",
        ));
    }

    Ok(if subset {
        ValidationOutcome::NonSubset
    } else {
        ValidationOutcome::Subset
    })
}

fn pick_sample_rate_code(sample_rate: u32) -> (u32, u32) {
    for (i, &sr) in SAMPLE_RATES.iter().enumerate().take(12).skip(4) {
        if sr == sample_rate {
            return (i as u32, 0);
        }
    }
    if sample_rate % 1000 == 0 && sample_rate <= 255_000 {
        (12, sample_rate / 1000)
    } else if sample_rate % 10 == 0 && sample_rate <= 655_350 {
        (14, sample_rate / 10)
    } else {
        (13, sample_rate)
    }
}

fn pick_bps_code(bits_per_sample: u32) -> u32 {
    for (i, &bd) in BIT_DEPTHS.iter().enumerate().take(8).skip(1) {
        if bd == bits_per_sample {
            return i as u32;
        }
    }
    0
}

/// A streaming FLAC encoder bound to an output sink.
pub struct FlacEncoder<W: Write> {
    writer: W,
    channels: u32,
    sample_rate: u32,
    bps: u32,
    params: EncodeParams,
    ch_code: u32,
    sr_code: (u32, u32),
    bps_code: u32,
    frame_count: u32,
    max_frame_size: u32,
    sample_count: u64,
    last_frame: bool,
    md5: Md5Accumulator,
    streaminfo_offset: u64,
}

impl<W: Write> FlacEncoder<W> {
    /// Validate parameters, write the `fLaC` marker plus a placeholder
    /// STREAMINFO, VORBIS_COMMENT, and PADDING, and return a driver
    /// ready for [`FlacEncoder::encode_frame`]. Mirrors
    /// `flake_encode_init` + `write_headers`.
    pub fn init(
        mut writer: W,
        channels: u32,
        sample_rate: u32,
        bits_per_sample: u32,
        total_samples_hint: u64,
        params: EncodeParams,
        vorbis_comment: &VorbisComment,
    ) -> Result<Self> {
        validate(channels, sample_rate, bits_per_sample, &params)?;

        writer.write_all(&metadata::STREAM_MARKER)?;
        let streaminfo_offset = metadata::STREAM_MARKER.len() as u64;

        let placeholder = StreamInfo {
            min_block_size: if params.variable_block_size || params.allow_vbs {
                FLAC_MIN_BLOCKSIZE
            } else {
                params.block_size
            },
            max_block_size: params.block_size,
            min_frame_size: 0,
            max_frame_size: 0,
            sample_rate,
            channels,
            bits_per_sample,
            total_samples: total_samples_hint,
            md5_signature: [0u8; 16],
        };
        let mut header = [0u8; 4];
        metadata::write_block_header(&mut header, false, MetadataBlockType::StreamInfo, 34);
        writer.write_all(&header)?;
        let mut si_bytes = [0u8; 34];
        placeholder.write_to(&mut si_bytes);
        writer.write_all(&si_bytes)?;

        let vc_size = vorbis_comment.encoded_size();
        let last_vc = params.padding_size == 0;
        metadata::write_block_header(&mut header, last_vc, MetadataBlockType::VorbisComment, vc_size);
        writer.write_all(&header)?;
        vorbis_comment.write_to(&mut writer)?;

        if params.padding_size > 0 {
            metadata::write_block_header(
                &mut header,
                true,
                MetadataBlockType::Padding,
                params.padding_size,
            );
            writer.write_all(&header)?;
            writer.write_all(&vec![0u8; params.padding_size as usize])?;
        }

        let ch_code = channels - 1;
        let sr_code = pick_sample_rate_code(sample_rate);
        let bps_code = pick_bps_code(bits_per_sample);

        debug!(
            "flac encoder initialized: {channels}ch {sample_rate}Hz {bits_per_sample}bit, block_size={}",
            params.block_size
        );

        Ok(FlacEncoder {
            writer,
            channels,
            sample_rate,
            bps: bits_per_sample,
            params,
            ch_code,
            sr_code,
            bps_code,
            frame_count: 0,
            max_frame_size: 0,
            sample_count: 0,
            last_frame: false,
            md5: Md5Accumulator::new(bits_per_sample),
            streaminfo_offset,
        })
    }

    fn residual_params(&self) -> ResidualParams {
        ResidualParams {
            prediction_type: self.params.prediction_type,
            order_method: self.params.order_method,
            min_prediction_order: self.params.min_prediction_order,
            max_prediction_order: self.params.max_prediction_order,
            min_partition_order: self.params.min_partition_order,
            max_partition_order: self.params.max_partition_order,
            lpc_precision: 15,
        }
    }

    /// Encode one block of `channels`-interleaved samples. Mirrors
    /// `encode_frame`: build subframes, decorrelate, search predictors,
    /// serialize, and retry in all-verbatim mode if the first attempt
    /// overflowed the frame's size cutoff.
    fn encode_frame_inner(&mut self, interleaved: &[i32], block_size: u32) -> Result<usize> {
        let mut frame = frame::init_frame(self.channels, self.bps, interleaved, block_size);
        frame::channel_decorrelation(
            &mut frame,
            self.channels,
            self.params.stereo_method == StereoMethod::Independent,
        );
        frame::remove_wasted_bits(&mut frame, self.bps);

        let residual_params = self.residual_params();
        for sub in frame.subframes.iter_mut() {
            crate::residual::encode_residual(sub, &residual_params);
        }

        let ctx = FrameContext {
            channels: self.channels,
            ch_code: self.ch_code,
            bps_code: self.bps_code,
            sr_code: self.sr_code,
            variable_block_size: self.params.variable_block_size,
        };

        let mut buf = vec![0u8; frame.verbatim_size as usize * 2 + 64];
        let mut len = frame::write_frame(&mut buf, &frame, &ctx, self.frame_count, 15);
        if len.is_none() || len.unwrap() as u32 > frame.verbatim_size {
            trace!("frame overflowed estimate, reencoding verbatim");
            frame::reencode_verbatim(&mut frame, self.bps);
            len = frame::write_frame(&mut buf, &frame, &ctx, self.frame_count, 15);
        }
        let len = len.ok_or(EncodeError::BitstreamOverflow)?;

        self.writer.write_all(&buf[..len])?;
        self.max_frame_size = self.max_frame_size.max(len as u32);
        if self.params.variable_block_size || self.params.allow_vbs {
            self.frame_count += block_size;
        } else {
            self.frame_count += 1;
        }
        Ok(len)
    }

    fn encode_frame_vbs(&mut self, interleaved: &[i32], block_size: u32) -> Option<Result<usize>> {
        if block_size < vbs::VBS_MIN_BLOCK_SIZE || block_size % vbs::VBS_MAX_FRAMES != 0 {
            return None;
        }
        let sizes = vbs::split_frame_v1(interleaved, self.channels, block_size);
        if sizes.len() <= 1 {
            return None;
        }
        let saved_frame_count = self.frame_count;
        let mut total = 0usize;
        let mut offset = 0usize;
        for size in sizes {
            let slice = &interleaved[offset * self.channels as usize..];
            match self.encode_frame_inner(slice, size) {
                Ok(n) => total += n,
                Err(e) => {
                    self.frame_count = saved_frame_count;
                    return Some(Err(e));
                }
            }
            offset += size as usize;
        }
        Some(Ok(total))
    }

    /// Encode one block of samples, mirroring `flake_encode_frame`.
    /// `block_size` must not exceed the configured block size; a short
    /// final block closes the stream to further `encode_frame` calls
    /// unless `allow_vbs` is set.
    pub fn encode_frame(&mut self, interleaved: &[i32], block_size: u32) -> Result<usize> {
        if block_size < 1 || block_size > self.params.block_size {
            return Err(EncodeError::BlockTooLarge(block_size, self.params.block_size));
        }
        if self.last_frame {
            return Err(EncodeError::StreamEnded);
        }
        if !self.params.allow_vbs && block_size != self.params.block_size {
            self.last_frame = true;
        }

        let written = if self.params.variable_block_size {
            match self.encode_frame_vbs(interleaved, block_size) {
                Some(result) => result?,
                None => self.encode_frame_inner(interleaved, block_size)?,
            }
        } else {
            self.encode_frame_inner(interleaved, block_size)?
        };

        self.md5.update(interleaved);
        self.sample_count += block_size as u64;
        Ok(written)
    }

    /// Snapshot the STREAMINFO as it stands right now, without
    /// finalizing the encoder. Mirrors `flake_metadata_get_streaminfo`.
    pub fn get_streaminfo(&self) -> StreamInfo {
        StreamInfo {
            min_block_size: if self.params.variable_block_size || self.params.allow_vbs {
                FLAC_MIN_BLOCKSIZE
            } else {
                self.params.block_size
            },
            max_block_size: self.params.block_size,
            min_frame_size: 0,
            max_frame_size: self.max_frame_size,
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bps,
            total_samples: self.sample_count,
            md5_signature: self.md5.finalize_clone(),
        }
    }

    /// Flush the underlying writer and return the final STREAMINFO.
    /// Callers without seek access to their sink (e.g. a pipe) must
    /// have written the STREAMINFO block themselves out-of-band if
    /// they need it finalized; see
    /// [`FlacEncoder::finish_and_patch_streaminfo`] for the common case
    /// of a seekable file.
    pub fn close(mut self) -> Result<StreamInfo> {
        self.writer.flush()?;
        Ok(self.get_streaminfo())
    }
}

impl<W: Write + Seek> FlacEncoder<W> {
    /// Finalize the stream and seek back to rewrite the STREAMINFO block
    /// with the true final sample count, max frame size, and MD5.
    pub fn finish_and_patch_streaminfo(mut self) -> Result<StreamInfo> {
        let streaminfo = self.get_streaminfo();
        self.writer.flush()?;

        let mut si_bytes = [0u8; 34];
        streaminfo.write_to(&mut si_bytes);
        self.writer.seek(SeekFrom::Start(self.streaminfo_offset + 4))?;
        self.writer.write_all(&si_bytes)?;
        self.writer.flush()?;
        Ok(streaminfo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_compression_level_validates() {
        for level in 0..=12 {
            let params = EncodeParams::from_compression_level(level).unwrap();
            let outcome = validate(2, 44100, 16, &params);
            assert!(outcome.is_ok(), "level {level} should validate: {outcome:?}");
        }
    }

    #[test]
    fn level_13_is_rejected() {
        assert!(EncodeParams::from_compression_level(13).is_err());
    }

    #[test]
    fn invalid_channel_count_is_rejected() {
        let params = EncodeParams::from_compression_level(5).unwrap();
        assert!(validate(0, 44100, 16, &params).is_err());
        assert!(validate(9, 44100, 16, &params).is_err());
    }

    #[test]
    fn twenty_bit_depth_stays_within_subset() {
        // 20 is one of the Subset's allowed bit depths (8/12/16/20/24).
        let params = EncodeParams::from_compression_level(5).unwrap();
        let outcome = validate(2, 44100, 20, &params).unwrap();
        assert_eq!(outcome, ValidationOutcome::Subset);
    }

    #[test]
    fn eighteen_bit_depth_forces_non_subset() {
        // 18 isn't a multiple of 4, so it falls outside the Subset's
        // allowed bit depths even though it's within [8,24].
        let params = EncodeParams::from_compression_level(5).unwrap();
        let outcome = validate(2, 44100, 18, &params).unwrap();
        assert_eq!(outcome, ValidationOutcome::NonSubset);
    }

    #[test]
    fn block_size_above_subset_cap_is_non_subset_at_common_rates() {
        let mut params = EncodeParams::from_compression_level(11).unwrap();
        params.variable_block_size = false;
        params.allow_vbs = true;
        let outcome = validate(2, 44100, 16, &params).unwrap();
        assert_eq!(outcome, ValidationOutcome::NonSubset);
    }

    #[test]
    fn standard_sample_rates_use_the_table_code() {
        assert_eq!(pick_sample_rate_code(44100), (9, 0));
        assert_eq!(pick_sample_rate_code(48000), (10, 0));
    }

    #[test]
    fn nonstandard_khz_aligned_rate_uses_code_12() {
        let (code, extra) = pick_sample_rate_code(88000);
        assert_eq!(code, 12);
        assert_eq!(extra, 88);
    }

    #[test]
    fn encode_constant_mono_stream_end_to_end() {
        let params = EncodeParams::from_compression_level(5).unwrap();
        let mut out = Vec::new();
        let vc = VorbisComment::new();
        let mut enc =
            FlacEncoder::init(&mut out, 1, 44100, 16, 0, params, &vc).expect("init");
        let samples = vec![0i32; 4096];
        enc.encode_frame(&samples, 4096).expect("encode_frame");
        let info = enc.close().expect("close");
        assert_eq!(info.channels, 1);
        assert!(out.starts_with(b"fLaC"));
    }
}
