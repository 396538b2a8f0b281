//! Per-frame subframe layout, stereo decorrelation, and bitstream
//! serialization (spec component C7).
//!
//! Mirrors `libflake/encode.c`'s `FlacFrame`/`FlacSubframe` structs and
//! the `channel_decorrelation` / `remove_wasted_bits` / `output_*`
//! family of functions, minus the encoder-context plumbing that lives
//! in [`crate::encoder`].

use crate::bitio::BitWriter;
use crate::crc;
use crate::rice::{self, RiceParams};
use crate::FLAC_MAX_BLOCKSIZE;

const FLAC_BLOCKSIZES: [u32; 15] = [
    0, 192, 576, 1152, 2304, 4608, 0, 0, 256, 512, 1024, 2048, 4096, 8192, 16384,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    NotStereo,
    LeftRight,
    LeftSide,
    RightSide,
    MidSide,
}

impl ChannelMode {
    fn code(self, ch_code: u32) -> u32 {
        match self {
            ChannelMode::NotStereo => ch_code,
            ChannelMode::LeftRight => 1,
            ChannelMode::LeftSide => 8,
            ChannelMode::RightSide => 9,
            ChannelMode::MidSide => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubframeType {
    Constant,
    Verbatim,
    Fixed(u32),
    Lpc(u32),
}

impl SubframeType {
    fn type_code(self) -> u32 {
        match self {
            SubframeType::Constant => 0,
            SubframeType::Verbatim => 1,
            SubframeType::Fixed(order) => 8 + order,
            SubframeType::Lpc(order) => 32 + (order - 1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Subframe {
    pub kind: SubframeType,
    pub wasted_bits: u32,
    pub obits: u32,
    pub samples: Vec<i32>,
    pub residual: Vec<i32>,
    pub coefs: Vec<i32>,
    pub shift: i32,
    pub rc: RiceParams,
}

impl Subframe {
    fn new(samples: Vec<i32>, obits: u32) -> Self {
        Subframe {
            kind: SubframeType::Verbatim,
            wasted_bits: 0,
            obits,
            residual: samples.clone(),
            samples,
            coefs: Vec::new(),
            shift: 0,
            rc: RiceParams {
                porder: 0,
                params: vec![0],
            },
        }
    }
}

pub struct Frame {
    pub blocksize: u32,
    pub bs_code: (u32, Option<u32>),
    pub verbatim_size: u32,
    pub ch_mode: ChannelMode,
    pub subframes: Vec<Subframe>,
}

/// Split interleaved samples into one buffer per channel and choose the
/// frame's block-size coding, mirroring `init_frame` + `copy_samples`.
pub fn init_frame(channels: u32, bps: u32, interleaved: &[i32], block_size: u32) -> Frame {
    debug_assert!(block_size >= 1 && block_size <= FLAC_MAX_BLOCKSIZE);

    let mut bs_code = (7, Some(block_size - 1));
    for (i, &bs) in FLAC_BLOCKSIZES.iter().enumerate() {
        if bs == block_size {
            bs_code = (i as u32, None);
            break;
        }
    }
    if bs_code.0 == 7 && block_size <= 256 {
        bs_code = (6, Some(block_size - 1));
    }

    let verbatim_size = if channels == 2 {
        16 + ((block_size * (bps + bps + 1) + 7) >> 3)
    } else {
        16 + ((block_size * channels * bps + 7) >> 3)
    };

    let mut subframes = Vec::with_capacity(channels as usize);
    for ch in 0..channels {
        let mut samples = Vec::with_capacity(block_size as usize);
        for i in 0..block_size as usize {
            samples.push(interleaved[i * channels as usize + ch as usize]);
        }
        subframes.push(Subframe::new(samples, bps));
    }

    Frame {
        blocksize: block_size,
        bs_code,
        verbatim_size,
        ch_mode: ChannelMode::NotStereo,
        subframes,
    }
}

/// Estimate rice-coded bit cost of each of the four stereo decorrelation
/// candidates from 2nd-order fixed residual sums, and pick the winner.
fn calc_decorr_scores(left: &[i32], right: &[i32]) -> ChannelMode {
    let n = left.len();
    let mut sum = [0i64; 4];
    for i in 2..n {
        let lt = left[i] as i64 - 2 * left[i - 1] as i64 + left[i - 2] as i64;
        let rt = right[i] as i64 - 2 * right[i - 1] as i64 + right[i - 2] as i64;
        sum[2] += ((lt + rt) >> 1).abs();
        sum[3] += (lt - rt).abs();
        sum[0] += lt.abs();
        sum[1] += rt.abs();
    }
    let mut bits = [0u64; 4];
    for i in 0..4 {
        let s = (2 * sum[i]).max(0) as u64;
        let k = rice::find_optimal_rice_param(s, n as u64);
        bits[i] = rice_cost(s, n as u64, k);
    }
    let score = [
        bits[0] + bits[1],
        bits[0] + bits[3],
        bits[1] + bits[3],
        bits[2] + bits[3],
    ];
    let mut best = 0;
    for i in 1..4 {
        if score[i] < score[best] {
            best = i;
        }
    }
    match best {
        0 => ChannelMode::LeftRight,
        1 => ChannelMode::LeftSide,
        2 => ChannelMode::RightSide,
        _ => ChannelMode::MidSide,
    }
}

fn rice_cost(sum: u64, n: u64, k: u32) -> u64 {
    let bias = (sum as i64 - n as i64 / 2).max(0) as u64;
    n * (k as u64 + 1) + (bias >> k)
}

/// Decide and apply stereo decorrelation, mirroring `channel_decorrelation`.
/// Non-stereo frames and blocks of 32 samples or fewer are left independent.
pub fn channel_decorrelation(frame: &mut Frame, channels: u32, independent_only: bool) {
    if channels != 2 {
        frame.ch_mode = ChannelMode::NotStereo;
        return;
    }
    if frame.blocksize <= 32 || independent_only {
        frame.ch_mode = ChannelMode::LeftRight;
        return;
    }

    let mode = calc_decorr_scores(&frame.subframes[0].samples, &frame.subframes[1].samples);
    frame.ch_mode = mode;
    match mode {
        ChannelMode::LeftRight => {}
        ChannelMode::MidSide => {
            let n = frame.blocksize as usize;
            for i in 0..n {
                let l = frame.subframes[0].samples[i];
                let r = frame.subframes[1].samples[i];
                frame.subframes[0].samples[i] = (l + r) >> 1;
                frame.subframes[1].samples[i] = l - r;
            }
            frame.subframes[1].obits += 1;
        }
        ChannelMode::LeftSide => {
            let n = frame.blocksize as usize;
            for i in 0..n {
                frame.subframes[1].samples[i] =
                    frame.subframes[0].samples[i] - frame.subframes[1].samples[i];
            }
            frame.subframes[1].obits += 1;
        }
        ChannelMode::RightSide => {
            let n = frame.blocksize as usize;
            for i in 0..n {
                frame.subframes[0].samples[i] -= frame.subframes[1].samples[i];
            }
            frame.subframes[0].obits += 1;
        }
        ChannelMode::NotStereo => unreachable!(),
    }
}

/// Shift out common trailing zero bits per channel, mirroring
/// `remove_wasted_bits`.
pub fn remove_wasted_bits(frame: &mut Frame, bps: u32) {
    for sub in frame.subframes.iter_mut() {
        let mut wasted = bps.saturating_sub(1);
        'outer: for &s in &sub.samples {
            if s == 0 {
                continue;
            }
            let tz = s.trailing_zeros().min(wasted);
            if tz < wasted {
                wasted = tz;
            }
            if wasted == 0 {
                break 'outer;
            }
        }
        if wasted == bps.saturating_sub(1) {
            wasted = 0;
        } else if wasted > 0 {
            for s in sub.samples.iter_mut() {
                *s >>= wasted;
            }
            sub.obits -= wasted;
        }
        sub.wasted_bits = wasted;
    }
}

fn write_utf8(bw: &mut BitWriter, val: u32) {
    if val < 0x80 {
        bw.write_bits(8, val);
        return;
    }
    let bits = 32 - val.leading_zeros();
    let bytes = (bits + 3) / 5;
    let mut shift = (bytes - 1) * 6;
    bw.write_bits(8, (256 - (256 >> bytes)) | (val >> shift));
    while shift >= 6 {
        shift -= 6;
        bw.write_bits(8, 0x80 | ((val >> shift) & 0x3F));
    }
}

pub struct FrameContext {
    pub channels: u32,
    pub ch_code: u32,
    pub bps_code: u32,
    pub sr_code: (u32, u32),
    pub variable_block_size: bool,
}

fn output_frame_header(bw: &mut BitWriter, frame: &Frame, ctx: &FrameContext, frame_count: u32) {
    bw.write_bits(15, 0x7FFC);
    bw.write_bits(1, ctx.variable_block_size as u32);
    bw.write_bits(4, frame.bs_code.0);
    bw.write_bits(4, ctx.sr_code.0);
    bw.write_bits(4, frame.ch_mode.code(ctx.ch_code));
    bw.write_bits(3, ctx.bps_code);
    bw.write_bits(1, 0);
    write_utf8(bw, frame_count);

    if let Some(custom_bs) = frame.bs_code.1 {
        if custom_bs < 256 {
            bw.write_bits(8, custom_bs);
        } else {
            bw.write_bits(16, custom_bs);
        }
    }
    if ctx.sr_code.1 > 0 {
        if ctx.sr_code.1 < 256 {
            bw.write_bits(8, ctx.sr_code.1);
        } else {
            bw.write_bits(16, ctx.sr_code.1);
        }
    }

    bw.flush();
}

fn output_residual(bw: &mut BitWriter, sub: &Subframe, blocksize: u32, order: u32) {
    bw.write_bits(2, 0);
    let porder = sub.rc.porder;
    bw.write_bits(4, porder);
    let psize = blocksize >> porder;
    let mut res_cnt = psize - order;

    let mut j = order;
    for &k in &sub.rc.params {
        bw.write_bits(4, k);
        let mut i = 0;
        while i < res_cnt && j < blocksize {
            bw.write_rice_signed(k, sub.residual[j as usize]);
            i += 1;
            j += 1;
        }
        res_cnt = psize;
    }
}

fn output_subframe(bw: &mut BitWriter, sub: &Subframe, blocksize: u32, precision: u32) {
    bw.write_bits(1, 0);
    bw.write_bits(6, sub.kind.type_code());
    if sub.wasted_bits > 0 {
        bw.write_bits(1, 1);
        bw.write_bits(sub.wasted_bits - 1, 0);
        bw.write_bits(1, 1);
    } else {
        bw.write_bits(1, 0);
    }

    match sub.kind {
        SubframeType::Constant => {
            bw.write_bits_signed(sub.obits, sub.residual[0]);
        }
        SubframeType::Verbatim => {
            for &s in &sub.residual {
                bw.write_bits_signed(sub.obits, s);
            }
        }
        SubframeType::Fixed(order) => {
            for &s in &sub.residual[..order as usize] {
                bw.write_bits_signed(sub.obits, s);
            }
            output_residual(bw, sub, blocksize, order);
        }
        SubframeType::Lpc(order) => {
            for &s in &sub.residual[..order as usize] {
                bw.write_bits_signed(sub.obits, s);
            }
            bw.write_bits(4, precision - 1);
            bw.write_bits_signed(5, sub.shift);
            for &c in &sub.coefs {
                bw.write_bits_signed(precision, c);
            }
            output_residual(bw, sub, blocksize, order);
        }
    }
}

/// Serialize one fully analyzed frame (header, subframes, CRC-16 footer)
/// into `buf`. Returns `None` if the frame overflowed `buf` (caller
/// should fall back to verbatim subframes and retry).
pub fn write_frame(
    buf: &mut [u8],
    frame: &Frame,
    ctx: &FrameContext,
    frame_count: u32,
    lpc_precision: u32,
) -> Option<usize> {
    let mut bw = BitWriter::new(buf);
    output_frame_header(&mut bw, frame, ctx, frame_count);
    if bw.is_eof() {
        return None;
    }
    let header_end = bw.byte_count();
    let crc = crc::crc8(&buf[..header_end]);
    bw.write_bits(8, crc as u32);

    for sub in &frame.subframes {
        output_subframe(&mut bw, sub, frame.blocksize, lpc_precision);
        if bw.is_eof() {
            return None;
        }
    }
    bw.flush();
    if bw.is_eof() {
        return None;
    }
    let body_end = bw.byte_count();
    let crc = crc::crc16(&buf[..body_end]);
    bw.write_bits(16, crc as u32);
    bw.flush();
    if bw.is_eof() {
        return None;
    }
    Some(bw.byte_count())
}

/// Convert every subframe to verbatim, discarding any predictor search
/// results. Used when the first encode attempt overflows its buffer.
pub fn reencode_verbatim(frame: &mut Frame, bps: u32) {
    for sub in frame.subframes.iter_mut() {
        sub.kind = SubframeType::Verbatim;
        sub.residual = sub.samples.clone();
        sub.obits = bps;
        sub.wasted_bits = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_block_has_no_stereo_decorrelation() {
        let mut frame = init_frame(1, 16, &[1, 2, 3, 4], 4);
        channel_decorrelation(&mut frame, 1, false);
        assert_eq!(frame.ch_mode, ChannelMode::NotStereo);
    }

    #[test]
    fn identical_channels_pick_a_side_mode_with_zero_side_channel() {
        let interleaved: Vec<i32> = (0..128).flat_map(|i| [i, i]).collect();
        let mut frame = init_frame(2, 16, &interleaved, 64);
        channel_decorrelation(&mut frame, 2, false);
        assert_ne!(frame.ch_mode, ChannelMode::LeftRight);
        match frame.ch_mode {
            ChannelMode::MidSide | ChannelMode::LeftSide => {
                assert!(frame.subframes[1].samples.iter().all(|&s| s == 0));
            }
            ChannelMode::RightSide => {
                assert!(frame.subframes[0].samples.iter().all(|&s| s == 0));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn small_blocks_stay_independent_even_with_estimate_method() {
        let interleaved: Vec<i32> = (0..16).flat_map(|i| [i, i]).collect();
        let mut frame = init_frame(2, 16, &interleaved, 8);
        channel_decorrelation(&mut frame, 2, false);
        assert_eq!(frame.ch_mode, ChannelMode::LeftRight);
    }

    #[test]
    fn wasted_bits_extracted_from_all_even_samples() {
        let samples = vec![4i32, 8, -12, 0, 20];
        let mut frame = init_frame(1, 16, &samples, 5);
        remove_wasted_bits(&mut frame, 16);
        assert_eq!(frame.subframes[0].wasted_bits, 2);
        assert_eq!(frame.subframes[0].obits, 14);
        assert_eq!(frame.subframes[0].samples, vec![1, 2, -3, 0, 5]);
    }

    #[test]
    fn all_zero_block_reports_zero_wasted_bits() {
        let samples = vec![0i32; 8];
        let mut frame = init_frame(1, 16, &samples, 8);
        remove_wasted_bits(&mut frame, 16);
        assert_eq!(frame.subframes[0].wasted_bits, 0);
    }

    #[test]
    fn constant_frame_round_trips_through_write_frame() {
        let samples = vec![7i32; 32];
        let mut frame = init_frame(1, 16, &samples, 32);
        remove_wasted_bits(&mut frame, 16);
        frame.subframes[0].kind = SubframeType::Constant;
        frame.subframes[0].residual = vec![7];
        let ctx = FrameContext {
            channels: 1,
            ch_code: 0,
            bps_code: 4,
            sr_code: (9, 0),
            variable_block_size: false,
        };
        let mut buf = vec![0u8; 256];
        let len = write_frame(&mut buf, &frame, &ctx, 0, 15).expect("fits");
        assert!(len > 0);
        assert_eq!(buf[0], 0xFF);
    }
}
