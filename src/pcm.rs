//! Raw PCM sample unpacking (spec component C11).
//!
//! `libpcm_io/pcm_io.c`'s `pcmfile_read_samples` switches on the file's
//! byte width (1/2/3/4 bytes per sample) to normalize raw input bytes
//! into the encoder's native sample representation, sign-extending
//! 24-bit values and byte-swapping as needed. This crate's encoder
//! always takes native `i32` samples, so this module is the same
//! normalization step, generalized to any bit depth in `[4,32]` per
//! [`crate::encoder`]'s wider bit-depth support, and restricted to
//! little-endian input (the only byte order any of this crate's
//! callers produce).
//!
//! 8-bit PCM is conventionally unsigned (0..=255, midpoint 128); every
//! other width is signed two's complement, matching the WAV convention
//! `libpcm_io/wav.c` reads against.

use crate::error::{EncodeError, Result};

/// Unpack `channels`-interleaved little-endian PCM samples at
/// `bits_per_sample` into interleaved `i32` samples, one element per
/// input sample.
///
/// `bits_per_sample` need not be a multiple of 8: non-byte-aligned
/// depths are read from their next-larger byte width and sign-extended
/// from the true bit width (e.g. a 20-bit stream is stored 3 bytes per
/// sample but sign-extends from bit 19, not bit 23).
pub fn unpack_interleaved(raw: &[u8], channels: u32, bits_per_sample: u32) -> Result<Vec<i32>> {
    if !(4..=32).contains(&bits_per_sample) {
        return Err(EncodeError::InvalidBitsPerSample(bits_per_sample));
    }
    let bytes_per_sample = ((bits_per_sample + 7) / 8) as usize;
    let frame_bytes = bytes_per_sample * channels as usize;
    if frame_bytes == 0 || raw.len() % frame_bytes != 0 {
        return Err(EncodeError::InvalidParams(
            "raw PCM buffer length is not a whole number of interleaved frames",
        ));
    }

    let n_samples = raw.len() / bytes_per_sample;
    let mut out = Vec::with_capacity(n_samples);
    let unused_bits = (bytes_per_sample * 8) as u32 - bits_per_sample;

    for chunk in raw.chunks_exact(bytes_per_sample) {
        let mut buf = [0u8; 4];
        buf[..bytes_per_sample].copy_from_slice(chunk);
        let v = i32::from_le_bytes(buf);

        let sample = if bytes_per_sample == 1 {
            // 8-bit PCM is unsigned; recenter around zero.
            (chunk[0] as i32) - 128
        } else {
            // sign-extend from the true bit width, which may sit below
            // the byte boundary (e.g. 20-bit samples in 3 bytes).
            (v << unused_bits) >> unused_bits
        };
        out.push(sample);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_bit_stereo_little_endian() {
        // L=1 R=-1, two frames
        let raw = [0x01, 0x00, 0xFF, 0xFF, 0x02, 0x00, 0xFE, 0xFF];
        let samples = unpack_interleaved(&raw, 2, 16).unwrap();
        assert_eq!(samples, vec![1, -1, 2, -2]);
    }

    #[test]
    fn eight_bit_mono_is_unsigned_recentered() {
        let raw = [0u8, 128, 255];
        let samples = unpack_interleaved(&raw, 1, 8).unwrap();
        assert_eq!(samples, vec![-128, 0, 127]);
    }

    #[test]
    fn twenty_bit_packed_in_three_bytes_sign_extends_from_bit_19() {
        // value = -1 at 20-bit width, stored little-endian in 3 bytes
        // with the top 4 bits of the top byte left as padding (0xF from
        // sign, but only the low 20 bits are meaningful).
        let raw = [0xFF, 0xFF, 0x0F];
        let samples = unpack_interleaved(&raw, 1, 20).unwrap();
        assert_eq!(samples, vec![-1]);
    }

    #[test]
    fn rejects_buffer_not_a_whole_number_of_frames() {
        let raw = [0u8, 1, 2];
        assert!(unpack_interleaved(&raw, 2, 16).is_err());
    }

    #[test]
    fn rejects_out_of_range_bit_depth() {
        let raw = [0u8; 4];
        assert!(unpack_interleaved(&raw, 1, 2).is_err());
        assert!(unpack_interleaved(&raw, 1, 40).is_err());
    }
}
