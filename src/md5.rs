//! Streaming MD5 accumulator over the unencoded PCM (spec component C3).
//!
//! `libflake/md5.c` hand-rolls RSA's reference MD5 and only ever feeds it
//! 16-bit samples (`ch * nsamples * 2` bytes). This crate uses the
//! `md-5` (RustCrypto) crate for the transform itself — the idiomatic
//! Rust equivalent of vendoring md5.c — but generalizes the byte-packing
//! to any configured bit depth in `[4,32]`, since spec.md widens sample
//! depth support beyond flake's 16-bit-only assumption.

use md5::{Digest, Md5};

/// Accumulates the little-endian byte view of the original interleaved
/// PCM stream across every submitted block, even blocks whose encoded
/// frame was later dropped due to a second bitstream overflow — the
/// *source* audio is what's hashed, not the encoded bytes.
#[derive(Clone)]
pub struct Md5Accumulator {
    hasher: Md5,
    bytes_per_sample: usize,
}

impl Md5Accumulator {
    pub fn new(bits_per_sample: u32) -> Self {
        Md5Accumulator {
            hasher: Md5::new(),
            bytes_per_sample: ((bits_per_sample + 7) / 8) as usize,
        }
    }

    /// Feed one block of interleaved samples (channel-major order, i.e.
    /// `[s0c0, s0c1, .., s1c0, s1c1, ..]`).
    pub fn update(&mut self, interleaved: &[i32]) {
        let mut buf = [0u8; 4];
        for &sample in interleaved {
            let le = sample.to_le_bytes();
            buf[..4].copy_from_slice(&le);
            self.hasher.update(&buf[..self.bytes_per_sample]);
        }
    }

    /// Finalize a clone of the running state, leaving this accumulator
    /// free to keep accumulating. Used by the stream driver to emit a
    /// STREAMINFO MD5 without disturbing in-flight encoding.
    pub fn finalize_clone(&self) -> [u8; 16] {
        let digest = self.hasher.clone().finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest);
        out
    }

    /// Consume the accumulator and produce the final digest.
    pub fn finalize(self) -> [u8; 16] {
        let digest = self.hasher.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stream_matches_rfc_empty_digest() {
        let acc = Md5Accumulator::new(16);
        let digest = acc.finalize();
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(
            digest,
            [
                0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04, 0xe9, 0x80, 0x09, 0x98, 0xec,
                0xf8, 0x42, 0x7e
            ]
        );
    }

    #[test]
    fn sixteen_bit_packing_is_little_endian() {
        let mut acc = Md5Accumulator::new(16);
        acc.update(&[0x0102i32]);
        let mut direct = Md5::new();
        direct.update([0x02u8, 0x01u8]);
        let expected: [u8; 16] = direct.finalize().into();
        assert_eq!(acc.finalize(), expected);
    }

    #[test]
    fn eight_bit_packing_uses_one_byte_per_sample() {
        let mut acc = Md5Accumulator::new(8);
        acc.update(&[-1i32, 5i32]);
        let mut direct = Md5::new();
        direct.update([0xFFu8, 0x05u8]);
        let expected: [u8; 16] = direct.finalize().into();
        assert_eq!(acc.finalize(), expected);
    }

    #[test]
    fn finalize_clone_does_not_disturb_running_state() {
        let mut acc = Md5Accumulator::new(16);
        acc.update(&[1, 2, 3]);
        let mid = acc.finalize_clone();
        acc.update(&[4, 5, 6]);
        let end = acc.finalize();
        assert_ne!(mid, end);
    }
}
