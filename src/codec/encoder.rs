//! PCM16 → base64 chunk encoder
//!
//! Used from the capture callback, so it keeps its scratch buffers between
//! calls to avoid reallocating on every block.

use base64::Engine;
use bytes::{BufMut, BytesMut};

use crate::audio::buffer::EncodedChunk;
use crate::codec::sample::{normalize_into, PcmSample};
use crate::codec::PCM_ENGINE;

/// Append samples as little-endian PCM16 bytes
pub fn put_pcm16_le(buf: &mut impl BufMut, samples: &[i16]) {
    for &s in samples {
        buf.put_i16_le(s);
    }
}

/// Chunk encoder with reusable buffers
pub struct ChunkEncoder {
    /// Normalized samples of the current block
    pcm: Vec<i16>,
    /// Little-endian byte view of `pcm`
    raw: BytesMut,
}

impl ChunkEncoder {
    /// Pre-size the scratch buffers for blocks of `samples` samples
    pub fn with_capacity(samples: usize) -> Self {
        Self {
            pcm: Vec::with_capacity(samples),
            raw: BytesMut::with_capacity(samples * 2),
        }
    }

    /// Normalize a device block of any sample format and encode it
    pub fn encode<T: PcmSample>(&mut self, input: &[T]) -> EncodedChunk {
        let mut pcm = std::mem::take(&mut self.pcm);
        normalize_into(input, &mut pcm);
        let chunk = self.encode_pcm(&pcm);
        self.pcm = pcm;
        chunk
    }

    /// Encode `samples` zero samples
    pub fn encode_silence(&mut self, samples: usize) -> EncodedChunk {
        let mut pcm = std::mem::take(&mut self.pcm);
        pcm.clear();
        pcm.resize(samples, 0);
        let chunk = self.encode_pcm(&pcm);
        self.pcm = pcm;
        chunk
    }

    /// Encode samples that are already PCM16
    pub fn encode_pcm(&mut self, samples: &[i16]) -> EncodedChunk {
        self.raw.clear();
        self.raw.reserve(samples.len() * 2);
        put_pcm16_le(&mut self.raw, samples);

        EncodedChunk {
            data: PCM_ENGINE.encode(&self.raw[..]),
            samples: samples.len(),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_little_endian() {
        let mut bytes = BytesMut::new();
        put_pcm16_le(&mut bytes, &[1, -2, 0x1234]);
        assert_eq!(&bytes[..], &[0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
    }

    #[test]
    fn test_encode_known_vector() {
        let mut encoder = ChunkEncoder::with_capacity(2);
        // 0x0001, 0x0002 -> bytes 01 00 02 00 -> "AQACAA=="
        let chunk = encoder.encode_pcm(&[1, 2]);
        assert_eq!(chunk.data, "AQACAA==");
        assert_eq!(chunk.samples, 2);
    }

    #[test]
    fn test_encode_float_block() {
        let mut encoder = ChunkEncoder::with_capacity(2);
        let chunk = encoder.encode(&[1.0f32, -1.0]);
        let raw = PCM_ENGINE.decode(&chunk.data).unwrap();
        assert_eq!(raw, vec![0xFF, 0x7F, 0x01, 0x80]);
    }

    #[test]
    fn test_silence_block() {
        let mut encoder = ChunkEncoder::with_capacity(1024);
        let chunk = encoder.encode_silence(1024);
        assert_eq!(chunk.samples, 1024);
        let raw = PCM_ENGINE.decode(&chunk.data).unwrap();
        assert_eq!(raw.len(), 2048);
        assert!(raw.iter().all(|&b| b == 0));
    }
}
