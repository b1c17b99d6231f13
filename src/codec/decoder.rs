//! base64 → PCM16 chunk decoder

use base64::Engine;

use crate::audio::buffer::AudioChunk;
use crate::codec::PCM_ENGINE;
use crate::error::CodecError;

/// Interpret little-endian bytes as PCM16 samples
pub fn samples_from_le_bytes(raw: &[u8]) -> Result<Vec<i16>, CodecError> {
    if raw.len() % 2 != 0 {
        return Err(CodecError::OddByteLength(raw.len()));
    }
    Ok(raw
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Decode one base64 payload into an audio chunk.
///
/// ASCII whitespace anywhere in the text is ignored, so line-wrapped base64
/// decodes the same as the compact form.
pub fn decode_chunk(data: &str) -> Result<AudioChunk, CodecError> {
    let raw = if data.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        PCM_ENGINE.decode(compact)?
    } else {
        PCM_ENGINE.decode(data)?
    };
    Ok(AudioChunk::new(samples_from_le_bytes(&raw)?))
}
