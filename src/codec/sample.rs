//! Sample format normalization to PCM16

use crate::constants::PCM16_FULL_SCALE;

/// A device sample that can be normalized to signed 16-bit PCM
pub trait PcmSample: Copy {
    fn to_pcm16(self) -> i16;
}

impl PcmSample for i16 {
    #[inline]
    fn to_pcm16(self) -> i16 {
        self
    }
}

// Float: clip to [-1, 1], scale, truncate. -1.0 lands on -32767, not -32768.
impl PcmSample for f32 {
    #[inline]
    fn to_pcm16(self) -> i16 {
        (self.clamp(-1.0, 1.0) * PCM16_FULL_SCALE) as i16
    }
}

impl PcmSample for f64 {
    #[inline]
    fn to_pcm16(self) -> i16 {
        (self.clamp(-1.0, 1.0) * PCM16_FULL_SCALE as f64) as i16
    }
}

impl PcmSample for i8 {
    #[inline]
    fn to_pcm16(self) -> i16 {
        (self as i16) << 8
    }
}

impl PcmSample for i32 {
    #[inline]
    fn to_pcm16(self) -> i16 {
        (self >> 16) as i16
    }
}

impl PcmSample for i64 {
    #[inline]
    fn to_pcm16(self) -> i16 {
        (self >> 48) as i16
    }
}

impl PcmSample for u8 {
    #[inline]
    fn to_pcm16(self) -> i16 {
        ((self as i16) - 128) << 8
    }
}

impl PcmSample for u16 {
    #[inline]
    fn to_pcm16(self) -> i16 {
        (self ^ 0x8000) as i16
    }
}

impl PcmSample for u32 {
    #[inline]
    fn to_pcm16(self) -> i16 {
        ((self >> 16) as u16 ^ 0x8000) as i16
    }
}

impl PcmSample for u64 {
    #[inline]
    fn to_pcm16(self) -> i16 {
        ((self >> 48) as u16 ^ 0x8000) as i16
    }
}

/// Normalize a block into `out`, replacing its contents
pub fn normalize_into<T: PcmSample>(input: &[T], out: &mut Vec<i16>) {
    out.clear();
    out.extend(input.iter().map(|s| s.to_pcm16()));
}
