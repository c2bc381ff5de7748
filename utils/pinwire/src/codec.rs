//! Single-byte frames carrying a 2-bit channel tag and a 6-bit magnitude.
//!
//! ```text
//!  7   6   5   4   3   2   1   0
//! +-------+-----------------------+
//! |  tag  |       magnitude       |
//! +-------+-----------------------+
//! ```
//!
//! The magnitude is a linear, clamped mapping of a real value onto 0..=63.
//! Scaling truncates toward zero, so a round trip loses up to one
//! quantisation step of `(max - min) / 63`.

pub const TAG_SHIFT: u32 = 6;
pub const TAG_MASK: u8 = 0b11;
pub const PAYLOAD_MASK: u8 = 0x3F;

const FULL_SCALE: f64 = PAYLOAD_MASK as f64;

/// Decoded view of an encoded byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    pub raw: u8,
}

impl Frame {
    /// Magnitude as an integer percentage of full scale.
    pub fn percent(&self) -> u8 {
        (f64::from(self.raw) / FULL_SCALE * 100.0).round() as u8
    }

    /// Magnitude mapped back onto `[min, max]`.
    pub fn value(&self, max: f64, min: f64) -> f64 {
        dequantize(self.raw, max, min)
    }
}

/// Pack `value` into a tagged frame.
///
/// Only the low two bits of `tag` are used. Returns 0 when any argument is not
/// finite or when `max == min`.
pub fn encode(value: f64, tag: u8, max: f64, min: f64) -> u8 {
    if !value.is_finite() || !max.is_finite() || !min.is_finite() || max == min {
        return 0;
    }

    // max before min: an inverted range pins everything to `min`
    let clamped = value.min(max).max(min);
    let scaled = (clamped - min) / (max - min) * FULL_SCALE;
    let magnitude = (scaled.trunc() as i64 & i64::from(PAYLOAD_MASK)) as u8;

    magnitude | ((tag & TAG_MASK) << TAG_SHIFT)
}

/// Split a frame into its tag and raw magnitude. No scaling is applied.
pub fn decode(frame: u8) -> Frame {
    Frame {
        tag: (frame >> TAG_SHIFT) & TAG_MASK,
        raw: frame & PAYLOAD_MASK,
    }
}

/// Map a raw 6-bit magnitude back onto `[min, max]`.
pub fn dequantize(raw: u8, max: f64, min: f64) -> f64 {
    min + f64::from(raw & PAYLOAD_MASK) / FULL_SCALE * (max - min)
}
