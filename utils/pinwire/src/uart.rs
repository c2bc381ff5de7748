//! UART over plain digital pins.
//!
//! Protocol: 1 start bit (0), 8 data bits (LSB first), 1 stop bit (1)
//! Idle state: line is high (1)
//!
//! Transmission turns a payload into a [`BitSequence`] for the pattern
//! generator. Reception takes one oversampled capture and votes every group of
//! `samples_per_bit` samples down to a single bit; there is no edge tracking or
//! clock recovery, the capture trigger is expected to line the first start bit
//! up with the start of the buffer.
use std::borrow::Cow;

use tracing::debug;

/// Bits in one UART word, framing included.
pub const WORD_BITS: usize = 10;

/// Physical-layer bit stream, one entry per bit period.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitSequence(Vec<bool>);

impl BitSequence {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.0.iter().copied()
    }

    pub fn into_inner(self) -> Vec<bool> {
        self.0
    }
}

impl From<Vec<bool>> for BitSequence {
    fn from(bits: Vec<bool>) -> Self {
        Self(bits)
    }
}

impl std::fmt::Display for BitSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Something that can be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<'a> {
    Bytes(Cow<'a, [u8]>),
    Byte(u8),
    /// Each character is sent as one byte: the low 8 bits of its code point.
    Text(Cow<'a, str>),
}

impl Payload<'_> {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Bytes(bytes) => bytes.to_vec(),
            Payload::Byte(byte) => vec![*byte],
            Payload::Text(text) => text.chars().map(|c| u32::from(c) as u8).collect(),
        }
    }
}

impl<'a> From<&'a [u8]> for Payload<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Payload::Bytes(Cow::Borrowed(bytes))
    }
}

impl From<Vec<u8>> for Payload<'static> {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(Cow::Owned(bytes))
    }
}

impl From<u8> for Payload<'static> {
    fn from(byte: u8) -> Self {
        Payload::Byte(byte)
    }
}

impl<'a> From<&'a str> for Payload<'a> {
    fn from(text: &'a str) -> Self {
        Payload::Text(Cow::Borrowed(text))
    }
}

impl From<String> for Payload<'static> {
    fn from(text: String) -> Self {
        Payload::Text(Cow::Owned(text))
    }
}

/// Frame every byte of `payload` as `[0, b0, b1, .. b7, 1]` and concatenate.
///
/// The result always holds exactly `10 * bytes` bits.
pub fn encode_frames<'a>(payload: impl Into<Payload<'a>>) -> BitSequence {
    let bytes = payload.into().to_bytes();
    let mut bits = Vec::with_capacity(bytes.len() * WORD_BITS);
    for byte in bytes {
        bits.push(false);
        bits.extend((0..8).map(|i| byte & (1 << i) != 0));
        bits.push(true);
    }
    BitSequence(bits)
}

/// One received 10-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartWord {
    pub start: bool,
    pub data: u8,
    pub stop: bool,
}

impl UartWord {
    /// Build a word from exactly [`WORD_BITS`] resolved bits.
    pub fn from_bits(bits: &[bool]) -> Option<Self> {
        if bits.len() != WORD_BITS {
            return None;
        }
        Some(Self {
            start: bits[0],
            data: decode_bits(&bits[1..9]),
            stop: bits[9],
        })
    }

    pub fn is_valid(&self) -> bool {
        !self.start && self.stop
    }
}

fn decode_bits(bits: &[bool]) -> u8 {
    let mut byte = 0u8;
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            byte |= 1 << i;
        }
    }
    byte
}

/// Fixed-ratio oversampling UART receiver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformDecoder {
    samples_per_bit: f64,
    threshold: f64,
}

impl WaveformDecoder {
    /// `samples_per_bit` is the capture rate divided by the baud rate;
    /// `threshold` is the fraction of a bit period that has to read high for
    /// the bit to resolve to 1.
    pub fn new(samples_per_bit: f64, threshold: f64) -> Self {
        Self {
            samples_per_bit,
            threshold,
        }
    }

    pub fn samples_per_bit(&self) -> f64 {
        self.samples_per_bit
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Recover the data bytes contained in one capture.
    ///
    /// Words failing start/stop validation and a trailing partial word are
    /// dropped. A buffer without a positive finite peak, or a ratio below one
    /// sample per bit, decodes to nothing.
    pub fn decode(&self, samples: &[f64]) -> Vec<u8> {
        let bits = self.resolve_bits(samples);
        let mut data = Vec::with_capacity(bits.len() / WORD_BITS);
        let mut dropped = 0usize;
        for chunk in bits.chunks_exact(WORD_BITS) {
            match UartWord::from_bits(chunk) {
                Some(word) if word.is_valid() => data.push(word.data),
                _ => dropped += 1,
            }
        }
        if dropped > 0 || bits.len() % WORD_BITS != 0 {
            debug!(
                words = data.len(),
                dropped,
                trailing_bits = bits.len() % WORD_BITS,
                "discarded malformed UART words"
            );
        }
        data
    }

    /// Vote every bit period of `samples` down to one bit.
    pub fn resolve_bits(&self, samples: &[f64]) -> Vec<bool> {
        // below one sample per bit the group count is meaningless
        if samples.is_empty() || !self.samples_per_bit.is_finite() || self.samples_per_bit < 1.0 {
            return Vec::new();
        }

        let peak = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !peak.is_finite() || peak <= 0.0 {
            return Vec::new();
        }

        let groups = (samples.len() as f64 / self.samples_per_bit).round_ties_even() as usize;
        let window = self.samples_per_bit.round_ties_even() as usize;
        let cutoff = self.samples_per_bit * self.threshold;

        (0..groups)
            .map(|group| {
                let origin = group as f64 * self.samples_per_bit;
                let energy: f64 = (0..window)
                    .filter_map(|offset| {
                        let index = (origin + offset as f64).round_ties_even() as usize;
                        samples.get(index)
                    })
                    .map(|sample| sample / peak)
                    .sum();
                energy > cutoff
            })
            .collect()
    }
}
