//! Bit-banged SPI receive on static I/O pins.
//!
//! Every bit period drives two clock edges by hand and samples the data pin on
//! one of them. Timing is best effort: the remainder of each period is slept
//! away and an overrun simply shortens the next sleep to zero.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::instrument::{Instrument, Pin};
use crate::{Error, Result};

/// Clock mode. Modes 0 and 1 idle low and sample on the first edge; modes 2
/// and 3 idle high and sample on the second edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SpiMode {
    #[default]
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

impl SpiMode {
    pub fn idle_clock_high(self) -> bool {
        matches!(self, SpiMode::Mode2 | SpiMode::Mode3)
    }

    pub fn samples_on_first_edge(self) -> bool {
        matches!(self, SpiMode::Mode0 | SpiMode::Mode1)
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = Error;

    fn try_from(mode: u8) -> Result<Self> {
        match mode {
            0 => Ok(SpiMode::Mode0),
            1 => Ok(SpiMode::Mode1),
            2 => Ok(SpiMode::Mode2),
            3 => Ok(SpiMode::Mode3),
            other => Err(Error::InvalidConfig(format!(
                "SPI mode must be 0-3, got {other}"
            ))),
        }
    }
}

impl From<SpiMode> for u8 {
    fn from(mode: SpiMode) -> u8 {
        mode as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiPins {
    pub cs: Pin,
    pub sdo: Pin,
    pub sck: Pin,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpiConfig {
    pub frequency_hz: f64,
    pub mode: SpiMode,
    pub bit_order: BitOrder,
    pub byte_count: usize,
}

impl SpiConfig {
    pub fn bit_period(&self) -> Duration {
        if self.frequency_hz.is_finite() && self.frequency_hz > 0.0 {
            Duration::from_secs_f64(1.0 / self.frequency_hz)
        } else {
            Duration::ZERO
        }
    }
}

/// Read-only software SPI master.
#[derive(Debug, Clone)]
pub struct SoftSpiReader {
    pins: SpiPins,
    config: SpiConfig,
}

impl SoftSpiReader {
    pub fn new(pins: SpiPins, config: SpiConfig) -> Self {
        Self { pins, config }
    }

    pub fn pins(&self) -> SpiPins {
        self.pins
    }

    pub fn config(&self) -> &SpiConfig {
        &self.config
    }

    /// Clock in `byte_count` bytes with chip-select held low.
    ///
    /// Pins are expected to be configured already (see
    /// [`crate::als::AmbientLightSensor::open`]). Chip-select is released
    /// even when the transfer fails; the transfer error takes precedence.
    pub fn read_bytes<I: Instrument>(&self, instrument: &mut I) -> Result<Vec<u8>> {
        let cs = self.pins.cs;
        let bit_count = 8 * self.config.byte_count;

        instrument.set_digital_output(cs, false)?;
        let clocked = self.clock_bits(instrument, bit_count);
        let released = instrument.set_digital_output(cs, true);
        let (bits, overruns) = clocked?;
        released?;

        if overruns > 0 {
            trace!(overruns, bits = bit_count, "SPI bit periods overran");
        }

        Ok(pack_bits(&bits, self.config.bit_order))
    }

    /// Run `bit_count` clock periods, returning the sampled bits and the
    /// number of periods that overran.
    fn clock_bits<I: Instrument>(
        &self,
        instrument: &mut I,
        bit_count: usize,
    ) -> Result<(Vec<bool>, usize)> {
        let SpiPins { sdo, sck, .. } = self.pins;
        let mode = self.config.mode;
        let period = self.config.bit_period();
        let idle = mode.idle_clock_high();

        let mut bits = Vec::with_capacity(bit_count);
        let mut overruns = 0usize;

        for _ in 0..bit_count {
            let period_start = Instant::now();

            instrument.set_digital_output(sck, !idle)?;
            if mode.samples_on_first_edge() {
                bits.push(instrument.read_digital_input(sdo)?);
            }
            instrument.set_digital_output(sck, idle)?;
            if !mode.samples_on_first_edge() {
                bits.push(instrument.read_digital_input(sdo)?);
            }

            match period.checked_sub(period_start.elapsed()) {
                Some(remaining) if !remaining.is_zero() => thread::sleep(remaining),
                Some(_) => {}
                None => overruns += 1,
            }
        }

        Ok((bits, overruns))
    }

    /// Clock in a frame and assemble it into a sensor reading.
    pub fn read_reading<I: Instrument>(&self, instrument: &mut I) -> Result<u16> {
        let bytes = self.read_bytes(instrument)?;
        let reading = assemble_reading(&bytes);
        debug!(?bytes, reading, "SPI frame");
        Ok(reading)
    }
}

/// Group sampled bits into bytes. With [`BitOrder::MsbFirst`] the first bit
/// of every group is the most significant one. Leftover bits that do not fill
/// a byte are ignored.
pub fn pack_bits(bits: &[bool], order: BitOrder) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|chunk| {
            chunk.iter().enumerate().fold(0u8, |byte, (i, &bit)| {
                let shift = match order {
                    BitOrder::MsbFirst => 7 - i,
                    BitOrder::LsbFirst => i,
                };
                byte | (u8::from(bit) << shift)
            })
        })
        .collect()
}

/// Combine a two-byte sensor frame, dropping the stuffed zero bits:
/// `(byte0 << 4) | (byte1 >> 4)`. A frame shorter than two bytes reads as 0.
pub fn assemble_reading(bytes: &[u8]) -> u16 {
    match bytes {
        [high, low, ..] => (u16::from(*high) << 4) | u16::from(*low >> 4),
        _ => 0,
    }
}
