//! Pmod ALS ambient light sensor.
//!
//! The on-board ADC answers a chip-select with two bytes, MSB first, holding
//! three leading and four trailing zero bits around the 8-bit sample.

use tracing::debug;

use crate::Result;
use crate::config::AlsConfig;
use crate::instrument::{Direction, Instrument};
use crate::spi::SoftSpiReader;

/// Full-scale raw value used for percentage conversion.
pub const FULL_SCALE: f64 = 255.0;

#[derive(Debug)]
pub struct AmbientLightSensor {
    reader: SoftSpiReader,
    pins_ready: bool,
}

impl AmbientLightSensor {
    pub fn new(config: &AlsConfig) -> Self {
        Self {
            reader: SoftSpiReader::new(config.pins, config.spi()),
            pins_ready: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.pins_ready
    }

    /// Configure the static I/O lines and park them at their idle levels.
    pub fn open<I: Instrument>(&mut self, instrument: &mut I) -> Result<()> {
        let pins = self.reader.pins();
        instrument.set_pin_direction(pins.cs, Direction::Output)?;
        instrument.set_pin_direction(pins.sdo, Direction::Input)?;
        instrument.set_pin_direction(pins.sck, Direction::Output)?;

        instrument.set_digital_output(pins.cs, true)?;
        instrument.set_digital_output(pins.sck, self.reader.config().mode.idle_clock_high())?;

        self.pins_ready = true;
        debug!(?pins, "ALS pins configured");
        Ok(())
    }

    /// Release every line back to input.
    pub fn close<I: Instrument>(&mut self, instrument: &mut I) -> Result<()> {
        self.pins_ready = false;
        let pins = self.reader.pins();
        instrument.set_pin_direction(pins.cs, Direction::Input)?;
        instrument.set_pin_direction(pins.sdo, Direction::Input)?;
        instrument.set_pin_direction(pins.sck, Direction::Input)?;
        debug!("ALS pins released");
        Ok(())
    }

    /// Raw light level. Opens the pins on first use and keeps them configured.
    pub fn read<I: Instrument>(&mut self, instrument: &mut I) -> Result<u16> {
        if !self.pins_ready {
            self.open(instrument)?;
        }
        self.reader.read_reading(instrument)
    }

    /// Configure, read, and release in one go.
    pub fn read_once<I: Instrument>(&mut self, instrument: &mut I) -> Result<u16> {
        self.open(instrument)?;
        let reading = self.reader.read_reading(instrument);
        self.close(instrument)?;
        reading
    }

    /// Light level as a percentage of [`FULL_SCALE`], two decimals.
    pub fn read_percent<I: Instrument>(&mut self, instrument: &mut I) -> Result<f64> {
        self.read(instrument).map(to_percent)
    }
}

pub fn to_percent(reading: u16) -> f64 {
    (f64::from(reading) * 100.0 / FULL_SCALE * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_rounded_to_two_decimals() {
        assert_eq!(to_percent(0), 0.0);
        assert_eq!(to_percent(255), 100.0);
        assert_eq!(to_percent(127), 49.8);
        assert_eq!(to_percent(1), 0.39);
    }
}
