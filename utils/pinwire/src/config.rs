use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::instrument::Pin;
use crate::spi::{BitOrder, SpiConfig, SpiMode, SpiPins};
use crate::{Error, Result};

/// Everything a session needs, built once and handed to the drivers.
///
/// Every field has a default matching the Pmod ALS / Pmod BLE wiring used on
/// the bench, so a YAML file only has to list what differs:
///
/// ```yaml
/// ble:
///   pins: { rx: 3, tx: 4, rst: 5, status: 6 }
/// als:
///   pins: { cs: 8, sdo: 9, sck: 10 }
///   spi_mode: 0
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub ble: BleConfig,
    pub als: AlsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlePins {
    /// Module RX line, driven by the pattern generator.
    pub rx: Pin,
    /// Module TX line, recorded by the logic analyser.
    pub tx: Pin,
    pub rst: Pin,
    pub status: Pin,
}

impl Default for BlePins {
    fn default() -> Self {
        Self {
            rx: 0,
            tx: 1,
            rst: 2,
            status: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BleConfig {
    pub pins: BlePins,
    pub baud_rate: u32,
    /// Logic analyser samples per UART bit.
    pub record_multiplier: u32,
    /// Samples per capture.
    pub buffer_size: usize,
    /// Fraction of a bit period that must read high for a 1.
    pub threshold: f64,
    /// How long the reset line is held low on reboot.
    pub reset_hold_ms: u64,
    /// Settle time after entering or leaving command mode.
    pub mode_switch_delay_ms: u64,
    /// Settle time after any other configuration command.
    pub command_delay_ms: u64,
    /// Attempts at a command that must be accepted before giving up.
    pub max_command_attempts: u32,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            pins: BlePins::default(),
            baud_rate: 115_200,
            record_multiplier: 10,
            buffer_size: 600,
            threshold: 0.5,
            reset_hold_ms: 1000,
            mode_switch_delay_ms: 3000,
            command_delay_ms: 1000,
            max_command_attempts: 10,
        }
    }
}

impl BleConfig {
    pub fn sample_rate(&self) -> f64 {
        f64::from(self.baud_rate) * f64::from(self.record_multiplier)
    }

    pub fn reset_hold(&self) -> Duration {
        Duration::from_millis(self.reset_hold_ms)
    }

    pub fn mode_switch_delay(&self) -> Duration {
        Duration::from_millis(self.mode_switch_delay_ms)
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(Error::InvalidConfig("ble.baud_rate must be positive".into()));
        }
        if self.record_multiplier == 0 {
            return Err(Error::InvalidConfig(
                "ble.record_multiplier must be positive".into(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(Error::InvalidConfig("ble.buffer_size must be positive".into()));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "ble.threshold must be inside (0, 1), got {}",
                self.threshold
            )));
        }
        if self.max_command_attempts == 0 {
            return Err(Error::InvalidConfig(
                "ble.max_command_attempts must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SpiPins {
    fn default() -> Self {
        Self {
            cs: 0,
            sdo: 1,
            sck: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlsConfig {
    pub pins: SpiPins,
    pub spi_frequency: f64,
    pub spi_mode: SpiMode,
    pub bit_order: BitOrder,
    pub bytes_count: usize,
}

impl Default for AlsConfig {
    fn default() -> Self {
        Self {
            pins: SpiPins::default(),
            spi_frequency: 1e6,
            spi_mode: SpiMode::Mode0,
            bit_order: BitOrder::MsbFirst,
            bytes_count: 2,
        }
    }
}

impl AlsConfig {
    pub fn spi(&self) -> SpiConfig {
        SpiConfig {
            frequency_hz: self.spi_frequency,
            mode: self.spi_mode,
            bit_order: self.bit_order,
            byte_count: self.bytes_count,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.spi_frequency.is_finite() && self.spi_frequency > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "als.spi_frequency must be a positive number, got {}",
                self.spi_frequency
            )));
        }
        if self.bytes_count == 0 {
            return Err(Error::InvalidConfig("als.bytes_count must be positive".into()));
        }
        Ok(())
    }
}

impl SessionConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: SessionConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.ble.validate()?;
        self.als.validate()
    }
}
