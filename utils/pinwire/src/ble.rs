//! Pmod BLE (RN4871) over a pattern generator and a logic analyser.
//!
//! Data goes out as a UART bitstream on the module's RX line and comes back as
//! a triggered capture of its TX line. Received bytes run through a
//! [`MessageFramer`] so status strings like `%CONNECT,...%` are reported apart
//! from the transparent-UART payload.

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::BleConfig;
use crate::framer::{Framed, MessageFramer};
use crate::instrument::{CaptureRequest, Direction, IdleState, Instrument};
use crate::uart::{Payload, WaveformDecoder, encode_frames};
use crate::{Error, Result};

/// Timeout of a non-blocking capture.
const NON_BLOCKING_TIMEOUT: Duration = Duration::from_secs(1);

/// RN4871 configuration commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Enter command mode.
    CommandMode,
    /// Leave command mode.
    DataMode,
    /// Set the advertised name to `PmodBLE_XXXX`.
    Rename,
    FactoryReset,
    HighPower,
    /// Set the pairing pin code to `123456`.
    PinCode,
    /// Device information + UART transparent service.
    TransparentMode,
    Reboot,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::CommandMode => "$$$",
            Command::DataMode => "---\r",
            Command::Rename => "S-,PmodBLE\r",
            Command::FactoryReset => "SF,1\r",
            Command::HighPower => "SGA,0\r",
            Command::PinCode => "SP,123456\r",
            Command::TransparentMode => "SS,C0\r",
            Command::Reboot => "R,1\r",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockingPolicy {
    /// Return whatever one capture held, possibly nothing.
    #[default]
    NonBlocking,
    /// Capture again until at least one byte is recovered.
    Blocking,
}

/// Data and status text recovered by one read.
pub type Received = Framed;

#[derive(Debug)]
pub struct BleModule {
    config: BleConfig,
    decoder: WaveformDecoder,
    framer: MessageFramer,
}

impl BleModule {
    pub fn new(config: BleConfig) -> Self {
        let decoder = WaveformDecoder::new(f64::from(config.record_multiplier), config.threshold);
        Self {
            config,
            decoder,
            framer: MessageFramer::new(),
        }
    }

    pub fn config(&self) -> &BleConfig {
        &self.config
    }

    pub fn framer(&self) -> &MessageFramer {
        &self.framer
    }

    /// Set up the reset and status lines and release the module from reset.
    pub fn open<I: Instrument>(&mut self, instrument: &mut I) -> Result<()> {
        let pins = self.config.pins;
        instrument.set_pin_direction(pins.rst, Direction::Output)?;
        instrument.set_pin_direction(pins.status, Direction::Input)?;
        instrument.set_digital_output(pins.rst, true)?;
        debug!(?pins, "BLE opened");
        Ok(())
    }

    /// Hard reset through the reset line.
    pub fn reboot<I: Instrument>(&mut self, instrument: &mut I) -> Result<()> {
        let rst = self.config.pins.rst;
        instrument.set_digital_output(rst, false)?;
        thread::sleep(self.config.reset_hold());
        instrument.set_digital_output(rst, true)?;
        debug!("BLE rebooting");
        Ok(())
    }

    /// Reboot the module and forget any half-received status message.
    pub fn close<I: Instrument>(&mut self, instrument: &mut I) -> Result<()> {
        self.reboot(instrument)?;
        self.framer.reset();
        debug!("BLE closed");
        Ok(())
    }

    /// The status line is pulled low while a central is connected.
    pub fn is_connected<I: Instrument>(&mut self, instrument: &mut I) -> Result<bool> {
        Ok(!instrument.read_digital_input(self.config.pins.status)?)
    }

    pub fn write_data<'a, I: Instrument>(
        &mut self,
        instrument: &mut I,
        payload: impl Into<Payload<'a>>,
    ) -> Result<()> {
        let bits = encode_frames(payload);
        debug!(bits = bits.len(), "BLE transmit");
        instrument.generate_waveform(
            self.config.pins.rx,
            &bits,
            self.config.baud_rate,
            IdleState::High,
        )
    }

    /// Capture the module's TX line, decode it, and split the result into
    /// data and status text.
    pub fn read<I: Instrument>(
        &mut self,
        instrument: &mut I,
        policy: BlockingPolicy,
    ) -> Result<Received> {
        let request = CaptureRequest {
            sample_rate: self.config.sample_rate(),
            buffer_size: self.config.buffer_size,
            trigger_on_falling_edge: true,
            timeout: match policy {
                BlockingPolicy::Blocking => None,
                BlockingPolicy::NonBlocking => Some(NON_BLOCKING_TIMEOUT),
            },
        };

        let bytes = loop {
            let samples = match instrument.capture_waveform(self.config.pins.tx, &request) {
                Ok(samples) => samples,
                // nothing arrived within the timeout
                Err(Error::CaptureTimeout) if policy == BlockingPolicy::NonBlocking => Vec::new(),
                Err(e) => return Err(e),
            };
            let bytes = self.decoder.decode(&samples);
            if !bytes.is_empty() || policy == BlockingPolicy::NonBlocking {
                break bytes;
            }
        };

        let received = self.framer.push_bytes(&bytes);
        if !received.system.is_empty() {
            info!(system = %received.system, "BLE system message");
        }
        Ok(received)
    }

    /// Send a command and check the reply. Returns `false` when the module
    /// answers with an error.
    pub fn write_command<I: Instrument>(
        &mut self,
        instrument: &mut I,
        command: Command,
    ) -> Result<bool> {
        self.write_data(instrument, command.as_str())?;
        let response = self.read(instrument, BlockingPolicy::NonBlocking)?;
        let accepted = !is_error_reply(&response.data);
        debug!(command = command.as_str().trim_end(), accepted, "BLE command");
        Ok(accepted)
    }

    /// Restore factory settings, then rename the module, enable high power
    /// output and the transparent UART service.
    pub fn factory_reset<I: Instrument>(&mut self, instrument: &mut I) -> Result<()> {
        self.enter_command_mode(instrument)?;

        let mut attempts = 0;
        while !self.write_command(instrument, Command::FactoryReset)? {
            attempts += 1;
            if attempts >= self.config.max_command_attempts {
                return Err(Error::CommandRejected(Command::FactoryReset.as_str().into()));
            }
            warn!(attempts, "factory reset refused, retrying");
            thread::sleep(self.config.command_delay());
        }
        info!("BLE factory reset finished");

        self.enter_command_mode(instrument)?;
        for command in [Command::Rename, Command::HighPower, Command::TransparentMode] {
            self.write_command(instrument, command)?;
            thread::sleep(self.config.command_delay());
        }
        self.write_command(instrument, Command::DataMode)?;
        thread::sleep(self.config.mode_switch_delay());
        info!("BLE configured for transparent UART");
        Ok(())
    }

    fn enter_command_mode<I: Instrument>(&mut self, instrument: &mut I) -> Result<()> {
        self.write_command(instrument, Command::CommandMode)?;
        thread::sleep(self.config.mode_switch_delay());
        Ok(())
    }
}

fn is_error_reply(data: &str) -> bool {
    data.starts_with("ERR") || data.starts_with("Err")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_replies() {
        assert!(is_error_reply("Err\r\nCMD> "));
        assert!(is_error_reply("ERR"));
        assert!(!is_error_reply("AOK\r\nCMD> "));
        assert!(!is_error_reply(""));
    }

    #[test]
    fn command_strings() {
        assert_eq!(Command::CommandMode.as_str(), "$$$");
        assert_eq!(Command::DataMode.as_str(), "---\r");
        assert_eq!(Command::FactoryReset.as_str(), "SF,1\r");
    }
}
