//! In-memory instrument.
//!
//! Holds a level and direction per pin, queued captures, and a log of every
//! generated waveform. Two peripheral models can be attached:
//!
//! - a UART loop-back that turns waveforms generated on one pin into
//!   oversampled captures of another, as if the module echoed its input;
//! - an SPI peripheral that shifts a byte image out on its data pin in
//!   response to the clock edges driven through [`Instrument::set_digital_output`].

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::instrument::{CaptureRequest, Direction, IdleState, Instrument, Pin, SampleBuffer};
use crate::spi::SpiMode;
use crate::uart::BitSequence;
use crate::{Error, Result};

/// A waveform handed to the pattern generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedWaveform {
    pub pin: Pin,
    pub bits: BitSequence,
    pub baud_rate: u32,
    pub idle: IdleState,
}

/// SPI peripheral answering on `sdo` while `cs` is held low.
#[derive(Debug, Clone)]
pub struct SpiPeripheral {
    pub cs: Pin,
    pub sck: Pin,
    pub sdo: Pin,
    pub mode: SpiMode,
    /// Bytes shifted out MSB-first, one frame per chip-select assertion.
    pub image: Vec<u8>,
}

#[derive(Debug)]
struct SpiState {
    device: SpiPeripheral,
    selected: bool,
    leading_edges: usize,
    trailing_edges: usize,
}

impl SpiState {
    fn bit_index(&self) -> usize {
        if self.device.mode.samples_on_first_edge() {
            self.trailing_edges
        } else {
            self.leading_edges.saturating_sub(1)
        }
    }

    fn output(&self) -> bool {
        if !self.selected {
            return true;
        }
        let index = self.bit_index();
        self.device
            .image
            .get(index / 8)
            .is_some_and(|byte| byte & (0x80 >> (index % 8)) != 0)
    }
}

#[derive(Debug, Default)]
pub struct VirtualBench {
    directions: HashMap<Pin, Direction>,
    levels: HashMap<Pin, bool>,
    captures: HashMap<Pin, VecDeque<SampleBuffer>>,
    loopbacks: HashMap<Pin, Pin>,
    pending_loopback: HashMap<Pin, VecDeque<(BitSequence, u32)>>,
    spi: Option<SpiState>,
    generated: Vec<GeneratedWaveform>,
}

impl VirtualBench {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level seen when reading an input pin with nothing else driving it.
    pub fn set_input(&mut self, pin: Pin, level: bool) {
        self.levels.insert(pin, level);
    }

    pub fn direction(&self, pin: Pin) -> Option<Direction> {
        self.directions.get(&pin).copied()
    }

    /// Last level driven on or assigned to `pin`.
    pub fn level(&self, pin: Pin) -> Option<bool> {
        self.levels.get(&pin).copied()
    }

    pub fn queue_capture(&mut self, pin: Pin, samples: SampleBuffer) {
        self.captures.entry(pin).or_default().push_back(samples);
    }

    /// Render every waveform generated on `tx` as a capture of `rx`.
    pub fn loop_back(&mut self, tx: Pin, rx: Pin) {
        self.loopbacks.insert(tx, rx);
    }

    pub fn attach_spi_peripheral(&mut self, device: SpiPeripheral) {
        self.spi = Some(SpiState {
            device,
            selected: false,
            leading_edges: 0,
            trailing_edges: 0,
        });
    }

    pub fn generated(&self) -> &[GeneratedWaveform] {
        &self.generated
    }

    fn on_output(&mut self, pin: Pin, level: bool) {
        let Some(spi) = self.spi.as_mut() else {
            return;
        };
        if pin == spi.device.cs {
            let selected = !level;
            if selected != spi.selected {
                spi.selected = selected;
                spi.leading_edges = 0;
                spi.trailing_edges = 0;
            }
        } else if pin == spi.device.sck && spi.selected {
            if level != spi.device.mode.idle_clock_high() {
                spi.leading_edges += 1;
            } else {
                spi.trailing_edges += 1;
            }
        }
    }

    fn render(bits: &BitSequence, baud_rate: u32, request: &CaptureRequest) -> SampleBuffer {
        let per_bit = (request.sample_rate / f64::from(baud_rate)).round().max(1.0) as usize;
        let mut samples: SampleBuffer = bits
            .iter()
            .flat_map(|bit| std::iter::repeat_n(if bit { 1.0 } else { 0.0 }, per_bit))
            .take(request.buffer_size)
            .collect();
        samples.resize(request.buffer_size, 1.0);
        samples
    }
}

impl Instrument for VirtualBench {
    fn set_pin_direction(&mut self, pin: Pin, direction: Direction) -> Result<()> {
        self.directions.insert(pin, direction);
        Ok(())
    }

    fn set_digital_output(&mut self, pin: Pin, level: bool) -> Result<()> {
        if self.direction(pin) != Some(Direction::Output) {
            return Err(Error::PinDirection {
                pin,
                expected: Direction::Output,
            });
        }
        self.levels.insert(pin, level);
        self.on_output(pin, level);
        Ok(())
    }

    fn read_digital_input(&mut self, pin: Pin) -> Result<bool> {
        if let Some(spi) = &self.spi {
            if pin == spi.device.sdo {
                return Ok(spi.output());
            }
        }
        self.levels.get(&pin).copied().ok_or(Error::PinDirection {
            pin,
            expected: Direction::Input,
        })
    }

    fn capture_waveform(&mut self, pin: Pin, request: &CaptureRequest) -> Result<SampleBuffer> {
        if let Some((bits, baud_rate)) = self
            .pending_loopback
            .get_mut(&pin)
            .and_then(VecDeque::pop_front)
        {
            trace!(pin, bits = bits.len(), "rendering looped-back waveform");
            return Ok(Self::render(&bits, baud_rate, request));
        }
        self.captures
            .get_mut(&pin)
            .and_then(VecDeque::pop_front)
            .ok_or(Error::CaptureTimeout)
    }

    fn generate_waveform(
        &mut self,
        pin: Pin,
        bits: &BitSequence,
        baud_rate: u32,
        idle: IdleState,
    ) -> Result<()> {
        if baud_rate == 0 {
            return Err(Error::Instrument("baud rate must be positive".into()));
        }
        if let Some(&rx) = self.loopbacks.get(&pin) {
            self.pending_loopback
                .entry(rx)
                .or_default()
                .push_back((bits.clone(), baud_rate));
        }
        self.levels.insert(pin, idle.level());
        self.generated.push(GeneratedWaveform {
            pin,
            bits: bits.clone(),
            baud_rate,
            idle,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uart::encode_frames;

    #[test]
    fn driving_an_input_fails() {
        let mut bench = VirtualBench::new();
        bench.set_pin_direction(4, Direction::Input).unwrap();
        assert!(matches!(
            bench.set_digital_output(4, true),
            Err(Error::PinDirection { pin: 4, .. })
        ));
    }

    #[test]
    fn reads_back_assigned_levels() {
        let mut bench = VirtualBench::new();
        bench.set_input(6, false);
        assert!(!bench.read_digital_input(6).unwrap());
        assert!(bench.read_digital_input(7).is_err());
    }

    #[test]
    fn empty_capture_queue_times_out() {
        let mut bench = VirtualBench::new();
        let request = CaptureRequest {
            sample_rate: 1000.0,
            buffer_size: 10,
            trigger_on_falling_edge: true,
            timeout: None,
        };
        assert!(matches!(
            bench.capture_waveform(1, &request),
            Err(Error::CaptureTimeout)
        ));
    }

    #[test]
    fn loopback_renders_oversampled_idle_padded_capture() {
        let mut bench = VirtualBench::new();
        bench.loop_back(3, 4);
        let bits = encode_frames(0xFFu8);
        bench.generate_waveform(3, &bits, 100, IdleState::High).unwrap();
        let request = CaptureRequest {
            sample_rate: 400.0,
            buffer_size: 48,
            trigger_on_falling_edge: true,
            timeout: None,
        };
        let samples = bench.capture_waveform(4, &request).unwrap();
        assert_eq!(samples.len(), 48);
        assert_eq!(&samples[..4], &[0.0; 4]);
        assert!(samples[4..].iter().all(|&s| s == 1.0));
        assert_eq!(bench.generated().len(), 1);
    }

    #[test]
    fn spi_peripheral_shifts_msb_first() {
        let mut bench = VirtualBench::new();
        bench.attach_spi_peripheral(SpiPeripheral {
            cs: 0,
            sck: 2,
            sdo: 1,
            mode: SpiMode::Mode0,
            image: vec![0b1000_0000],
        });
        bench.set_pin_direction(0, Direction::Output).unwrap();
        bench.set_pin_direction(2, Direction::Output).unwrap();
        bench.set_digital_output(0, false).unwrap();
        assert!(bench.read_digital_input(1).unwrap());
        bench.set_digital_output(2, true).unwrap();
        bench.set_digital_output(2, false).unwrap();
        assert!(!bench.read_digital_input(1).unwrap());
    }
}
