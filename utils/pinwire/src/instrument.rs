//! Capabilities the protocol layer needs from the host instrument.
//!
//! Everything above this trait works on raw digital-pin primitives only:
//! static levels, a sampled capture, and a clocked pattern output.

use std::fmt;
use std::time::Duration;

use crate::Result;
use crate::uart::BitSequence;

/// Digital I/O line index on the instrument.
pub type Pin = u8;

/// Samples captured from one pin at a fixed rate.
pub type SampleBuffer = Vec<f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Line level held by the pattern generator before and after a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    Low,
    High,
}

impl IdleState {
    pub fn level(self) -> bool {
        matches!(self, IdleState::High)
    }
}

/// Parameters of one waveform capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// Samples per second.
    pub sample_rate: f64,
    /// Number of samples to return.
    pub buffer_size: usize,
    /// Start the capture on a falling edge of the pin instead of immediately.
    pub trigger_on_falling_edge: bool,
    /// How long to wait for the trigger. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Host instrument as seen by the drivers.
///
/// Implementations are free to fail any call; the error is passed through to
/// the caller unchanged.
pub trait Instrument {
    fn set_pin_direction(&mut self, pin: Pin, direction: Direction) -> Result<()>;

    fn set_digital_output(&mut self, pin: Pin, level: bool) -> Result<()>;

    fn read_digital_input(&mut self, pin: Pin) -> Result<bool>;

    /// Record `request.buffer_size` samples of `pin`.
    fn capture_waveform(&mut self, pin: Pin, request: &CaptureRequest) -> Result<SampleBuffer>;

    /// Play `bits` on `pin` at `baud_rate` bits per second, holding the line
    /// at `idle` outside the sequence.
    fn generate_waveform(
        &mut self,
        pin: Pin,
        bits: &BitSequence,
        baud_rate: u32,
        idle: IdleState,
    ) -> Result<()>;
}

impl<I: Instrument + ?Sized> Instrument for &mut I {
    fn set_pin_direction(&mut self, pin: Pin, direction: Direction) -> Result<()> {
        (**self).set_pin_direction(pin, direction)
    }

    fn set_digital_output(&mut self, pin: Pin, level: bool) -> Result<()> {
        (**self).set_digital_output(pin, level)
    }

    fn read_digital_input(&mut self, pin: Pin) -> Result<bool> {
        (**self).read_digital_input(pin)
    }

    fn capture_waveform(&mut self, pin: Pin, request: &CaptureRequest) -> Result<SampleBuffer> {
        (**self).capture_waveform(pin, request)
    }

    fn generate_waveform(
        &mut self,
        pin: Pin,
        bits: &BitSequence,
        baud_rate: u32,
        idle: IdleState,
    ) -> Result<()> {
        (**self).generate_waveform(pin, bits, baud_rate, idle)
    }
}
