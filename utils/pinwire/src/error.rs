use thiserror::Error;

use crate::instrument::{Direction, Pin};

/// Errors raised at the instrument boundary.
///
/// Protocol-level faults (malformed UART words, short captures, degenerate
/// codec ranges, SPI timing overruns) never show up here; they are absorbed by
/// the decoders and reflected as empty or zero outputs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("instrument error: {0}")]
    Instrument(String),

    #[error("pin {pin} is not configured as {expected}")]
    PinDirection { pin: Pin, expected: Direction },

    #[error("capture timed out")]
    CaptureTimeout,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("command rejected: {0:?}")]
    CommandRejected(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
