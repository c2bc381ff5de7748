pub mod als;
pub mod bench;
pub mod ble;
pub mod codec;
pub mod config;
mod error;
pub mod framer;
pub mod instrument;
pub mod spi;
pub mod uart;

// Re-export public API
pub use als::AmbientLightSensor;
pub use bench::VirtualBench;
pub use ble::{BleModule, BlockingPolicy, Command};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use framer::{Framed, FramerState, MessageFramer};
pub use instrument::{CaptureRequest, Direction, IdleState, Instrument, Pin, SampleBuffer};
pub use spi::{BitOrder, SoftSpiReader, SpiMode};
pub use uart::{BitSequence, Payload, WaveformDecoder, encode_frames};
