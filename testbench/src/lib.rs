//! Data-driven checks for the pinwire decoders.
//!
//! A fixture is a YAML file describing one recorded (or synthesised) trace and
//! what should come out of it. Two kinds exist:
//!
//! ```yaml
//! kind: uart
//! samples_per_bit: 10
//! bits: "0 00010110 1"      # spaces are ignored
//! expect:
//!   text: "h"
//! ```
//!
//! ```yaml
//! kind: framer
//! steps:
//!   - chunk: "%CONN"
//!     in_message: true
//!   - chunk: "ECT%ok"
//!     data: "ok"
//!     system: "CONNECT"
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use pinwire::{MessageFramer, WaveformDecoder};
use serde::Deserialize;

fn default_threshold() -> f64 {
    0.5
}

fn default_amplitude() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fixture {
    Uart(UartFixture),
    Framer(FramerFixture),
}

#[derive(Debug, Deserialize)]
pub struct UartFixture {
    pub samples_per_bit: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Raw analyser samples. Takes precedence over `bits`.
    #[serde(default)]
    pub samples: Option<Vec<f64>>,
    /// Line levels as a `0`/`1` string, expanded to `oversample` samples each.
    #[serde(default)]
    pub bits: Option<String>,
    /// Samples per entry of `bits`. Defaults to `samples_per_bit` rounded.
    #[serde(default)]
    pub oversample: Option<usize>,
    /// Voltage of a high sample in the synthesised trace.
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
    pub expect: UartExpect,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UartExpect {
    pub bytes: Option<Vec<u8>>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FramerFixture {
    pub steps: Vec<FramerStep>,
}

#[derive(Debug, Deserialize)]
pub struct FramerStep {
    pub chunk: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub system: String,
    /// Checked only when present.
    #[serde(default)]
    pub in_message: Option<bool>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("Invalid fixture {}", path.display()))
    }

    pub fn run(&self) -> Result<()> {
        match self {
            Fixture::Uart(fixture) => fixture.run(),
            Fixture::Framer(fixture) => fixture.run(),
        }
    }
}

impl UartFixture {
    pub fn trace(&self) -> Result<Vec<f64>> {
        if let Some(samples) = &self.samples {
            return Ok(samples.clone());
        }
        let Some(bits) = &self.bits else {
            bail!("uart fixture needs either `samples` or `bits`");
        };
        let per_bit = self
            .oversample
            .unwrap_or(self.samples_per_bit.round() as usize);

        let mut trace = Vec::new();
        for c in bits.chars().filter(|c| !c.is_whitespace()) {
            let level = match c {
                '0' => 0.0,
                '1' => self.amplitude,
                other => bail!("unexpected character {other:?} in bits"),
            };
            trace.extend(std::iter::repeat_n(level, per_bit));
        }
        Ok(trace)
    }

    pub fn run(&self) -> Result<()> {
        let trace = self.trace()?;
        let decoder = WaveformDecoder::new(self.samples_per_bit, self.threshold);
        let bytes = decoder.decode(&trace);

        if let Some(expected) = &self.expect.bytes {
            ensure!(
                &bytes == expected,
                "decoded {bytes:02x?}, expected {expected:02x?}"
            );
        }
        if let Some(expected) = &self.expect.text {
            let text: String = bytes.iter().map(|&b| char::from(b)).collect();
            ensure!(&text == expected, "decoded {text:?}, expected {expected:?}");
        }
        Ok(())
    }
}

impl FramerFixture {
    pub fn run(&self) -> Result<()> {
        let mut framer = MessageFramer::new();
        for (i, step) in self.steps.iter().enumerate() {
            let framed = framer.push(&step.chunk);
            ensure!(
                framed.data == step.data && framed.system == step.system,
                "step {i} ({:?}): got data {:?} system {:?}, expected data {:?} system {:?}",
                step.chunk,
                framed.data,
                framed.system,
                step.data,
                step.system
            );
            if let Some(expected) = step.in_message {
                ensure!(
                    framer.in_message() == expected,
                    "step {i} ({:?}): in_message is {}, expected {expected}",
                    step.chunk,
                    framer.in_message()
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_expand_to_oversampled_trace() {
        let fixture: Fixture =
            serde_yaml::from_str("kind: uart\nsamples_per_bit: 2\nbits: \"0 1\"\nexpect: {}\n")
                .unwrap();
        let Fixture::Uart(uart) = fixture else {
            panic!("expected a uart fixture");
        };
        assert_eq!(uart.trace().unwrap(), vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(serde_yaml::from_str::<Fixture>("kind: spi\n").is_err());
    }

    #[test]
    fn framer_mismatch_reports_step() {
        let fixture = FramerFixture {
            steps: vec![FramerStep {
                chunk: "a%b%".into(),
                data: "a".into(),
                system: String::new(),
                in_message: None,
            }],
        };
        let err = fixture.run().unwrap_err();
        assert!(err.to_string().contains("step 0"));
    }
}
