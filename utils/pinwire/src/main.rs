use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use pinwire::{
    BleModule, BlockingPolicy, MessageFramer, SessionConfig, VirtualBench, WaveformDecoder, codec,
    encode_frames, spi,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "pinwire")]
#[command(about = "Software UART/SPI tools for pin-level instruments")]
#[command(version)]
struct Args {
    /// Session configuration (YAML)
    #[arg(short, long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the UART bit sequence for a text payload
    Encode {
        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// Decode a recorded sample trace (numbers separated by whitespace or commas)
    Decode {
        #[arg(value_name = "TRACE")]
        trace: Utf8PathBuf,

        /// Samples per bit (default: ble.record_multiplier)
        #[arg(long)]
        samples_per_bit: Option<f64>,

        /// High fraction of a bit period (default: ble.threshold)
        #[arg(long)]
        threshold: Option<f64>,

        /// Split the decoded text into data and system messages
        #[arg(long)]
        frame: bool,
    },

    /// Pack a value into a tagged codec byte
    Pack {
        #[arg(long, allow_negative_numbers = true)]
        value: f64,
        #[arg(long, value_parser = parse_hex)]
        tag: u8,
        #[arg(long)]
        max: f64,
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        min: f64,
    },

    /// Split a codec byte into tag and magnitude
    Unpack {
        #[arg(value_parser = parse_hex)]
        byte: u8,
    },

    /// Assemble a light sensor reading from its two SPI bytes
    Assemble {
        #[arg(value_parser = parse_hex)]
        high: u8,
        #[arg(value_parser = parse_hex)]
        low: u8,
    },

    /// Send text through a virtual loop-back and read it back (one capture of
    /// ble.buffer_size samples)
    Loopback {
        #[arg(value_name = "TEXT")]
        text: String,
    },
}

fn parse_hex(s: &str) -> Result<u8, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x") {
        u8::from_str_radix(hex, 16)
    } else if let Some(bin) = s.strip_prefix("0b") {
        u8::from_str_radix(bin, 2)
    } else {
        s.parse()
    }
}

fn parse_trace(text: &str) -> Result<Vec<f64>> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f64>()
                .with_context(|| format!("Invalid sample: {token:?}"))
        })
        .collect()
}

fn printable(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b).escape_default().to_string()).collect()
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => {
            SessionConfig::load(path).with_context(|| format!("Failed to load config {path}"))?
        }
        None => SessionConfig::default(),
    };

    match args.command {
        Cmd::Encode { text } => {
            println!("{}", encode_frames(text.as_str()));
        }
        Cmd::Decode {
            trace,
            samples_per_bit,
            threshold,
            frame,
        } => {
            let text = std::fs::read_to_string(&trace)
                .with_context(|| format!("Failed to read trace {trace}"))?;
            let samples = parse_trace(&text)?;
            let decoder = WaveformDecoder::new(
                samples_per_bit.unwrap_or(f64::from(config.ble.record_multiplier)),
                threshold.unwrap_or(config.ble.threshold),
            );
            let bytes = decoder.decode(&samples);
            let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
            println!("{} samples, {} bytes", samples.len(), bytes.len());
            println!("hex:  {}", hex.join(" "));
            println!("text: {}", printable(&bytes));
            if frame {
                let framed = MessageFramer::new().push_bytes(&bytes);
                println!("data:   {:?}", framed.data);
                println!("system: {:?}", framed.system);
            }
        }
        Cmd::Pack {
            value,
            tag,
            max,
            min,
        } => {
            let byte = codec::encode(value, tag, max, min);
            println!("0x{byte:02x} 0b{byte:08b}");
        }
        Cmd::Unpack { byte } => {
            let frame = codec::decode(byte);
            println!(
                "tag: 0b{:02b} raw: {} ({}%)",
                frame.tag,
                frame.raw,
                frame.percent()
            );
        }
        Cmd::Assemble { high, low } => {
            let reading = spi::assemble_reading(&[high, low]);
            println!(
                "reading: {} (0x{:03x}) {}%",
                reading,
                reading,
                pinwire::als::to_percent(reading)
            );
        }
        Cmd::Loopback { text } => {
            let mut bench = VirtualBench::new();
            bench.loop_back(config.ble.pins.rx, config.ble.pins.tx);
            let mut ble = BleModule::new(config.ble.clone());
            ble.write_data(&mut bench, text.as_str())?;
            let received = ble.read(&mut bench, BlockingPolicy::NonBlocking)?;
            println!("data:   {:?}", received.data);
            println!("system: {:?}", received.system);
            if ble.framer().in_message() {
                println!("(system message still open)");
            }
        }
    }

    Ok(())
}
