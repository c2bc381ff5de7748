//! Separation of payload data and `%`-delimited system messages.
//!
//! The BLE module interleaves status strings such as `%CONNECT,...%` with the
//! transparent UART data. A capture window may cut a status string in half, so
//! the framer keeps the unfinished part until a later chunk closes it.
//!
//! Boundaries are decided per chunk from the number of sentinels it contains:
//!
//! | state       | sentinels | result                                              | next        |
//! |-------------|-----------|-----------------------------------------------------|-------------|
//! | `Idle`      | 0         | chunk is data                                       | `Idle`      |
//! | `Idle`      | 2         | inside the pair is a message, outside is data       | `Idle`      |
//! | `Idle`      | 1 or ≥ 3  | before the first is data, up to the next is pending | `InMessage` |
//! | `InMessage` | 0         | chunk extends the pending message                   | `InMessage` |
//! | `InMessage` | ≥ 1       | before the first closes the message, up to the next is data | `Idle` |
//!
//! Only the first boundary of a chunk is honoured; text past a second sentinel
//! in the last two rows is discarded. There is no timeout and no length limit
//! on a pending message.

use tracing::debug;

pub const SENTINEL: char = '%';

/// Framing state carried between chunks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FramerState {
    #[default]
    Idle,
    InMessage { partial: String },
}

/// Output of one framing step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Framed {
    pub data: String,
    pub system: String,
}

impl Framed {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.system.is_empty()
    }
}

/// One instance per logical connection.
#[derive(Debug, Clone, Default)]
pub struct MessageFramer {
    state: FramerState,
}

impl MessageFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FramerState {
        &self.state
    }

    pub fn in_message(&self) -> bool {
        matches!(self.state, FramerState::InMessage { .. })
    }

    /// Drop any pending message and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = FramerState::Idle;
    }

    /// Classify raw received bytes. Each byte becomes the character with the
    /// same code point.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Framed {
        let chunk: String = bytes.iter().map(|&b| char::from(b)).collect();
        self.push(&chunk)
    }

    pub fn push(&mut self, chunk: &str) -> Framed {
        let parts: Vec<&str> = chunk.split(SENTINEL).collect();
        let sentinels = parts.len() - 1;

        match std::mem::take(&mut self.state) {
            FramerState::Idle => match sentinels {
                0 => Framed {
                    data: chunk.to_owned(),
                    system: String::new(),
                },
                2 => Framed {
                    data: [parts[0], parts[2]].concat(),
                    system: parts[1].to_owned(),
                },
                _ => {
                    discard_tail(&parts);
                    self.state = FramerState::InMessage {
                        partial: parts[1].to_owned(),
                    };
                    Framed {
                        data: parts[0].to_owned(),
                        system: String::new(),
                    }
                }
            },
            FramerState::InMessage { mut partial } => {
                if sentinels == 0 {
                    partial.push_str(chunk);
                    self.state = FramerState::InMessage { partial };
                    return Framed::default();
                }
                discard_tail(&parts);
                partial.push_str(parts[0]);
                Framed {
                    data: parts[1].to_owned(),
                    system: partial,
                }
            }
        }
    }
}

fn discard_tail(parts: &[&str]) {
    if parts.len() > 2 {
        let dropped: usize = parts[2..].iter().map(|part| part.len() + 1).sum();
        debug!(dropped, "discarding text past second sentinel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(data: &str, system: &str) -> Framed {
        Framed {
            data: data.to_owned(),
            system: system.to_owned(),
        }
    }

    #[test]
    fn plain_data_passes_through() {
        let mut framer = MessageFramer::new();
        assert_eq!(framer.push("hello"), framed("hello", ""));
        assert_eq!(framer.state(), &FramerState::Idle);
    }

    #[test]
    fn complete_message_inside_chunk() {
        let mut framer = MessageFramer::new();
        assert_eq!(framer.push("abc%msg%def"), framed("abcdef", "msg"));
        assert!(!framer.in_message());
    }

    #[test]
    fn message_split_across_chunks() {
        let mut framer = MessageFramer::new();
        assert_eq!(framer.push("%hello"), framed("", ""));
        assert!(framer.in_message());
        assert_eq!(framer.push("world%"), framed("", "helloworld"));
        assert_eq!(framer.state(), &FramerState::Idle);
    }

    #[test]
    fn message_spanning_three_chunks() {
        let mut framer = MessageFramer::new();
        assert_eq!(framer.push("data%CONN"), framed("data", ""));
        assert_eq!(framer.push("ECT,1,"), framed("", ""));
        assert_eq!(
            framer.state(),
            &FramerState::InMessage {
                partial: "CONNECT,1,".to_owned()
            }
        );
        assert_eq!(framer.push("0%tail"), framed("tail", "CONNECT,1,0"));
    }

    #[test]
    fn empty_chunk_keeps_state() {
        let mut framer = MessageFramer::new();
        assert!(framer.push("").is_empty());
        assert_eq!(framer.state(), &FramerState::Idle);

        framer.push("%pend");
        let before = framer.state().clone();
        assert!(framer.push("").is_empty());
        assert_eq!(framer.state(), &before);
    }

    #[test]
    fn extra_sentinels_after_closing_are_discarded() {
        let mut framer = MessageFramer::new();
        framer.push("%one");
        assert_eq!(framer.push("%mid%two%"), framed("mid", "one"));
        assert!(!framer.in_message());
    }

    #[test]
    fn three_sentinels_from_idle_open_a_message() {
        let mut framer = MessageFramer::new();
        assert_eq!(framer.push("a%b%c%d"), framed("a", ""));
        assert_eq!(
            framer.state(),
            &FramerState::InMessage {
                partial: "b".to_owned()
            }
        );
    }

    #[test]
    fn bytes_map_to_latin1() {
        let mut framer = MessageFramer::new();
        assert_eq!(framer.push_bytes(&[b'o', 0xE9, b'%', b'x', b'%']), framed("o\u{e9}", "x"));
    }

    #[test]
    fn reset_drops_pending_message() {
        let mut framer = MessageFramer::new();
        framer.push("%never closed");
        framer.reset();
        assert_eq!(framer.push("data"), framed("data", ""));
    }
}
