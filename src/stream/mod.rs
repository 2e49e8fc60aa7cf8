pub mod decoder;
pub mod format;

use self::decoder::{ Frame, LineDecoder };
use self::format::format_answer;
use log::debug;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestState {
    Idle,
    Connecting,
    Receiving,
    Completed,
    Failed,
}

/// Text to publish after a chunk produced at least one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestUpdate {
    pub text: String,
    pub first_token: bool,
}

/// Per-turn decoding state: line framing, token accumulation and the
/// Idle → Connecting → Receiving → Completed/Failed lifecycle.
///
/// Holds no I/O; the controller feeds it bytes read from the backend.
#[derive(Debug)]
pub struct StreamingIngest {
    state: IngestState,
    decoder: LineDecoder,
    accumulator: String,
    tokens: usize,
    dropped: usize,
}

impl Default for StreamingIngest {
    fn default() -> Self {
        Self {
            state: IngestState::Idle,
            decoder: LineDecoder::new(),
            accumulator: String::new(),
            tokens: 0,
            dropped: 0,
        }
    }
}

impl StreamingIngest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn token_count(&self) -> usize {
        self.tokens
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped
    }

    /// Resets everything and enters `Connecting`.
    pub fn start(&mut self) {
        *self = Self::default();
        self.state = IngestState::Connecting;
    }

    pub fn opened(&mut self) {
        if self.state == IngestState::Connecting {
            self.state = IngestState::Receiving;
        }
    }

    /// Decodes one chunk. Returns `None` when the chunk completed no line
    /// carrying a token.
    pub fn ingest(&mut self, chunk: &[u8]) -> Option<IngestUpdate> {
        if self.state != IngestState::Receiving {
            return None;
        }
        let frames = self.decoder.push(chunk);
        self.apply(frames)
    }

    /// Ends the stream: flushes the last unterminated line and returns the
    /// final formatted text.
    pub fn finish(&mut self) -> (Option<IngestUpdate>, String) {
        let update = if self.state == IngestState::Receiving {
            let tail: Vec<Frame> = self.decoder.finish().into_iter().collect();
            self.apply(tail)
        } else {
            None
        };
        self.state = IngestState::Completed;
        (update, self.formatted())
    }

    pub fn fail(&mut self) {
        self.state = IngestState::Failed;
        self.accumulator.clear();
    }

    pub fn formatted(&self) -> String {
        format_answer(&self.accumulator)
    }

    fn apply(&mut self, frames: Vec<Frame>) -> Option<IngestUpdate> {
        let before = self.tokens;
        for frame in frames {
            match frame.token() {
                Some(token) => {
                    self.accumulator.push_str(token);
                    self.tokens += 1;
                }
                None => {
                    if frame == Frame::Malformed {
                        self.dropped += 1;
                        debug!("Dropping malformed stream frame");
                    }
                }
            }
        }

        if self.tokens == before {
            return None;
        }
        Some(IngestUpdate {
            text: self.formatted(),
            first_token: before == 0,
        })
    }
}
