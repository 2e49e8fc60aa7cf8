use serde::Deserialize;

/// One decoded line of the chat backend's response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `data:`-prefixed SSE line.
    Sse(String),
    /// Newline-delimited JSON object carrying `content` or `delta`.
    Json(String),
    /// Anything else; the trimmed line is the token.
    Plain(String),
    /// JSON-looking line that could not be read.
    Malformed,
}

impl Frame {
    /// The non-empty token carried by this frame, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            Frame::Sse(t) | Frame::Json(t) | Frame::Plain(t) if !t.is_empty() => Some(t.as_str()),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct JsonChunk {
    content: Option<serde_json::Value>,
    delta: Option<serde_json::Value>,
}

fn string_field(value: Option<serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Classifies one line by how it begins. Only the line terminator is
/// stripped before the prefix checks, so an indented `data:` or `{` line is
/// plain text.
pub fn classify_line(line: &str) -> Frame {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if let Some(rest) = line.strip_prefix("data:") {
        return Frame::Sse(rest.trim().to_string());
    }

    if line.starts_with('{') {
        return match serde_json::from_str::<JsonChunk>(line) {
            Ok(chunk) => {
                match string_field(chunk.content).or_else(|| string_field(chunk.delta)) {
                    Some(token) => Frame::Json(token),
                    None => Frame::Malformed,
                }
            }
            Err(_) => Frame::Malformed,
        };
    }

    Frame::Plain(line.trim().to_string())
}

/// Splits an incoming byte stream on `\n`, holding back the trailing partial
/// line until the next chunk (or `finish`) completes it.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            frames.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        frames
    }

    /// Flushes whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> Frame {
    classify_line(&String::from_utf8_lossy(bytes))
}
