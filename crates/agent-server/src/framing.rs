//! Newline-delimited JSON framing
//!
//! Bytes are buffered until a `\n` arrives, so message boundaries never depend
//! on how the peer's writes were split across reads.

use serde::Serialize;
use serde_json::Value;

/// Accumulates raw bytes and yields complete lines
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from one read
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Split off everything before the first `\n`; the rest stays buffered
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        Some(line)
    }

    /// Bytes waiting for a newline
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// What one line means to the server
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Non-empty `content` to hand to the session
    Message(String),
    /// Not parseable as JSON
    Invalid,
    /// Blank line, or JSON without usable `content`
    Ignored,
}

pub fn decode_line(line: &[u8]) -> Inbound {
    let Ok(text) = std::str::from_utf8(line) else {
        return Inbound::Invalid;
    };
    let text = text.trim();
    if text.is_empty() {
        return Inbound::Ignored;
    }

    match serde_json::from_str::<Value>(text) {
        Err(_) => Inbound::Invalid,
        Ok(value) => match value.get("content") {
            Some(Value::String(content)) if !content.is_empty() => {
                Inbound::Message(content.clone())
            }
            _ => Inbound::Ignored,
        },
    }
}

/// One outbound line
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Content(String),
    Error(String),
}

impl Reply {
    pub fn invalid_json() -> Self {
        Self::Error("invalid json".into())
    }

    /// Serialize as a single `\n`-terminated JSON object
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
