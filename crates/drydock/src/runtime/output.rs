//! Combined output capture
//!
//! Stdout and stderr chunks are appended to one buffer in the order the
//! runtime delivers them. Decoding happens once at the end so multi-byte
//! characters split across chunks survive.

/// Appended to output that hit the capture limit
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Output collected from a finished container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Combined stdout/stderr, lossily decoded as UTF-8
    pub text: String,

    /// Whether the capture limit cut the output short
    pub truncated: bool,
}

/// Byte accumulator with an optional size cap
#[derive(Debug, Default)]
pub struct OutputBuffer {
    bytes: Vec<u8>,
    limit: Option<usize>,
    truncated: bool,
}

impl OutputBuffer {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append a chunk, dropping whatever exceeds the limit
    pub fn push(&mut self, chunk: &[u8]) {
        if self.truncated {
            return;
        }
        match self.limit {
            Some(limit) if self.bytes.len() + chunk.len() > limit => {
                let room = limit.saturating_sub(self.bytes.len());
                self.bytes.extend_from_slice(&chunk[..room]);
                self.truncated = true;
            }
            _ => self.bytes.extend_from_slice(chunk),
        }
    }

    /// Whether further chunks would be discarded
    pub fn is_full(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn finish(self) -> CapturedOutput {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        CapturedOutput {
            text,
            truncated: self.truncated,
        }
    }
}
