//! Line reconstruction from arbitrarily chunked text

/// Accumulates chunks and hands back complete lines
///
/// Text after the last newline stays buffered as the pending line until a
/// later chunk terminates it or [`LineBuffer::flush`] is called. Newlines are
/// consumed; a `\r` before the newline is kept as part of the line.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(idx) = rest.find('\n') {
            self.pending.push_str(&rest[..idx]);
            lines.push(std::mem::take(&mut self.pending));
            rest = &rest[idx + 1..];
        }
        self.pending.push_str(rest);
        lines
    }

    /// The unterminated tail seen so far
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Take the unterminated tail, if any
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}
