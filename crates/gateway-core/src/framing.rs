//! Blank-line frame splitting for streamed text bodies.
//!
//! Both the internal event stream and the upstream `data:` streams are
//! sequences of frames separated by an empty line. Chunks from the network
//! do not respect frame boundaries, so the splitter buffers partial frames
//! across calls.

/// Incremental splitter over `\n\n` / `\r\n\r\n` delimited frames
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buffer: Vec<u8>,
}

impl FrameSplitter {
    /// Create an empty splitter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completed, in order.
    ///
    /// Empty frames are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some((start, end)) = find_delimiter(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end).take(start).collect();
            if !frame.is_empty() {
                frames.push(String::from_utf8_lossy(&frame).into_owned());
            }
        }
        frames
    }

    /// Flush whatever is left once the byte stream has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest);
        let trimmed = text.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Number of buffered bytes not yet emitted
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Locate the first blank line. Returns the frame end and the index just
/// past the delimiter.
fn find_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let len = buf.len();
    for i in 0..len {
        if buf[i] != b'\n' {
            continue;
        }
        let start = if i > 0 && buf[i - 1] == b'\r' { i - 1 } else { i };
        let j = i + 1;
        if j < len && buf[j] == b'\n' {
            return Some((start, j + 1));
        }
        if j + 1 < len && buf[j] == b'\r' && buf[j + 1] == b'\n' {
            return Some((start, j + 2));
        }
    }
    None
}
