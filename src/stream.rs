//! Byte stream -> lines. Input segments carry no line alignment guarantee, so a
//! trailing partial line is kept until the next segment (or the end of input).

/// Incremental line splitter over arbitrary byte segments
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one segment, get every line it completes. `\r\n` endings are stripped.
    pub fn push(&mut self, segment: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = segment;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            lines.push(decode(&self.partial));
            self.partial.clear();
            rest = &rest[pos + 1..];
        }
        self.partial.extend_from_slice(rest);
        lines
    }

    /// End of input: the unterminated last line, if any
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = decode(&self.partial);
        self.partial.clear();
        Some(line)
    }

    /// Bytes held for an incomplete line
    pub fn pending_len(&self) -> usize {
        self.partial.len()
    }
}

fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
