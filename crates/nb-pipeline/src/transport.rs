/// Prefix of every relevant line in the agent run stream.
pub(crate) const DATA_PREFIX: &str = "data:";

/// Splits an event-stream body into lines as byte chunks arrive.
///
/// Chunks may end anywhere, including inside a multi-byte UTF-8 sequence;
/// bytes are only decoded once a full line is buffered.
#[derive(Default, Debug)]
pub(crate) struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=idx).collect();
            lines.push(decode_line(&line_bytes[..idx]));
        }
        lines
    }

    /// Returns the trailing unterminated line, if any, at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Returns the payload of a `data:` line, or `None` for any other line.
pub(crate) fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX).map(str::trim)
}
