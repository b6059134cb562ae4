//! Incremental decoder for the `text/event-stream` bodies Dify streams back.

/// Buffers raw body bytes and yields the `data:` payload of every complete
/// frame. Frames are separated by a blank line; carriage returns are dropped
/// so both `\n\n` and `\r\n\r\n` separators work.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a body chunk, returning the payloads of all frames it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(idx) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let frame: Vec<u8> = self.buf.drain(..idx + 2).collect();
            if let Some(data) = frame_data(&String::from_utf8_lossy(&frame)) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flushes a trailing frame that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        frame_data(&String::from_utf8_lossy(&rest))
    }
}

/// Joins the `data:` lines of one frame. Comment lines (`:`) and other
/// fields are ignored; Dify carries the event name inside the JSON payload.
fn frame_data(frame: &str) -> Option<String> {
    let lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
