//! Event-stream framing shared by the relay and the stream assembler.
//!
//! A frame is one blank-line-delimited unit of a `text/event-stream` body.
//! Only frames starting with `data:` carry a payload; the payload is either
//! a JSON completion chunk or the `[DONE]` sentinel.

pub const EVENT_STREAM: &str = "text/event-stream";
pub const DATA_PREFIX: &str = "data:";
pub const SENTINEL: &str = "[DONE]";
pub const FRAME_DELIMITER: &[u8] = b"\n\n";
pub const FRAME_DELIMITER_CRLF: &[u8] = b"\r\n\r\n";
pub const SENTINEL_FRAME: &str = "data: [DONE]\n\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Payload<'a> {
    Sentinel,
    Data(&'a str),
}

/// Classify one complete frame. Frames without the data prefix are
/// keepalives or comments and yield `None`.
pub fn parse_frame(frame: &str) -> Option<Payload<'_>> {
    let rest = frame.strip_prefix(DATA_PREFIX)?;
    let data = rest.trim();
    if data == SENTINEL {
        Some(Payload::Sentinel)
    } else {
        Some(Payload::Data(data))
    }
}

/// Pull the incremental text out of a completion chunk.
///
/// Completions chunks carry it in `choices[0].text`; chat-completions
/// chunks in `choices[0].delta.content`. Anything else is not text.
pub fn extract_fragment(data: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(data).ok()?;
    let choice = &v["choices"][0];
    choice["text"]
        .as_str()
        .or_else(|| choice["delta"]["content"].as_str())
        .map(str::to_string)
}

pub fn data_frame(payload: &serde_json::Value) -> String {
    format!("data: {}\n\n", payload)
}

/// Position and length of the earliest frame delimiter in `buf`.
pub fn find_frame_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = twoway::find_bytes(buf, FRAME_DELIMITER).map(|p| (p, FRAME_DELIMITER.len()));
    let crlf =
        twoway::find_bytes(buf, FRAME_DELIMITER_CRLF).map(|p| (p, FRAME_DELIMITER_CRLF.len()));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if b.0 <= a.0 { b } else { a }),
        (a, b) => a.or(b),
    }
}
