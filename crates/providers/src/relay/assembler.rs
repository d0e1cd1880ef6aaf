//! Reassembles the relayed event stream into one growing assistant message.
//!
//! The assembler is fed raw body chunks in arrival order. Chunk boundaries
//! carry no meaning: bytes are buffered until a blank-line delimiter closes
//! a frame, so a frame (or a multi-byte character) split across reads is
//! decoded only once it is complete.

use bytes::BytesMut;
use localchat_core::frame::{self, Payload};
use localchat_core::turn::{FinishReason, Message, Turn, TurnUpdate};
use tracing::trace;

pub struct Assembler {
    buf: BytesMut,
    turn: Turn,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        let mut turn = Turn::default();
        turn.start();
        Self {
            buf: BytesMut::new(),
            turn,
        }
    }

    /// Consume one chunk and return the updates it produced, in order.
    /// Input arriving after the sentinel is ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<TurnUpdate> {
        let mut out = Vec::new();
        if self.turn.is_finalized() {
            return out;
        }
        self.buf.extend_from_slice(chunk);
        while let Some((pos, adv)) = frame::find_frame_boundary(&self.buf) {
            let raw = self.buf.split_to(pos).freeze();
            let _ = self.buf.split_to(adv);
            let Ok(text) = std::str::from_utf8(&raw) else {
                trace!(target:"providers::relay","skipping non-utf8 frame ({} bytes)", raw.len());
                continue;
            };
            match frame::parse_frame(text) {
                None => {}
                Some(Payload::Sentinel) => {
                    if let Some(message) = self.turn.finalize(FinishReason::Sentinel) {
                        out.push(TurnUpdate::Finalized {
                            message,
                            reason: FinishReason::Sentinel,
                        });
                    }
                    self.buf.clear();
                    break;
                }
                Some(Payload::Data(data)) => {
                    let Some(piece) = frame::extract_fragment(data) else {
                        trace!(target:"providers::relay","frame without text skipped");
                        continue;
                    };
                    if let Some(acc) = self.turn.append(&piece) {
                        out.push(TurnUpdate::Updated(acc.to_string()));
                    }
                }
            }
        }
        out
    }

    /// End of input without a sentinel: keep whatever arrived. A trailing
    /// frame that never got its delimiter is dropped.
    pub fn finish(&mut self) -> Option<Message> {
        self.close(FinishReason::EndOfStream)
    }

    pub fn cancel(&mut self) -> Option<Message> {
        self.close(FinishReason::Canceled)
    }

    pub fn fail(&mut self, err: impl ToString) -> Option<Message> {
        self.close(FinishReason::Failed(err.to_string()))
    }

    fn close(&mut self, reason: FinishReason) -> Option<Message> {
        self.buf.clear();
        self.turn.finalize(reason)
    }

    pub fn text(&self) -> &str {
        self.turn.text()
    }

    pub fn is_finalized(&self) -> bool {
        self.turn.is_finalized()
    }

    pub fn reason(&self) -> Option<&FinishReason> {
        self.turn.reason()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "data: {\"choices\":[{\"text\":\"Hel\"}]}\n\n\
                         data: {\"choices\":[{\"text\":\"lo\"}]}\n\n\
                         data: [DONE]\n\n";

    fn updates(us: &[TurnUpdate]) -> Vec<String> {
        us.iter()
            .filter_map(|u| match u {
                TurnUpdate::Updated(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    fn finalized(us: &[TurnUpdate]) -> Vec<Message> {
        us.iter()
            .filter_map(|u| match u {
                TurnUpdate::Finalized { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn two_fragments_then_sentinel() {
        let mut a = Assembler::new();
        let out = a.push(HELLO.as_bytes());
        assert_eq!(updates(&out), vec!["Hel", "Hello"]);
        let done = finalized(&out);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].text, "Hello");
        assert_eq!(a.reason(), Some(&FinishReason::Sentinel));
    }

    #[test]
    fn every_split_point_gives_the_same_result() {
        let bytes = HELLO.as_bytes();
        for cut in 0..=bytes.len() {
            let mut a = Assembler::new();
            let mut out = a.push(&bytes[..cut]);
            out.extend(a.push(&bytes[cut..]));
            assert_eq!(updates(&out), vec!["Hel", "Hello"], "cut at {}", cut);
            assert_eq!(finalized(&out)[0].text, "Hello", "cut at {}", cut);
        }
    }

    #[test]
    fn byte_at_a_time_with_multibyte_text() {
        let stream = "data: {\"choices\":[{\"text\":\"Chào \"}]}\n\n\
                      data: {\"choices\":[{\"text\":\"bạn 👋\"}]}\n\n\
                      data: [DONE]\n\n";
        let mut a = Assembler::new();
        let mut out = Vec::new();
        for b in stream.as_bytes() {
            out.extend(a.push(std::slice::from_ref(b)));
        }
        assert_eq!(updates(&out), vec!["Chào ", "Chào bạn 👋"]);
        assert_eq!(finalized(&out)[0].text, "Chào bạn 👋");
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let stream = ": keepalive\n\n\
                      data: {\"choices\":[{\"text\":\"a\"}]}\n\n\
                      data: not-json\n\n\
                      event: ping\n\n\
                      data: {\"usage\":{}}\n\n\
                      data: {\"choices\":[{\"text\":\"\"}]}\n\n\
                      data: {\"choices\":[{\"text\":\"b\"}]}\n\n\
                      data: [DONE]\n\n";
        let mut a = Assembler::new();
        let out = a.push(stream.as_bytes());
        assert_eq!(updates(&out), vec!["a", "ab"]);
        assert_eq!(finalized(&out)[0].text, "ab");
    }

    #[test]
    fn crlf_delimited_frames() {
        let stream = "data: {\"choices\":[{\"text\":\"x\"}]}\r\n\r\ndata: [DONE]\r\n\r\n";
        let mut a = Assembler::new();
        let out = a.push(stream.as_bytes());
        assert_eq!(updates(&out), vec!["x"]);
        assert_eq!(finalized(&out)[0].text, "x");
    }

    #[test]
    fn input_after_sentinel_is_ignored() {
        let mut a = Assembler::new();
        a.push(HELLO.as_bytes());
        let out = a.push(b"data: {\"choices\":[{\"text\":\"!\"}]}\n\n");
        assert!(out.is_empty());
        assert_eq!(a.text(), "Hello");
        assert!(a.finish().is_none());
    }

    #[test]
    fn end_of_stream_without_sentinel_keeps_text() {
        let mut a = Assembler::new();
        a.push(b"data: {\"choices\":[{\"text\":\"par\"}]}\n\ndata: {\"choices\":[{\"text\":\"tial");
        let m = a.finish().unwrap();
        assert_eq!(m.text, "par");
        assert_eq!(a.reason(), Some(&FinishReason::EndOfStream));
    }

    #[test]
    fn cancel_keeps_accumulated_text_and_stops_input() {
        let mut a = Assembler::new();
        a.push(b"data: {\"choices\":[{\"text\":\"so far\"}]}\n\n");
        let m = a.cancel().unwrap();
        assert_eq!(m.text, "so far");
        assert!(a.push(b"data: {\"choices\":[{\"text\":\"late\"}]}\n\n").is_empty());
        assert_eq!(a.text(), "so far");
    }

    #[test]
    fn fail_marks_message_as_error() {
        let mut a = Assembler::new();
        let m = a.fail("network: connection reset").unwrap();
        assert_eq!(m.text, "(error) network: connection reset");
    }

    #[test]
    fn fail_after_fragments_keeps_them() {
        let mut a = Assembler::new();
        a.push(b"data: {\"choices\":[{\"text\":\"Hel\"}]}\n\n");
        let m = a.fail("network: connection reset").unwrap();
        assert_eq!(m.text, "Hel\n\n(error) network: connection reset");
        assert!(a.push(b"data: {\"choices\":[{\"text\":\"lo\"}]}\n\n").is_empty());
    }
}
