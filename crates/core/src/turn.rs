use serde::{Deserialize, Serialize};

use crate::llm::Role;

pub const ERROR_PREFIX: &str = "(error) ";

/// A chat message as stored in a conversation. `time` is epoch millis.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub time: i64,
}

impl Message {
    pub fn user<S: Into<String>>(s: S) -> Self {
        Self {
            role: Role::User,
            text: s.into(),
            time: now_millis(),
        }
    }
    pub fn assistant<S: Into<String>>(s: S) -> Self {
        Self {
            role: Role::Assistant,
            text: s.into(),
            time: now_millis(),
        }
    }

    /// True for assistant messages that record a failed turn.
    pub fn is_error(&self) -> bool {
        self.role == Role::Assistant
            && (self.text.starts_with(ERROR_PREFIX)
                || self.text.contains(&format!("\n\n{}", ERROR_PREFIX)))
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinishReason {
    Sentinel,
    EndOfStream,
    Canceled,
    Failed(String),
}

/// What the presentation layer sees of a running turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnUpdate {
    /// The whole text accumulated so far; replaces the previous partial.
    Updated(String),
    Finalized { message: Message, reason: FinishReason },
}

/// Lifecycle of one assistant response.
///
/// `Finalized` is terminal: nothing moves a turn out of it and the message
/// it holds is never mutated again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Turn {
    #[default]
    Idle,
    Streaming {
        text: String,
        started: i64,
    },
    Finalized {
        message: Message,
        reason: FinishReason,
    },
}

impl Turn {
    pub fn start(&mut self) {
        if let Turn::Idle = self {
            *self = Turn::Streaming {
                text: String::new(),
                started: now_millis(),
            };
        }
    }

    /// Append a fragment and return the cumulative text. Empty fragments
    /// and turns that are not streaming are left alone.
    pub fn append(&mut self, fragment: &str) -> Option<&str> {
        match self {
            Turn::Streaming { text, .. } if !fragment.is_empty() => {
                text.push_str(fragment);
                Some(text.as_str())
            }
            _ => None,
        }
    }

    /// Close the turn. Returns the finished message the first time only.
    pub fn finalize(&mut self, reason: FinishReason) -> Option<Message> {
        let (text, started) = match std::mem::take(self) {
            Turn::Idle => (String::new(), now_millis()),
            Turn::Streaming { text, started } => (text, started),
            done @ Turn::Finalized { .. } => {
                *self = done;
                return None;
            }
        };
        // A failure keeps what already streamed in, with the error after it.
        let text = match &reason {
            FinishReason::Failed(err) if text.is_empty() => format!("{}{}", ERROR_PREFIX, err),
            FinishReason::Failed(err) => format!("{}\n\n{}{}", text, ERROR_PREFIX, err),
            _ => text,
        };
        let message = Message {
            role: Role::Assistant,
            text,
            time: started,
        };
        *self = Turn::Finalized {
            message: message.clone(),
            reason,
        };
        Some(message)
    }

    pub fn text(&self) -> &str {
        match self {
            Turn::Idle => "",
            Turn::Streaming { text, .. } => text,
            Turn::Finalized { message, .. } => &message.text,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Turn::Streaming { .. })
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, Turn::Finalized { .. })
    }

    pub fn reason(&self) -> Option<&FinishReason> {
        match self {
            Turn::Finalized { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_accumulates_fragments() {
        let mut t = Turn::default();
        assert_eq!(t.append("x"), None);
        t.start();
        assert_eq!(t.append("Hel"), Some("Hel"));
        assert_eq!(t.append(""), None);
        assert_eq!(t.append("lo"), Some("Hello"));
        assert!(t.is_streaming());
    }

    #[test]
    fn finalize_happens_once() {
        let mut t = Turn::default();
        t.start();
        t.append("partial");
        let m = t.finalize(FinishReason::Canceled).unwrap();
        assert_eq!(m.text, "partial");
        assert_eq!(m.role, Role::Assistant);
        assert_eq!(t.reason(), Some(&FinishReason::Canceled));

        assert!(t.finalize(FinishReason::Sentinel).is_none());
        assert_eq!(t.append("more"), None);
        t.start();
        assert!(t.is_finalized());
        assert_eq!(t.text(), "partial");
    }

    #[test]
    fn failed_turn_carries_error_prefix() {
        let mut t = Turn::default();
        t.start();
        let m = t.finalize(FinishReason::Failed("network: refused".into())).unwrap();
        assert_eq!(m.text, "(error) network: refused");
        assert!(m.is_error());
    }

    #[test]
    fn failed_turn_keeps_streamed_text() {
        let mut t = Turn::default();
        t.start();
        t.append("Hel");
        let m = t.finalize(FinishReason::Failed("network: reset".into())).unwrap();
        assert_eq!(m.text, "Hel\n\n(error) network: reset");
        assert!(m.is_error());
        assert!(!Message::assistant("Hello").is_error());
        assert!(!Message::user("(error) typed by me").is_error());
    }

    #[test]
    fn message_serializes_with_lowercase_role() {
        let m = Message {
            role: Role::User,
            text: "hi".into(),
            time: 1,
        };
        assert_eq!(
            serde_json::to_string(&m).unwrap(),
            r#"{"role":"user","text":"hi","time":1}"#
        );
    }
}
