use localchat_core::llm::Role;
use localchat_core::turn::Message;
use textwrap::{wrap, Options};
use unicode_width::UnicodeWidthStr;

use crate::strings::{PREFIX_ASSISTANT, PREFIX_USER};

use super::App;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsgKind {
    User,
    Assistant,
    Streaming,
    Error,
}

#[derive(Clone, Debug)]
pub struct WrappedMsg {
    pub kind: MsgKind,
    pub prefix_width: usize,
    pub lines: Vec<String>,
}

impl App {
    /// Re-wrap the active conversation if the width or message count moved.
    /// Finalized messages never change, so the count is a sound cache key.
    pub fn ensure_chat_wrapped(&mut self, width: u16) {
        let width = width.max(1);
        let key = self
            .active_conversation()
            .map(|c| (c.id.clone(), c.messages.len()));
        if self.chat_wrap_width != width || self.chat_cache_key != key {
            self.chat_cache = self
                .active_conversation()
                .map(|c| c.messages.iter().map(|m| wrap_message(m, width)).collect())
                .unwrap_or_default();
            self.chat_cache_key = key;
            self.chat_wrap_width = width;
        }
        self.chat_tail = self
            .turn
            .as_ref()
            .filter(|t| self.active.as_deref() == Some(t.conversation_id.as_str()))
            .map(|t| wrap_text(MsgKind::Streaming, PREFIX_ASSISTANT, &t.partial, width));
        self.chat_total_lines = self.chat_cache.iter().map(|w| w.lines.len()).sum::<usize>()
            + self.chat_tail.as_ref().map_or(0, |w| w.lines.len());
    }

    /// First visible line for a viewport of `height`, honoring the scroll
    /// offset (counted up from the bottom). Clamps `chat_scroll`.
    pub fn chat_start_line(&mut self, height: u16) -> usize {
        let max_scroll = self.chat_total_lines.saturating_sub(height as usize);
        if self.chat_scroll as usize > max_scroll {
            self.chat_scroll = max_scroll as u16;
        }
        max_scroll - self.chat_scroll as usize
    }

    pub fn chat_blocks(&self) -> impl Iterator<Item = &WrappedMsg> {
        self.chat_cache.iter().chain(self.chat_tail.iter())
    }
}

fn wrap_message(m: &Message, width: u16) -> WrappedMsg {
    let (kind, prefix) = match m.role {
        Role::User => (MsgKind::User, PREFIX_USER),
        Role::Assistant if m.is_error() => (MsgKind::Error, PREFIX_ASSISTANT),
        Role::Assistant => (MsgKind::Assistant, PREFIX_ASSISTANT),
    };
    wrap_text(kind, prefix, &m.text, width)
}

fn wrap_text(kind: MsgKind, prefix: &str, text: &str, width: u16) -> WrappedMsg {
    let full = format!("{}{}", prefix, text);
    let indent = " ".repeat(UnicodeWidthStr::width(prefix));
    let opts = Options::new(width as usize).subsequent_indent(&indent);
    let lines = wrap(&full, opts)
        .into_iter()
        .map(|c| c.into_owned())
        .collect::<Vec<_>>();
    WrappedMsg {
        kind,
        prefix_width: prefix.len(),
        lines,
    }
}
