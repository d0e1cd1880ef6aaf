// Centralized UI strings and labels. ASCII-friendly by default.

use unicode_width::UnicodeWidthStr;

// User messages: '|' prefix (render color applied in UI)
pub const PREFIX_USER: &str = "| ";
pub const PREFIX_ASSISTANT: &str = "> ";

pub const INPUT_HINT: &str = "Type message, Enter to send / Shift+Enter for newline";

// UI block titles (keep surrounding spaces for visual padding)
pub const TITLE_CONVERSATIONS: &str = " Conversations ";
pub const TITLE_CHAT: &str = " Chat ";
pub const TITLE_INPUT: &str = " Input ";
pub const TITLE_HELP: &str = " Help / Shortcuts ";
pub const TITLE_RENAME: &str = " Rename Conversation ";
pub const TITLE_CONFIRM: &str = " Confirm ";

pub const EMPTY_CHAT: &str = "No messages yet. Say hello.";

pub fn confirm_delete_message(title: &str) -> String {
    format!(
        "Delete conversation \"{}\"? Press Y to confirm, N/Esc to cancel.",
        title
    )
}

pub fn build_stick_label(scroll: u16) -> String {
    if scroll == 0 {
        "Bottom".to_string()
    } else {
        format!("+{} lines", scroll)
    }
}

/// Status bar text, dropping trailing segments that do not fit.
/// `notice` comes right after the connection info so errors stay visible.
pub fn build_status_line(
    relay: &str,
    model: &str,
    user_name: Option<&str>,
    streaming: bool,
    stick: &str,
    notice: Option<&str>,
    max_width: u16,
) -> String {
    let mut segments: Vec<String> = Vec::new();
    segments.push(format!("[{}][{}]", relay, model));
    if streaming {
        segments.push("Streaming... Ctrl+C: stop".to_string());
    }
    if let Some(n) = notice {
        segments.push(n.to_string());
    }
    segments.push(format!("Name:{}", user_name.unwrap_or("-")));
    segments.push(format!("[{}]", stick));
    let hints: [&str; 4] = [
        "Enter: send; Shift+Enter: newline",
        "F2: conversations",
        "Ctrl+N: new",
        "F1: help",
    ];
    for h in hints {
        segments.push(h.to_string());
    }

    let sep = "  |  ";
    let mut out = String::new();
    let mut used = 0usize;
    for (i, seg) in segments.iter().enumerate() {
        let segw = UnicodeWidthStr::width(seg.as_str());
        let addw = segw + if i == 0 { 0 } else { UnicodeWidthStr::width(sep) };
        if used + addw > max_width as usize {
            break;
        }
        if i > 0 {
            out.push_str(sep);
            used += UnicodeWidthStr::width(sep);
        }
        out.push_str(seg);
        used += segw;
    }
    out
}

pub fn help_lines_ascii() -> &'static [&'static str] {
    &[
        "Basic",
        "  Enter: Send    Shift+Enter: Newline    Esc: Quit",
        "  Ctrl+C: Stop the streaming reply (quits when idle)",
        "Input Editing",
        "  Arrow: Move cursor    Backspace/Delete: Delete prev/next char",
        "  Home/End or Ctrl+A/E: Line start/end",
        "  Ctrl+Arrow: Word move    Ctrl+W: Delete prev word",
        "Chat Scrolling",
        "  Mouse wheel: Scroll    PgUp/PgDn: Page    Ctrl+Home/End: Top/bottom",
        "Conversations",
        "  F2: Show/hide list    Tab: Switch focus    Ctrl+N: New conversation",
        "  List focus: Up/Down select / N new / R rename / D or Delete remove",
        "Commands",
        "  /model <name>: Model for new requests",
        "  /name <name>: Display name sent to the relay (empty clears)",
        "Help",
        "  ?: Open this panel (empty input)    F1: Open this panel",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_keeps_leading_segments_when_narrow() {
        let s = build_status_line("localhost:8000", "llama3.2:1b", None, true, "Bottom", None, 40);
        assert_eq!(s, "[localhost:8000][llama3.2:1b]");
        let wide = build_status_line(
            "localhost:8000",
            "llama3.2:1b",
            Some("Alice"),
            false,
            "Bottom",
            Some("model set"),
            200,
        );
        assert!(wide.contains("model set  |  Name:Alice"));
        assert!(!wide.contains("Streaming"));
    }
}
