use unicode_segmentation::UnicodeSegmentation;

/// Editable text with a cursor counted in graphemes. Used for the prompt
/// box and the rename popup.
#[derive(Clone, Debug, Default)]
pub struct InputBuffer {
    pub text: String,
    pub cursor: usize,
}

impl InputBuffer {
    pub fn with_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            cursor: text.graphemes(true).count(),
        }
    }

    fn parts(&self) -> Vec<&str> {
        self.text.graphemes(true).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    pub fn insert(&mut self, s: &str) {
        let parts = self.parts();
        let idx = self.cursor.min(parts.len());
        let mut out = parts[..idx].concat();
        out.push_str(s);
        out.push_str(&parts[idx..].concat());
        self.text = out;
        self.cursor = idx + s.graphemes(true).count();
    }

    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let mut parts = self.parts();
        let idx = self.cursor.min(parts.len());
        parts.remove(idx - 1);
        self.text = parts.concat();
        self.cursor = idx - 1;
    }

    pub fn delete(&mut self) {
        let mut parts = self.parts();
        let idx = self.cursor.min(parts.len());
        if idx < parts.len() {
            parts.remove(idx);
            self.text = parts.concat();
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.parts().len());
    }

    pub fn line_start(&mut self) {
        let parts = self.parts();
        let mut i = self.cursor.min(parts.len());
        while i > 0 && parts[i - 1] != "\n" {
            i -= 1;
        }
        self.cursor = i;
    }

    pub fn line_end(&mut self) {
        let parts = self.parts();
        let mut i = self.cursor.min(parts.len());
        while i < parts.len() && parts[i] != "\n" {
            i += 1;
        }
        self.cursor = i;
    }

    fn word_start(&self) -> usize {
        let parts = self.parts();
        let mut i = self.cursor.min(parts.len());
        while i > 0 && parts[i - 1].trim().is_empty() {
            i -= 1;
        }
        while i > 0 && !parts[i - 1].trim().is_empty() {
            i -= 1;
        }
        i
    }

    pub fn word_left(&mut self) {
        self.cursor = self.word_start();
    }

    pub fn word_right(&mut self) {
        let parts = self.parts();
        let mut i = self.cursor.min(parts.len());
        while i < parts.len() && parts[i].trim().is_empty() {
            i += 1;
        }
        while i < parts.len() && !parts[i].trim().is_empty() {
            i += 1;
        }
        self.cursor = i;
    }

    pub fn delete_prev_word(&mut self) {
        let start = self.word_start();
        let mut parts = self.parts();
        let end = self.cursor.min(parts.len());
        parts.drain(start..end);
        self.text = parts.concat();
        self.cursor = start;
    }

    /// Text before the cursor, for caret placement.
    pub fn before_cursor(&self) -> String {
        self.text.graphemes(true).take(self.cursor).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editing_respects_graphemes() {
        let mut b = InputBuffer::default();
        b.insert("xin chào");
        b.insert(" 👋🏽");
        assert_eq!(b.cursor, 10);
        b.backspace();
        assert_eq!(b.text, "xin chào ");
        b.left();
        b.left();
        b.delete();
        assert_eq!(b.text, "xin chà ");
        assert_eq!(b.before_cursor(), "xin chà");
    }

    #[test]
    fn word_and_line_motions() {
        let mut b = InputBuffer::with_text("first line\nsecond word");
        b.word_left();
        assert_eq!(b.before_cursor(), "first line\nsecond ");
        b.line_start();
        assert_eq!(b.before_cursor(), "first line\n");
        b.word_right();
        assert_eq!(b.before_cursor(), "first line\nsecond");
        b.line_end();
        b.delete_prev_word();
        assert_eq!(b.text, "first line\nsecond ");
        assert_eq!(b.take(), "first line\nsecond ");
        assert!(b.is_empty());
        assert_eq!(b.cursor, 0);
    }
}
