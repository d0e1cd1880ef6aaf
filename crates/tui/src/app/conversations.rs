use localchat_core::store::Conversation;
use tracing::error;

use super::{App, InputBuffer, RenameState};

impl App {
    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.as_deref().and_then(|id| self.store.get(id))
    }

    fn active_index(&self) -> Option<usize> {
        self.active.as_deref().and_then(|id| self.store.position(id))
    }

    pub fn sidebar_inner_height(&self) -> u16 {
        self.sidebar_area
            .map(|a| a.height.saturating_sub(2))
            .unwrap_or(0)
    }

    pub fn sidebar_max_scroll(&self) -> u16 {
        let h = self.sidebar_inner_height() as usize;
        if h == 0 {
            0
        } else {
            self.store.list().len().saturating_sub(h) as u16
        }
    }

    fn select_index(&mut self, idx: usize) {
        let Some(conv) = self.store.list().get(idx) else {
            return;
        };
        self.active = Some(conv.id.clone());
        self.chat_scroll = 0;
        self.ensure_sidebar_visible();
        self.save_ui_state();
    }

    pub fn select_prev(&mut self) {
        if let Some(i) = self.active_index() {
            self.select_index(i.saturating_sub(1));
        }
    }

    pub fn select_next(&mut self) {
        let next = self.active_index().map_or(0, |i| i + 1);
        self.select_index(next);
    }

    pub fn select_row(&mut self, row: usize) {
        self.select_index(self.sidebar_scroll as usize + row);
    }

    pub fn ensure_sidebar_visible(&mut self) {
        let h = self.sidebar_inner_height() as usize;
        let Some(current) = self.active_index() else {
            return;
        };
        if h == 0 {
            return;
        }
        let start = self.sidebar_scroll as usize;
        if current < start {
            self.sidebar_scroll = current as u16;
        } else if current >= start + h {
            self.sidebar_scroll = (current + 1 - h) as u16;
        }
        self.sidebar_scroll = self.sidebar_scroll.min(self.sidebar_max_scroll());
    }

    /// Create an empty conversation at the top of the list and switch to it.
    pub fn new_conversation(&mut self) -> String {
        let id = match self.store.create() {
            Ok(id) => id,
            Err(e) => {
                error!(target: "tui", "save conversations: {}", e);
                self.notice = Some(format!("could not save conversations: {}", e));
                self.store.list().first().map(|c| c.id.clone()).unwrap_or_default()
            }
        };
        self.active = Some(id.clone());
        self.sidebar_scroll = 0;
        self.chat_scroll = 0;
        self.save_ui_state();
        id
    }

    pub fn start_rename(&mut self) {
        if let Some(conv) = self.active_conversation() {
            self.rename = Some(RenameState {
                id: conv.id.clone(),
                buffer: InputBuffer::with_text(&conv.title),
            });
        }
    }

    pub fn commit_rename(&mut self, id: &str, title: &str) {
        if title.trim().is_empty() {
            return;
        }
        if let Err(e) = self.store.rename(id, title) {
            error!(target: "tui", "save conversations: {}", e);
            self.notice = Some(format!("could not save conversations: {}", e));
        }
    }

    /// Remove a conversation. A reply still streaming into it is canceled
    /// first; the list is never left empty.
    pub fn delete_conversation(&mut self, id: &str) {
        if self
            .turn
            .as_ref()
            .is_some_and(|t| t.conversation_id == id)
        {
            self.cancel_turn();
        }
        let idx = self.store.position(id);
        if let Err(e) = self.store.delete(id) {
            error!(target: "tui", "save conversations: {}", e);
            self.notice = Some(format!("could not save conversations: {}", e));
        }
        if self.store.list().is_empty() {
            self.new_conversation();
            return;
        }
        if self.active.as_deref() == Some(id) {
            let next = idx.unwrap_or(0).min(self.store.list().len() - 1);
            self.select_index(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{App, ConfirmAction, Store};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use localchat_core::store::{ConversationStore, MemoryPersistence, Persistence};
    use providers::relay::config::RelayConfig;

    fn app() -> App {
        let persistence: Box<dyn Persistence> = Box::new(MemoryPersistence::default());
        let store: Store = ConversationStore::load(persistence);
        App::with_parts(store, None, None, RelayConfig::default())
    }

    fn press(app: &mut App, code: KeyCode) {
        app.on_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn sidebar_navigation_moves_the_active_conversation() {
        let mut a = app();
        let oldest = a.active.clone().unwrap();
        let newest = a.new_conversation();
        press(&mut a, KeyCode::Tab);
        press(&mut a, KeyCode::Down);
        assert_eq!(a.active.as_deref(), Some(oldest.as_str()));
        press(&mut a, KeyCode::Down);
        assert_eq!(a.active.as_deref(), Some(oldest.as_str()));
        press(&mut a, KeyCode::Up);
        assert_eq!(a.active.as_deref(), Some(newest.as_str()));
    }

    #[test]
    fn delete_asks_first_and_keeps_one_conversation() {
        let mut a = app();
        let only = a.active.clone().unwrap();
        press(&mut a, KeyCode::Tab);
        press(&mut a, KeyCode::Char('d'));
        assert!(matches!(a.confirm, Some(ConfirmAction::DeleteConversation(ref id)) if *id == only));
        press(&mut a, KeyCode::Char('n'));
        assert_eq!(a.store.list().len(), 1);

        press(&mut a, KeyCode::Char('d'));
        press(&mut a, KeyCode::Char('y'));
        assert_eq!(a.store.list().len(), 1);
        assert_ne!(a.active.as_deref(), Some(only.as_str()));
        assert!(a.store.get(&only).is_none());
    }

    #[test]
    fn rename_through_the_popup() {
        let mut a = app();
        let id = a.active.clone().unwrap();
        press(&mut a, KeyCode::Tab);
        press(&mut a, KeyCode::Char('r'));
        assert!(a.rename.is_some());
        for _ in 0.."New chat".len() {
            press(&mut a, KeyCode::Backspace);
        }
        for ch in "Recipes".chars() {
            press(&mut a, KeyCode::Char(ch));
        }
        press(&mut a, KeyCode::Enter);
        assert!(a.rename.is_none());
        assert_eq!(a.store.get(&id).unwrap().title, "Recipes");
    }
}
