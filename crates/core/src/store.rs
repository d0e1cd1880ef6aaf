use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::llm::Role;
use crate::turn::Message;

pub const DEFAULT_TITLE: &str = "New chat";
const AUTO_TITLE_CHARS: usize = 40;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
        }
    }

    /// Append a message. The first user message names an untitled chat.
    pub fn push_message(&mut self, m: Message) {
        if m.role == Role::User && self.title == DEFAULT_TITLE {
            let has_user = self.messages.iter().any(|x| x.role == Role::User);
            let title: String = m.text.trim().chars().take(AUTO_TITLE_CHARS).collect();
            if !has_user && !title.is_empty() {
                self.title = title;
            }
        }
        self.messages.push(m);
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where the conversation list lives between runs.
pub trait Persistence: Send + Sync {
    fn load(&self) -> Result<Vec<Conversation>, StoreError>;
    fn save(&self, conversations: &[Conversation]) -> Result<(), StoreError>;
}

impl<P: Persistence + ?Sized> Persistence for Box<P> {
    fn load(&self) -> Result<Vec<Conversation>, StoreError> {
        (**self).load()
    }

    fn save(&self, conversations: &[Conversation]) -> Result<(), StoreError> {
        (**self).save(conversations)
    }
}

#[derive(Default)]
pub struct MemoryPersistence {
    saved: Mutex<Vec<Conversation>>,
    writes: Mutex<usize>,
}

impl MemoryPersistence {
    pub fn with(conversations: Vec<Conversation>) -> Self {
        Self {
            saved: Mutex::new(conversations),
            writes: Mutex::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<Conversation> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> Result<Vec<Conversation>, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, conversations: &[Conversation]) -> Result<(), StoreError> {
        if let Ok(mut s) = self.saved.lock() {
            *s = conversations.to_vec();
        }
        if let Ok(mut w) = self.writes.lock() {
            *w += 1;
        }
        Ok(())
    }
}

/// The ordered conversation list, newest first. Every mutation is
/// written through to the persistence backend.
pub struct ConversationStore<P: Persistence> {
    conversations: Vec<Conversation>,
    persistence: P,
}

impl<P: Persistence> ConversationStore<P> {
    /// Read the saved list once. Unreadable state starts an empty list.
    pub fn load(persistence: P) -> Self {
        let conversations = match persistence.load() {
            Ok(c) => c,
            Err(e) => {
                warn!(target: "store", "failed to load saved conversations: {}", e);
                Vec::new()
            }
        };
        Self {
            conversations,
            persistence,
        }
    }

    pub fn save(&self) -> Result<(), StoreError> {
        self.persistence.save(&self.conversations)
    }

    pub fn list(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.conversations.iter().position(|c| c.id == id)
    }

    pub fn create(&mut self) -> Result<String, StoreError> {
        let conv = Conversation::new();
        let id = conv.id.clone();
        self.conversations.insert(0, conv);
        self.save()?;
        Ok(id)
    }

    pub fn delete(&mut self, id: &str) -> Result<bool, StoreError> {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn rename(&mut self, id: &str, title: &str) -> Result<bool, StoreError> {
        let title = title.trim().to_string();
        self.apply_update(id, move |c| c.title = title)
    }

    /// Mutate one conversation and persist. Returns false when `id` is unknown.
    pub fn apply_update<F>(&mut self, id: &str, f: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Conversation),
    {
        let Some(conv) = self.conversations.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        f(conv);
        self.save()?;
        Ok(true)
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPersistence;

    impl Persistence for BrokenPersistence {
        fn load(&self) -> Result<Vec<Conversation>, StoreError> {
            Err(serde_json::from_str::<Vec<Conversation>>("{").unwrap_err().into())
        }
        fn save(&self, _: &[Conversation]) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn create_puts_newest_first_and_persists() {
        let mut store = ConversationStore::load(MemoryPersistence::default());
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        assert_eq!(store.list()[0].id, b);
        assert_eq!(store.list()[1].id, a);
        assert_eq!(store.persistence().writes(), 2);
        assert_eq!(store.persistence().snapshot().len(), 2);
    }

    #[test]
    fn apply_update_touches_only_the_target() {
        let mut store = ConversationStore::load(MemoryPersistence::default());
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        assert!(store
            .apply_update(&a, |c| c.push_message(Message::user("hello there")))
            .unwrap());
        assert_eq!(store.get(&a).unwrap().messages.len(), 1);
        assert!(store.get(&b).unwrap().messages.is_empty());
        assert!(!store.apply_update("missing", |_| {}).unwrap());
    }

    #[test]
    fn first_user_message_titles_the_chat() {
        let mut c = Conversation::new();
        c.push_message(Message::assistant("welcome"));
        assert_eq!(c.title, DEFAULT_TITLE);
        c.push_message(Message::user("  What is the capital of France?  "));
        assert_eq!(c.title, "What is the capital of France?");
        c.push_message(Message::user("second question"));
        assert_eq!(c.title, "What is the capital of France?");
    }

    #[test]
    fn rename_and_delete() {
        let mut store = ConversationStore::load(MemoryPersistence::default());
        let a = store.create().unwrap();
        assert!(store.rename(&a, " Trip plans ").unwrap());
        assert_eq!(store.get(&a).unwrap().title, "Trip plans");
        assert!(store.delete(&a).unwrap());
        assert!(!store.delete(&a).unwrap());
        assert!(store.list().is_empty());
    }

    #[test]
    fn load_reads_existing_and_tolerates_corruption() {
        let existing = vec![Conversation::new()];
        let store = ConversationStore::load(MemoryPersistence::with(existing.clone()));
        assert_eq!(store.list(), existing.as_slice());

        let store = ConversationStore::load(BrokenPersistence);
        assert!(store.list().is_empty());
    }
}
