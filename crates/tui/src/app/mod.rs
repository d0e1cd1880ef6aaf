use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use localchat_core::llm::{ChatClient as _, Role};
use localchat_core::store::{ConversationStore, MemoryPersistence, Persistence};
use localchat_core::turn::{now_millis, FinishReason, Message, Turn, TurnUpdate};
use providers::relay::{config::RelayConfig, RelayClient};
use ratatui::layout::Rect;
use std::sync::{mpsc, Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::persist;

pub mod chat;
pub mod conversations;
pub mod input;

pub use chat::WrappedMsg;
pub use input::InputBuffer;

pub type Store = ConversationStore<Box<dyn Persistence>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Focus {
    Input,
    Sidebar,
}

pub struct RenameState {
    pub id: String,
    pub buffer: InputBuffer,
}

#[derive(Clone)]
pub enum ConfirmAction {
    DeleteConversation(String),
}

/// The one turn in flight. Updates arrive from the streaming task over
/// `rx`; the partial text is display-only until the turn finalizes.
pub struct ActiveTurn {
    pub conversation_id: String,
    pub partial: String,
    started: i64,
    cancel: CancellationToken,
    rx: mpsc::Receiver<TurnUpdate>,
}

pub struct App {
    pub store: Store,
    pub active: Option<String>,
    pub input: InputBuffer,
    pub turn: Option<ActiveTurn>,
    client: Option<Arc<RelayClient>>,
    runtime: Option<tokio::runtime::Handle>,
    pub relay_url: String,
    pub model: String,
    pub user_name: Option<String>,
    pub notice: Option<String>,
    pub should_quit: bool,
    pub show_sidebar: bool,
    pub show_help: bool,
    pub focus: Focus,
    pub rename: Option<RenameState>,
    pub confirm: Option<ConfirmAction>,
    pub chat_area: Option<Rect>,
    pub sidebar_area: Option<Rect>,
    pub sidebar_scroll: u16,
    pub chat_scroll: u16,
    pub chat_viewport: u16,
    pub chat_wrap_width: u16,
    pub chat_cache: Vec<WrappedMsg>,
    chat_cache_key: Option<(String, usize)>,
    pub chat_tail: Option<WrappedMsg>,
    pub chat_total_lines: usize,
    pub input_visible_lines: u16,
    pub input_max_lines: u16,
    pub dirty: bool,
    save_ui: bool,
}

impl App {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        let (client, cfg, notice) = match RelayConfig::from_env_and_file()
            .and_then(|cfg| Ok((RelayClient::new(cfg.clone())?, cfg)))
        {
            Ok((c, cfg)) => (Some(Arc::new(c)), cfg, None),
            Err(e) => {
                error!(target: "tui", "relay client unavailable: {}", e);
                (None, RelayConfig::default(), Some(format!("relay client: {}", e)))
            }
        };
        let persistence: Box<dyn Persistence> = match persist::JsonFilePersistence::default_location() {
            Some(p) => Box::new(p),
            None => {
                warn!(target: "tui", "no data directory; conversations will not be saved");
                Box::new(MemoryPersistence::default())
            }
        };
        let mut app = Self::with_parts(ConversationStore::load(persistence), client, Some(runtime), cfg);
        app.notice = notice;
        app.save_ui = true;
        match persist::load_state() {
            Ok(Some(saved)) => {
                if saved
                    .active_conversation
                    .as_deref()
                    .is_some_and(|id| app.store.get(id).is_some())
                {
                    app.active = saved.active_conversation;
                }
                app.show_sidebar = saved.show_sidebar;
                if saved.user_name.is_some() {
                    app.user_name = saved.user_name;
                }
                if let Some(m) = saved.model {
                    app.model = m;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(target: "tui", "ignoring saved ui state: {}", e),
        }
        app
    }

    pub fn with_parts(
        store: Store,
        client: Option<Arc<RelayClient>>,
        runtime: Option<tokio::runtime::Handle>,
        cfg: RelayConfig,
    ) -> Self {
        let mut s = Self {
            store,
            active: None,
            input: InputBuffer::default(),
            turn: None,
            client,
            runtime,
            relay_url: cfg.base_url.clone(),
            model: cfg.model.clone(),
            user_name: cfg.user_name.clone(),
            notice: None,
            should_quit: false,
            show_sidebar: true,
            show_help: false,
            focus: Focus::Input,
            rename: None,
            confirm: None,
            chat_area: None,
            sidebar_area: None,
            sidebar_scroll: 0,
            chat_scroll: 0,
            chat_viewport: 0,
            chat_wrap_width: 0,
            chat_cache: Vec::new(),
            chat_cache_key: None,
            chat_tail: None,
            chat_total_lines: 0,
            input_visible_lines: 1,
            input_max_lines: 6,
            dirty: true,
            save_ui: false,
        };
        s.active = s.store.list().first().map(|c| c.id.clone());
        if s.active.is_none() {
            s.new_conversation();
        }
        s
    }

    pub fn is_streaming(&self) -> bool {
        self.turn.is_some()
    }

    // Returns true if a supported slash command was handled
    fn try_handle_slash_command(&mut self, text: &str) -> bool {
        let Some(rest) = text.trim().strip_prefix('/') else {
            return false;
        };
        let mut parts = rest.splitn(2, char::is_whitespace);
        let cmd = parts.next().unwrap_or("").to_lowercase();
        let arg = parts.next().unwrap_or("").trim();
        match cmd.as_str() {
            "model" if arg.is_empty() => {
                self.notice = Some(format!("usage: /model <name> (current: {})", self.model));
                return true;
            }
            "model" => {
                self.model = arg.to_string();
                self.notice = Some(format!("model set to '{}'", self.model));
            }
            "name" => {
                self.user_name = (!arg.is_empty()).then(|| arg.to_string());
                self.notice = Some(match &self.user_name {
                    Some(n) => format!("display name set to '{}'", n),
                    None => "display name cleared".to_string(),
                });
            }
            _ => {
                self.notice = Some(format!("unknown command: /{}", cmd));
                return true;
            }
        }
        self.save_ui_state();
        true
    }

    pub fn submit(&mut self) {
        let text = self.input.text.trim().to_string();
        if text.is_empty() {
            return;
        }
        if self.is_streaming() {
            self.notice = Some("a reply is still streaming; Ctrl+C cancels it".to_string());
            return;
        }
        if self.try_handle_slash_command(&text) {
            self.input.take();
            self.dirty = true;
            return;
        }
        self.input.take();

        let conversation_id = match self.active.clone() {
            Some(id) => id,
            None => self.new_conversation(),
        };
        self.push_message(&conversation_id, Message::user(text.clone()));
        self.chat_scroll = 0;
        self.dirty = true;

        let (Some(client), Some(runtime)) = (self.client.clone(), self.runtime.clone()) else {
            let reason = self
                .notice
                .clone()
                .unwrap_or_else(|| "relay client unavailable".to_string());
            let mut turn = Turn::default();
            if let Some(m) = turn.finalize(FinishReason::Failed(reason)) {
                self.push_message(&conversation_id, m);
            }
            return;
        };

        let mut req = client
            .config()
            .chat_request(&text)
            .with_field("model", serde_json::json!(self.model));
        req.user_name = self.user_name.clone();
        info!(target: "tui", "submit: model={} input_len={} chars", self.model, text.len());

        let (tx, rx) = mpsc::channel::<TurnUpdate>();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        runtime.spawn(async move {
            let mut updates = client.stream_turn(req, token);
            while let Some(u) = updates.next().await {
                if tx.send(u).is_err() {
                    break;
                }
            }
        });
        self.turn = Some(ActiveTurn {
            conversation_id,
            partial: String::new(),
            started: now_millis(),
            cancel,
            rx,
        });
    }

    /// Stop the running turn now, keeping what has arrived so far.
    pub fn cancel_turn(&mut self) {
        let Some(turn) = self.turn.take() else {
            return;
        };
        turn.cancel.cancel();
        info!(target: "tui", "turn canceled with {} chars", turn.partial.len());
        let message = Message {
            role: Role::Assistant,
            text: turn.partial,
            time: turn.started,
        };
        self.push_message(&turn.conversation_id, message);
        self.dirty = true;
    }

    fn push_message(&mut self, conversation_id: &str, m: Message) {
        if let Err(e) = self.store.apply_update(conversation_id, |c| c.push_message(m)) {
            error!(target: "tui", "save conversations: {}", e);
            self.notice = Some(format!("could not save conversations: {}", e));
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        self.dirty = true;
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if self.show_help {
            self.show_help = false;
            return;
        }

        if let Some(r) = &mut self.rename {
            match key.code {
                KeyCode::Esc => self.rename = None,
                KeyCode::Enter => {
                    if let Some(r) = self.rename.take() {
                        self.commit_rename(&r.id, &r.buffer.text);
                    }
                }
                _ => edit(&mut r.buffer, key),
            }
            return;
        }

        if let Some(action) = self.confirm.clone() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    match action {
                        ConfirmAction::DeleteConversation(id) => self.delete_conversation(&id),
                    }
                    self.confirm = None;
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => self.confirm = None,
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('c') if ctrl => {
                // Ctrl+C: cancel active turn if any; otherwise quit
                if self.is_streaming() {
                    self.cancel_turn();
                } else {
                    self.should_quit = true;
                }
                return;
            }
            KeyCode::Esc => {
                self.should_quit = true;
                return;
            }
            KeyCode::Char('n') if ctrl => {
                self.new_conversation();
                return;
            }
            KeyCode::F(1) => {
                self.show_help = true;
                return;
            }
            KeyCode::F(2) => {
                self.show_sidebar = !self.show_sidebar;
                if !self.show_sidebar {
                    self.focus = Focus::Input;
                }
                self.save_ui_state();
                return;
            }
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Input if self.show_sidebar => Focus::Sidebar,
                    _ => Focus::Input,
                };
                return;
            }
            KeyCode::PageUp => {
                self.scroll_chat_up(self.chat_viewport.max(1));
                return;
            }
            KeyCode::PageDown => {
                self.scroll_chat_down(self.chat_viewport.max(1));
                return;
            }
            KeyCode::Home if ctrl => {
                self.chat_scroll = u16::MAX;
                return;
            }
            KeyCode::End if ctrl => {
                self.chat_scroll = 0;
                return;
            }
            _ => {}
        }

        match self.focus {
            Focus::Sidebar => self.on_sidebar_key(key),
            Focus::Input => match key.code {
                KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => {
                    self.input.insert("\n");
                }
                KeyCode::Enter => self.submit(),
                KeyCode::Char('?') if self.input.is_empty() => self.show_help = true,
                _ => edit(&mut self.input, key),
            },
        }
    }

    fn on_sidebar_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up => self.select_prev(),
            KeyCode::Down => self.select_next(),
            KeyCode::Enter => self.focus = Focus::Input,
            KeyCode::Char('n') => {
                self.new_conversation();
            }
            KeyCode::Char('r') => self.start_rename(),
            KeyCode::Char('d') | KeyCode::Delete => {
                if let Some(id) = self.active.clone() {
                    self.confirm = Some(ConfirmAction::DeleteConversation(id));
                }
            }
            _ => {}
        }
    }

    pub fn on_paste(&mut self, s: &str) {
        match &mut self.rename {
            Some(r) => r.buffer.insert(&s.replace(['\r', '\n'], " ")),
            None => self.input.insert(&s.replace("\r\n", "\n")),
        }
        self.dirty = true;
    }

    pub fn scroll_chat_up(&mut self, n: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(n);
        self.dirty = true;
    }

    pub fn scroll_chat_down(&mut self, n: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(n);
        self.dirty = true;
    }

    pub fn save_ui_state(&self) {
        if !self.save_ui {
            return;
        }
        if let Err(e) = persist::save_state(self) {
            warn!(target: "tui", "save ui state: {}", e);
        }
    }

    /// Apply whatever the streaming task has produced since the last tick.
    pub fn on_tick(&mut self) {
        let Some(turn) = &mut self.turn else {
            return;
        };
        let mut finished: Option<Message> = None;
        for _ in 0..64 {
            match turn.rx.try_recv() {
                Ok(TurnUpdate::Updated(text)) => {
                    turn.partial = text;
                    self.dirty = true;
                }
                Ok(TurnUpdate::Finalized { message, reason }) => {
                    info!(target: "tui", "turn finished: {:?} ({} chars)", reason, message.text.len());
                    finished = Some(message);
                    break;
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    warn!(target: "tui", "stream task ended without finalizing");
                    finished = Some(Message {
                        role: Role::Assistant,
                        text: std::mem::take(&mut turn.partial),
                        time: turn.started,
                    });
                    break;
                }
            }
        }
        if let Some(message) = finished {
            if let Some(turn) = self.turn.take() {
                self.push_message(&turn.conversation_id, message);
            }
            self.dirty = true;
        }
    }
}

fn edit(buf: &mut InputBuffer, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('a') if ctrl => buf.line_start(),
        KeyCode::Char('e') if ctrl => buf.line_end(),
        KeyCode::Char('w') if ctrl => buf.delete_prev_word(),
        KeyCode::Char(_) if ctrl => {}
        KeyCode::Char(ch) => {
            let mut b = [0u8; 4];
            buf.insert(ch.encode_utf8(&mut b));
        }
        KeyCode::Backspace => buf.backspace(),
        KeyCode::Delete => buf.delete(),
        KeyCode::Left if ctrl => buf.word_left(),
        KeyCode::Right if ctrl => buf.word_right(),
        KeyCode::Left => buf.left(),
        KeyCode::Right => buf.right(),
        KeyCode::Home => buf.line_start(),
        KeyCode::End => buf.line_end(),
        _ => {}
    }
}
