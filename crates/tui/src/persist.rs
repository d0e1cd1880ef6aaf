use std::{fs, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;
use localchat_core::store::{Conversation, Persistence, StoreError};
use serde::{Deserialize, Serialize};

use crate::app::App;

const CONVERSATIONS_FILE: &str = "llm_conversations_v1.json";

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct SavedState {
    pub active_conversation: Option<String>,
    pub show_sidebar: bool,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl From<&App> for SavedState {
    fn from(a: &App) -> Self {
        SavedState {
            active_conversation: a.active.clone(),
            show_sidebar: a.show_sidebar,
            user_name: a.user_name.clone(),
            model: Some(a.model.clone()),
        }
    }
}

pub fn data_dir() -> Option<PathBuf> {
    let base = BaseDirs::new()?;
    Some(base.data_dir().join("localchat"))
}

fn state_path() -> Option<PathBuf> {
    let base = BaseDirs::new()?;
    Some(base.config_dir().join("localchat").join("ui_state.json"))
}

pub fn load_state() -> Result<Option<SavedState>> {
    let Some(path) = state_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(&path).with_context(|| format!("read state file: {}", path.display()))?;
    let s: SavedState = serde_json::from_slice(&data).with_context(|| "parse state json")?;
    Ok(Some(s))
}

pub fn save_state(app: &App) -> Result<()> {
    let Some(path) = state_path() else {
        return Ok(());
    };
    let s: SavedState = app.into();
    write_atomic(&path, &serde_json::to_vec_pretty(&s)?)
        .with_context(|| format!("persist state to {}", path.display()))?;
    Ok(())
}

fn write_atomic(path: &PathBuf, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.clone();
    tmp.set_extension("json.tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(data)?;
        f.flush()?;
    }
    fs::rename(tmp, path)
}

/// The whole conversation list as one JSON array, rewritten on every save.
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_location() -> Option<Self> {
        Some(Self::new(data_dir()?.join(CONVERSATIONS_FILE)))
    }
}

impl Persistence for JsonFilePersistence {
    fn load(&self) -> Result<Vec<Conversation>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn save(&self, conversations: &[Conversation]) -> Result<(), StoreError> {
        let data = serde_json::to_vec(conversations)?;
        write_atomic(&self.path, &data)?;
        Ok(())
    }
}
