use directories::BaseDirs;
use localchat_core::llm::ChatRequest;
use serde::Deserialize;
use std::{env, fs, path::PathBuf, time::Duration};
use tracing::warn;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RelayFileConfig {
    pub relay_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub user_name: Option<String>,
    pub timeout_ms: Option<u64>,
    pub stream_idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub user_name: Option<String>,
    pub timeout: Duration,
    pub stream_idle_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            model: "llama3.2:1b".to_string(),
            max_tokens: 2048,
            user_name: None,
            timeout: Duration::from_millis(30_000),
            stream_idle_timeout: Duration::from_millis(300_000),
        }
    }
}

impl RelayConfig {
    /// Defaults, then the config file, then environment overrides.
    pub fn from_env_and_file() -> anyhow::Result<Self> {
        let mut cfg = RelayConfig::default();

        if let Some(path) = Self::config_path() {
            if path.exists() {
                let text = fs::read_to_string(&path)?;
                match toml::from_str::<RelayFileConfig>(&text) {
                    Ok(file_cfg) => cfg.apply_file(file_cfg),
                    Err(e) => {
                        warn!(target:"providers::relay","ignoring {}: {}", path.display(), e)
                    }
                }
            }
        }

        if let Ok(url) = env::var("LOCALCHAT_RELAY_URL") {
            cfg.base_url = url;
        }
        if let Ok(m) = env::var("LOCALCHAT_MODEL") {
            cfg.model = m;
        }
        if let Ok(n) = env::var("LOCALCHAT_USER_NAME") {
            cfg.user_name = Some(n);
        }
        url::Url::parse(&cfg.base_url)
            .map_err(|e| anyhow::anyhow!("invalid relay url {}: {}", cfg.base_url, e))?;
        Ok(cfg)
    }

    fn apply_file(&mut self, file_cfg: RelayFileConfig) {
        if let Some(u) = file_cfg.relay_url {
            self.base_url = u;
        }
        if let Some(m) = file_cfg.model {
            self.model = m;
        }
        if let Some(t) = file_cfg.max_tokens {
            self.max_tokens = t;
        }
        if file_cfg.user_name.is_some() {
            self.user_name = file_cfg.user_name;
        }
        if let Some(t) = file_cfg.timeout_ms {
            self.timeout = Duration::from_millis(t);
        }
        if let Some(idle) = file_cfg.stream_idle_timeout_ms {
            self.stream_idle_timeout = Duration::from_millis(idle);
        }
    }

    /// The request body a chat client sends for one prompt. The configured
    /// display name is only a default; callers may replace `user_name`.
    pub fn chat_request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            prompt: prompt.to_string(),
            stream: Some(true),
            user_name: self.user_name.clone(),
            ..Default::default()
        }
        .with_field("model", serde_json::json!(self.model))
        .with_field("max_tokens", serde_json::json!(self.max_tokens))
    }

    fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        let p = if cfg!(target_os = "windows") {
            base.home_dir().join(".localchat").join("config.toml")
        } else {
            base.config_dir().join("localchat").join("config.toml")
        };
        Some(p)
    }
}
