use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    pub host: String,
    pub port: u16,
    pub model_url: String,
    pub default_user_name: String,
    pub keep_alive: u64,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    upstream: UpstreamSection,
    #[serde(default)]
    cors: CorsSection,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_user_name")]
    default_user_name: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_user_name: default_user_name(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpstreamSection {
    #[serde(default = "default_model_url")]
    url: String,
    #[serde(default = "default_keep_alive")]
    keep_alive: u64,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            url: default_model_url(),
            keep_alive: default_keep_alive(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CorsSection {
    #[serde(default = "default_allowed_origins")]
    allowed_origins: Vec<String>,
}

impl Default for CorsSection {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_model_url() -> String {
    "http://127.0.0.1:11434/v1/completions".to_string()
}

fn default_user_name() -> String {
    "Friend".to_string()
}

fn default_keep_alive() -> u64 {
    6000
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        FileConfig::default().into()
    }
}

impl From<FileConfig> for RelayServerConfig {
    fn from(file_config: FileConfig) -> Self {
        Self {
            host: file_config.server.host,
            port: file_config.server.port,
            model_url: file_config.upstream.url,
            default_user_name: file_config.server.default_user_name,
            keep_alive: file_config.upstream.keep_alive,
            allowed_origins: file_config.cors.allowed_origins,
        }
    }
}

impl RelayServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        if let Some(file_config) = load_from_file()? {
            return Ok(file_config.into());
        }

        Ok(Self::from_env())
    }

    fn from_env() -> Self {
        let host = env::var("RELAY_HOST").unwrap_or_else(|_| default_host());
        let port = env::var("RELAY_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or_else(default_port);
        let model_url = env::var("MODEL_URL").unwrap_or_else(|_| default_model_url());
        let default_user_name =
            env::var("RELAY_DEFAULT_USER").unwrap_or_else(|_| default_user_name());

        Self {
            host,
            port,
            model_url,
            default_user_name,
            keep_alive: default_keep_alive(),
            allowed_origins: default_allowed_origins(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn load_from_file() -> anyhow::Result<Option<FileConfig>> {
    let config_path = env::var("LOCALCHAT_RELAY_CONFIG").ok();
    let path = if let Some(path) = config_path {
        Some(path)
    } else if Path::new("relay.toml").exists() {
        Some("relay.toml".to_string())
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(None);
    };

    let contents = fs::read_to_string(&path)
        .map_err(|err| anyhow::anyhow!("Failed to read config {}: {}", path, err))?;
    parse(&contents)
        .map(Some)
        .map_err(|err| anyhow::anyhow!("Failed to parse config {}: {}", path, err))
}

fn parse(contents: &str) -> Result<FileConfig, toml::de::Error> {
    toml::from_str(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_model_server() {
        let cfg = RelayServerConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:8000");
        assert_eq!(cfg.model_url, "http://127.0.0.1:11434/v1/completions");
        assert_eq!(cfg.default_user_name, "Friend");
        assert_eq!(cfg.keep_alive, 6000);
        assert_eq!(cfg.allowed_origins.len(), 2);
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let file = parse(
            r#"
            [upstream]
            url = "http://gpu-box:11434/v1/completions"

            [server]
            port = 9000
            "#,
        )
        .unwrap();
        let cfg: RelayServerConfig = file.into();
        assert_eq!(cfg.model_url, "http://gpu-box:11434/v1/completions");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.keep_alive, 6000);
        assert_eq!(cfg.default_user_name, "Friend");
    }
}
