use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the evaluation/TTS HTTP backend.
    pub api_url: String,
    /// Base URL of the realtime session endpoint (`ws://` or `wss://`).
    pub ws_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub reconnect_attempts: u32,
    pub reconnect_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendConfig {
                api_url: "http://localhost:8000".to_string(),
                ws_url: "ws://localhost:8000".to_string(),
            },
            transport: TransportConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            reconnect_attempts: 5,
            reconnect_interval_ms: 3000,
            heartbeat_interval_ms: 30_000,
        }
    }
}

impl Config {
    /// Load config.toml if present, then apply environment overrides.
    /// Missing file and missing variables both fall back to localhost
    /// defaults.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "prepwire", "prepwire") {
            let config_file = config_dir.config_dir().join("config.toml");
            if config_file.exists() {
                let content = std::fs::read_to_string(&config_file)?;
                match toml::from_str::<Config>(&content) {
                    Ok(loaded) => config = loaded,
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable config file: {}", e);
                    }
                }
            }
        }

        if let Ok(api_url) = std::env::var("PREPWIRE_API_URL") {
            if !api_url.is_empty() {
                config.backend.api_url = api_url;
            }
        }
        if let Ok(ws_url) = std::env::var("PREPWIRE_WS_URL") {
            if !ws_url.is_empty() {
                config.backend.ws_url = ws_url;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "prepwire", "prepwire") {
            std::fs::create_dir_all(config_dir.config_dir())?;
            let config_file = config_dir.config_dir().join("config.toml");
            let content = toml::to_string_pretty(self)?;
            std::fs::write(config_file, content)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let api = url::Url::parse(&self.backend.api_url)?;
        anyhow::ensure!(
            matches!(api.scheme(), "http" | "https"),
            "api_url must be http(s), got {}",
            api.scheme()
        );
        let ws = url::Url::parse(&self.backend.ws_url)?;
        anyhow::ensure!(
            matches!(ws.scheme(), "ws" | "wss"),
            "ws_url must be ws(s), got {}",
            ws.scheme()
        );
        Ok(())
    }

    /// Channel address for one interview session:
    /// `{scheme}://{host}/ws/{session_id}`.
    pub fn session_url(&self, session_id: &str) -> String {
        format!(
            "{}/ws/{}",
            self.backend.ws_url.trim_end_matches('/'),
            session_id
        )
    }
}
