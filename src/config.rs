use std::sync::LazyLock;

use ffmpeg_effect::SessionConfig;
use serde::Deserialize;

pub const CONFIG_ENV: &str = "VIDEO_EFFECT_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    /// Used when no effect is given on the command line.
    pub effect: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            effect: "grayscale".to_string(),
        }
    }
}

impl AppConfig {
    fn load() -> anyhow::Result<Self> {
        let Ok(path) = std::env::var(CONFIG_ENV) else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("read config {}: {}", path, e))?;
        Self::parse(&text).map_err(|e| anyhow::anyhow!("parse config {}: {}", path, e))
    }

    fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

pub fn config() -> &'static AppConfig {
    static CONFIG: LazyLock<AppConfig> = LazyLock::new(|| {
        AppConfig::load().unwrap_or_else(|e| {
            log::warn!("{}, using defaults", e);
            AppConfig::default()
        })
    });
    &CONFIG
}
