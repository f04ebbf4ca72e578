use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Settings read from `config.toml` in the data directory. A missing file
/// means defaults: a local Ollama-compatible endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub inference_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub inference_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inference_url: "http://localhost:11434/v1".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            inference_timeout_secs: 60,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}
