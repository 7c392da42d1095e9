//! Persisted config (image root, Ollama models, search knobs) in the app data directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app_data;

const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder to scan and watch for images (chosen by the user).
    pub image_root: Option<String>,
    /// File extensions treated as images, without the dot. Matched case-insensitively.
    pub extensions: Vec<String>,
    pub ollama_url: String,
    /// Vision model used to caption images.
    pub caption_model: String,
    /// Text model used for query rewriting, date extraction and confirmations.
    pub chat_model: String,
    pub embed_model: String,
    pub top_k: usize,
    /// Upper bound on every Ollama call.
    pub timeout_secs: u64,
    /// Same path re-triggered by the watcher within this window is ignored.
    pub cooldown_secs: u64,
    /// Bind address for the file browser.
    pub server_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_root: None,
            extensions: vec!["png".to_string()],
            ollama_url: crate::ollama::DEFAULT_BASE_URL.to_string(),
            caption_model: crate::ollama::DEFAULT_CAPTION_MODEL.to_string(),
            chat_model: crate::ollama::DEFAULT_CHAT_MODEL.to_string(),
            embed_model: crate::ollama::DEFAULT_EMBED_MODEL.to_string(),
            top_k: 5,
            timeout_secs: 120,
            cooldown_secs: 5,
            server_addr: "127.0.0.1:5000".to_string(),
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Configured root, else the desktop.
    pub fn resolve_image_root(&self) -> Option<PathBuf> {
        self.image_root
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(app_data::default_image_root)
    }
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let Some(data_dir) = app_data::app_data_dir() else {
        return Config::default();
    };
    load_config_from(&data_dir.join(CONFIG_FILENAME))
}

/// Load config from an explicit file. Missing or unparsable files give the defaults.
pub fn load_config_from(path: &Path) -> Config {
    let Ok(s) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    match toml::from_str(&s) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
            Config::default()
        }
    }
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    save_config_to(config, &data_dir.join(CONFIG_FILENAME))
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(path, s).map_err(ConfigError::Write)
}

/// Get the configured image root path, if any.
pub fn get_image_root() -> Option<PathBuf> {
    load_config()
        .image_root
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// Set and persist the image root.
pub fn set_image_root(path: &Path) -> Result<(), ConfigError> {
    let path = path.canonicalize().map_err(ConfigError::Canonicalize)?;
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory(path));
    }
    let mut config = load_config();
    config.image_root = Some(path.to_string_lossy().into_owned());
    save_config(&config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = load_config_from(&dir.path().join("nope.toml"));
        assert_eq!(c.top_k, 5);
        assert_eq!(c.timeout_secs, 120);
        assert_eq!(c.extensions, vec!["png".to_string()]);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "top_k = 9\nchat_model = \"mistral\"\n").unwrap();
        let c = load_config_from(&path);
        assert_eq!(c.top_k, 9);
        assert_eq!(c.chat_model, "mistral");
        assert_eq!(c.cooldown_secs, 5);
    }

    #[test]
    fn invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "top_k = \"lots\"").unwrap();
        assert_eq!(load_config_from(&path).top_k, 5);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut c = Config::default();
        c.image_root = Some("/tmp/pics".into());
        save_config_to(&c, &path).unwrap();
        let back = load_config_from(&path);
        assert_eq!(back.image_root.as_deref(), Some("/tmp/pics"));
        assert_eq!(back.resolve_image_root(), Some(PathBuf::from("/tmp/pics")));
    }
}
