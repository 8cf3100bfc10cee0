use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const CONFIG_FILE: &str = "config.json";
const STORAGE_FILE: &str = "storage.json";

/// Overrides `api_url` when set.
pub const API_URL_ENV: &str = "TRAYSHOT_API_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_url: String,
    pub window_width: u32,
    pub window_height: u32,
    pub debug_logging: bool,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: String::from("http://localhost:3333"),
            window_width: 300,
            window_height: 350,
            debug_logging: false,
            request_timeout_secs: 120,
        }
    }
}

impl AppConfig {
    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("com", "Trayshot", "trayshot")
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Location of the key-value file that holds the recent uploads.
    pub fn storage_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().join(STORAGE_FILE))
    }

    pub fn load() -> Self {
        let config = Self::config_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|content| Self::parse(&content))
            .unwrap_or_default();

        config.with_api_url_override(std::env::var(API_URL_ENV).ok())
    }

    /// Malformed content falls back to the defaults.
    fn parse(content: &str) -> Self {
        serde_json::from_str(content).unwrap_or_default()
    }

    fn with_api_url_override(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }
        self
    }

    /// Writes the defaults out on first run so users have a file to edit.
    pub fn save_if_missing(&self) -> std::io::Result<()> {
        match Self::config_path() {
            Some(path) if !path.exists() => self.save(),
            _ => Ok(()),
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
    }

    pub fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }
}
