use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.5;
pub const DEFAULT_PORT: u16 = 8000;

const CONFIG_FILE_PATH: &str = "dof3a.toml";

/// Placeholder key shipped in sample `.env` files; treated as unset.
pub const DEMO_API_KEY: &str = "demo_key_for_testing";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub google_api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub database_path: PathBuf,
    pub port: u16,
    /// The question endpoint is wired but off unless explicitly enabled.
    pub enable_questions: bool,
    /// Daily tutor calls allowed per user; `None` means unlimited.
    pub tutor_daily_limit: Option<u32>,
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl Default for Config {
    fn default() -> Self {
        Config {
            google_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            database_path: PathBuf::from("dof3a.db"),
            port: DEFAULT_PORT,
            enable_questions: false,
            tutor_daily_limit: None,
        }
    }
}

impl Config {
    /// Defaults, then `dof3a.toml` in the working directory, then environment.
    pub fn load() -> Self {
        let mut config = Self::from_file(Path::new(CONFIG_FILE_PATH)).unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Failed to read config file {:?}: {}", path, e);
                return None;
            }
        };

        match toml::from_str::<Config>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("GOOGLE_API_KEY") {
            self.google_api_key = Some(api_key);
        }
        if let Some(model) = lookup("DOF3A_MODEL") {
            self.model = model;
        }
        if let Some(temperature) = lookup("DOF3A_TEMPERATURE") {
            match temperature.trim().parse::<f32>() {
                Ok(value) => self.temperature = value,
                Err(_) => log::warn!("Ignoring invalid DOF3A_TEMPERATURE: {}", temperature),
            }
        }
        if let Some(database) = lookup("DOF3A_DATABASE") {
            self.database_path = PathBuf::from(database);
        }
        if let Some(port) = lookup("DOF3A_PORT") {
            match port.trim().parse::<u16>() {
                Ok(value) => self.port = value,
                Err(_) => log::warn!("Ignoring invalid DOF3A_PORT: {}", port),
            }
        }
        if let Some(enabled) = lookup("DOF3A_ENABLE_QUESTIONS") {
            self.enable_questions = parse_bool_env(&enabled);
        }
        if let Some(limit) = lookup("DOF3A_TUTOR_DAILY_LIMIT") {
            self.tutor_daily_limit = limit.trim().parse::<u32>().ok().filter(|value| *value > 0);
        }
    }

    /// The configured key, unless it is blank or the demo placeholder.
    pub fn usable_api_key(&self) -> Option<&str> {
        self.google_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != DEMO_API_KEY)
    }
}
