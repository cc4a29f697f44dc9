use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_TRIGGER_CODE: &str = "123456789";
pub const DEFAULT_MAX_MODES: usize = 10;
pub const DEFAULT_MAX_MODE_NAME_LEN: usize = 30;

const DATA_DIR_ENV: &str = "THINKBLOCK_DATA_DIR";
const TRIGGER_CODE_ENV: &str = "THINKBLOCK_TRIGGER_CODE";
const DEBUG_ENV: &str = "THINKBLOCK_DEBUG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockerConfig {
    pub data_dir: PathBuf,
    pub trigger_code: String,
    pub max_modes: usize,
    pub max_mode_name_len: usize,
    pub scan_timeout_secs: u64,
    /// Only ever set from the environment.
    #[serde(skip)]
    pub debug: bool,
}

impl Default for BlockerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            trigger_code: DEFAULT_TRIGGER_CODE.into(),
            max_modes: DEFAULT_MAX_MODES,
            max_mode_name_len: DEFAULT_MAX_MODE_NAME_LEN,
            scan_timeout_secs: 60,
            debug: false,
        }
    }
}

impl BlockerConfig {
    /// Load from `path`, falling back to defaults when the file is missing or
    /// unreadable as JSON, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!(
                        "Ignoring malformed config at {}: {err}; using defaults",
                        path.display()
                    );
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("thinkblock.sqlite3")
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(code) = std::env::var(TRIGGER_CODE_ENV) {
            if !code.is_empty() {
                self.trigger_code = code;
            }
        }
        self.debug = std::env::var(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
    }
}
