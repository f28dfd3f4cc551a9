// Runtime configuration, loaded from the environment (and .env via dotenvy in main).

use std::env;
use std::path::PathBuf;

/// Environment variable holding the completion API credential.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

// Asset locations can be overridden for installs that don't run from the crate root.
lazy_static::lazy_static! {
    pub static ref TEMPLATE_DIR: String = env::var("BANTER_TEMPLATE_DIR").unwrap_or_else(|_| "templates".to_string());
    pub static ref STATIC_DIR: String = env::var("BANTER_STATIC_DIR").unwrap_or_else(|_| "static".to_string());
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` when the credential is unset or blank; the session is halted in that case.
    pub api_key: Option<String>,
    pub api_base: String,
    pub template_dir: PathBuf,
    pub static_dir: PathBuf,
}

impl Config {
    /// Reads the credential exactly once. Everything after startup uses this snapshot.
    pub fn from_env(api_base: impl Into<String>) -> Self {
        Self {
            api_key: normalize_key(env::var(API_KEY_VAR).ok()),
            api_base: api_base.into(),
            template_dir: PathBuf::from(TEMPLATE_DIR.as_str()),
            static_dir: PathBuf::from(STATIC_DIR.as_str()),
        }
    }

    pub fn new(api_key: Option<String>, api_base: impl Into<String>) -> Self {
        Self {
            api_key: normalize_key(api_key),
            api_base: api_base.into(),
            template_dir: PathBuf::from(TEMPLATE_DIR.as_str()),
            static_dir: PathBuf::from(STATIC_DIR.as_str()),
        }
    }

    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = dir.into();
        self
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }
}

fn normalize_key(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}
