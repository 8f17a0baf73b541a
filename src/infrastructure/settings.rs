//! Runtime settings read from the environment (and `.env`).

use di::{inject, injectable};
use log::warn;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind_address: String,
    pub ollama_url: String,
    pub ollama_timeout: Option<Duration>,
    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
    pub history_dir: PathBuf,
    pub session_idle: Duration,
    pub cors_origins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind_address: "0.0.0.0:5000".to_owned(),
            ollama_url: "http://localhost:11434".to_owned(),
            ollama_timeout: None,
            default_model: "llama3.2".to_owned(),
            default_temperature: 0.7,
            default_max_tokens: 2000,
            history_dir: PathBuf::from("."),
            session_idle: Duration::from_secs(3600),
            cors_origins: vec![
                "http://localhost:3000".to_owned(),
                "http://localhost:5173".to_owned(),
            ],
        }
    }
}

#[injectable]
impl Settings {
    #[inject]
    pub fn create() -> Settings {
        dotenvy::dotenv().ok();
        Settings::from_lookup(|key| env::var(key).ok())
    }
}

impl Settings {
    /// Builds settings from a key lookup, falling back to defaults for missing or
    /// unparseable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Settings {
        let defaults = Settings::default();

        Settings {
            bind_address: lookup("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            ollama_url: lookup("OLLAMA_URL")
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or(defaults.ollama_url),
            ollama_timeout: parse_var::<u64>(&lookup, "OLLAMA_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            default_model: lookup("DEFAULT_MODEL").unwrap_or(defaults.default_model),
            default_temperature: parse_var(&lookup, "DEFAULT_TEMPERATURE")
                .unwrap_or(defaults.default_temperature),
            default_max_tokens: parse_var(&lookup, "DEFAULT_MAX_TOKENS")
                .unwrap_or(defaults.default_max_tokens),
            history_dir: lookup("HISTORY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.history_dir),
            session_idle: parse_var(&lookup, "SESSION_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_idle),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("ignoring {key}={raw:?}: {e}");
            None
        }
    }
}
