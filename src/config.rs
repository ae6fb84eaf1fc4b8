use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::api::DEFAULT_API_URL;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub scoreboard_interval: Duration,
    pub status_interval: Duration,
    pub token_file: Option<PathBuf>,
    pub demo: bool,
    pub log_to_file: bool,
}

impl Config {
    /// Reads the environment. Call after `.env` files have been loaded.
    pub fn load() -> Self {
        let api_url = env::var("SCOREBOARD_API_URL")
            .ok()
            .map(|val| val.trim().to_string())
            .filter(|val| !val.is_empty())
            .unwrap_or_else(|| {
                info!("SCOREBOARD_API_URL not set, using default: {DEFAULT_API_URL}");
                DEFAULT_API_URL.to_string()
            });
        Self {
            api_url,
            scoreboard_interval: Duration::from_secs(secs_var("SCOREBOARD_POLL_SECS", 5, 1)),
            status_interval: Duration::from_secs(secs_var("STATUS_POLL_SECS", 5, 1)),
            token_file: env::var("SCOREBOARD_TOKEN_FILE")
                .ok()
                .filter(|val| !val.trim().is_empty())
                .map(PathBuf::from),
            demo: flag_var("SCOREBOARD_DEMO"),
            log_to_file: flag_var("SCOREBOARD_LOG"),
        }
    }
}

/// Poll intervals above an hour are clamped.
pub const MAX_POLL_SECS: u64 = 3600;

fn secs_var(key: &str, default: u64, min: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => parse_secs(key, &raw, default, min, MAX_POLL_SECS),
        Err(_) => default,
    }
}

fn parse_secs(key: &str, raw: &str, default: u64, min: u64, max: u64) -> u64 {
    match raw.trim().parse::<u64>() {
        Ok(val) if val > max => {
            warn!("{key} value {val} is above {max}, clamping");
            max
        }
        Ok(val) => val.max(min),
        Err(err) => {
            warn!("Invalid {key} value {raw:?}: {err}, using default: {default}");
            default
        }
    }
}

fn flag_var(key: &str) -> bool {
    env::var(key)
        .map(|val| matches!(val.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
