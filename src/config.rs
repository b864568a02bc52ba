//! Poller configuration.
//!
//! Defaults can be overridden from the environment (a `.env` file is loaded
//! by the binary before [`PollerConfig::from_env`] runs):
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `GUAGUAS_URL` | feed endpoint | `https://lpgc.es/guaguas/` |
//! | `GUAGUAS_POLL_INTERVAL_MS` | poll interval in ms | `30000` |
//! | `GUAGUAS_DEBUG` | per-bus merge logging | off |

use anyhow::{Context, Result, bail};
use std::time::Duration;

pub const DEFAULT_URL: &str = "https://lpgc.es/guaguas/";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

pub const ENV_URL: &str = "GUAGUAS_URL";
pub const ENV_INTERVAL_MS: &str = "GUAGUAS_POLL_INTERVAL_MS";
pub const ENV_DEBUG: &str = "GUAGUAS_DEBUG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub base_url: String,
    pub interval: Duration,
    pub debug: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_URL.to_string(),
            interval: DEFAULT_INTERVAL,
            debug: false,
        }
    }
}

impl PollerConfig {
    /// Builds a config from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_URL).filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_INTERVAL_MS) {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_INTERVAL_MS} must be a number of milliseconds, got '{raw}'"))?;
            config.interval = interval_from_millis(ms)?;
        }

        if let Some(raw) = lookup(ENV_DEBUG) {
            config.debug = parse_flag(&raw).with_context(|| format!("invalid {ENV_DEBUG}"))?;
        }

        Ok(config)
    }
}

/// Converts a millisecond count into a poll interval, rejecting zero.
pub fn interval_from_millis(ms: u64) -> Result<Duration> {
    if ms == 0 {
        bail!("poll interval must be greater than zero");
    }
    Ok(Duration::from_millis(ms))
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean flag, got '{other}'"),
    }
}
