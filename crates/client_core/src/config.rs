use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use shared::protocol::{DEFAULT_PAGE_SIZE, LOCALITIES_PATH, SEARCH_DEBOUNCE};
use url::Url;

pub const SETTINGS_FILE: &str = "localities.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub api_base: String,
    pub page_size: u32,
    pub search_debounce: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base: "https://rwapi.geoloogia.info/api/v1/public".into(),
            page_size: DEFAULT_PAGE_SIZE,
            search_debounce: SEARCH_DEBOUNCE,
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl ClientSettings {
    /// `<api_base>/localities/`, whether or not the base ends in a slash.
    pub fn endpoint(&self) -> Result<Url> {
        endpoint_for(&self.api_base, LOCALITIES_PATH)
    }

    fn apply(&mut self, key: &str, value: &str) {
        let value = value.trim();
        match key {
            "api_base" if !value.is_empty() => self.api_base = value.to_string(),
            "page_size" => {
                if let Ok(parsed) = value.parse::<u32>() {
                    if parsed > 0 {
                        self.page_size = parsed;
                    }
                }
            }
            "search_debounce_ms" => {
                if let Ok(parsed) = value.parse::<u64>() {
                    self.search_debounce = Duration::from_millis(parsed);
                }
            }
            "request_timeout_secs" => {
                if let Ok(parsed) = value.parse::<u64>() {
                    self.request_timeout = Duration::from_secs(parsed);
                }
            }
            _ => {}
        }
    }
}

pub fn endpoint_for(api_base: &str, path: &str) -> Result<Url> {
    let mut base = api_base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let base = Url::parse(&base).with_context(|| format!("invalid api base url '{api_base}'"))?;
    base.join(path)
        .with_context(|| format!("failed to join '{path}' onto '{base}'"))
}

/// Defaults, then `localities.toml` in the working directory, then the
/// environment.
pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(file) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            for (key, value) in &file_cfg {
                let value = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                settings.apply(key, &value);
            }
        }
    }

    for (key, vars) in [
        ("api_base", ["API_BASE", "APP__API_BASE"]),
        ("page_size", ["PAGE_SIZE", "APP__PAGE_SIZE"]),
        (
            "search_debounce_ms",
            ["SEARCH_DEBOUNCE_MS", "APP__SEARCH_DEBOUNCE_MS"],
        ),
        (
            "request_timeout_secs",
            ["REQUEST_TIMEOUT_SECS", "APP__REQUEST_TIMEOUT_SECS"],
        ),
    ] {
        for var in vars {
            if let Some(value) = env(var) {
                settings.apply(key, &value);
            }
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
