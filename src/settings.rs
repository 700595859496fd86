use crate::platforms::config::PlatformConfig;
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_API_BASE: &str = "MPF_API_BASE";
pub const ENV_API_TOKEN: &str = "MPF_API_TOKEN";
pub const ENV_CHROME_PORT: &str = "MPF_CHROME_PORT";

const APP_DIR: &str = "multi-platform-filler";
const SETTINGS_FILE: &str = "settings.json";

/// Pacing of simulated user interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timing {
    /// Locator re-check interval.
    pub poll_interval_ms: u64,
    /// Pause after each dispatched event so page handlers can re-render.
    pub event_yield_ms: u64,
    /// Pause between two fields.
    pub field_delay_ms: u64,
    /// Images fetched in flight at once.
    pub image_concurrency: usize,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            event_yield_ms: 30,
            field_delay_ms: 300,
            image_concurrency: 3,
        }
    }
}

impl Timing {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn event_yield(&self) -> Duration {
        Duration::from_millis(self.event_yield_ms)
    }

    pub fn field_delay(&self) -> Duration {
        Duration::from_millis(self.field_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Base URL of the content service, e.g. `https://app.example.com`.
    pub api_base: String,
    pub api_token: Option<String>,
    /// Debugging port of an already running Chrome.
    pub chrome_port: Option<u16>,
    /// Local article database; used instead of the API when set.
    pub database: Option<PathBuf>,
    pub timing: Timing,
    /// Registered ahead of the built-in platforms, replacing those with the same id.
    pub platform_overrides: Vec<PlatformConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:3000".into(),
            api_token: None,
            chrome_port: None,
            database: None,
            timing: Timing::default(),
            platform_overrides: Vec::new(),
        }
    }
}

impl Settings {
    /// `<config dir>/multi-platform-filler/settings.json`
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("Cannot find config directory")?;
        Ok(base.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Reads the settings file at `path` (defaults when absent) and applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        let mut settings = if path.exists() {
            let body = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings {}", path.display()))?;
            let parsed: Settings = serde_json::from_str(&body)
                .with_context(|| format!("Invalid settings file {}", path.display()))?;
            info!("[settings] loaded {}", path.display());
            parsed
        } else {
            info!("[settings] {} not found, using defaults", path.display());
            Settings::default()
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Applies `MPF_*` overrides obtained from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            self.api_base = base.trim().to_string();
        }
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.api_token = Some(token.trim().to_string());
        }
        if let Some(raw) = lookup(ENV_CHROME_PORT) {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.chrome_port = Some(port),
                Err(e) => warn!("[settings] ignoring {}={}: {}", ENV_CHROME_PORT, raw, e),
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write settings {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut settings = Settings {
            api_base: "https://file.example.com".into(),
            ..Settings::default()
        };
        let env: HashMap<&str, &str> = [
            (ENV_API_BASE, "https://env.example.com"),
            (ENV_API_TOKEN, "secret"),
            (ENV_CHROME_PORT, "9333"),
        ]
        .into_iter()
        .collect();

        settings.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.api_base, "https://env.example.com");
        assert_eq!(settings.api_token.as_deref(), Some("secret"));
        assert_eq!(settings.chrome_port, Some(9333));
    }

    #[test]
    fn bad_port_is_ignored() {
        let mut settings = Settings::default();
        settings.apply_overrides(|k| (k == ENV_CHROME_PORT).then(|| "not-a-port".to_string()));
        assert_eq!(settings.chrome_port, None);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"timing": {"fieldDelayMs": 50}}"#).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let settings: Settings = serde_json::from_str(&body).unwrap();

        assert_eq!(settings.timing.field_delay_ms, 50);
        assert_eq!(settings.timing.poll_interval_ms, 500);
        assert_eq!(settings.timing.image_concurrency, 3);
        assert_eq!(settings.api_base, "http://localhost:3000");
    }

    #[test]
    fn save_then_load_keeps_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            chrome_port: Some(9401),
            ..Settings::default()
        };
        settings.save(&path).unwrap();

        let raw: Settings = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.chrome_port, Some(9401));
    }
}
