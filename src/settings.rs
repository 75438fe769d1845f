//! Process-wide settings for scripted scans.
//!
//! Defaults are suitable for tests; the CLI reads overrides from the
//! environment (or a JSON file) and installs them once via `Settings::install`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Version string reported to wrappers as HOST_VERSION.
    pub host_version: String,
    /// Numeric version reported to wrappers as HOST_VERSION_NUM.
    pub host_version_num: i64,
    /// Reject unknown table options instead of forwarding them to the wrapper.
    pub strict_options: bool,
    /// Lua files evaluated in every fresh runtime, before the wrapper loads.
    pub preload: Vec<PathBuf>,
    /// tracing-subscriber EnvFilter directive used when RUST_LOG is unset.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host_version: "16.0".to_string(),
            host_version_num: 160000,
            strict_options: false,
            preload: Vec::new(),
            log_filter: "info".to_string(),
        }
    }
}

static GLOBAL: OnceCell<Settings> = OnceCell::new();

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Settings {
    /// Defaults overlaid with SCRIPTSCAN_* environment variables.
    pub fn from_env() -> Result<Self> {
        let mut s = Self::default();
        if let Ok(v) = std::env::var("SCRIPTSCAN_HOST_VERSION") { s.host_version = v; }
        if let Ok(v) = std::env::var("SCRIPTSCAN_HOST_VERSION_NUM") {
            s.host_version_num = v.trim().parse().with_context(|| format!("SCRIPTSCAN_HOST_VERSION_NUM is not an integer: '{}'", v))?;
        }
        if let Ok(v) = std::env::var("SCRIPTSCAN_STRICT_OPTIONS") { s.strict_options = parse_bool(&v); }
        if let Some(v) = std::env::var_os("SCRIPTSCAN_PRELOAD") {
            s.preload = std::env::split_paths(&v).filter(|p| !p.as_os_str().is_empty()).collect();
        }
        if let Ok(v) = std::env::var("RUST_LOG") { s.log_filter = v; }
        Ok(s)
    }

    /// Load settings from a JSON document; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading settings file {}", path.display()))?;
        let s: Settings = serde_json::from_str(&text).with_context(|| format!("parsing settings file {}", path.display()))?;
        Ok(s)
    }

    /// Install process-wide settings. Returns false if settings were already installed.
    pub fn install(settings: Settings) -> bool { GLOBAL.set(settings).is_ok() }

    pub fn global() -> &'static Settings { GLOBAL.get_or_init(Settings::default) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_overrides_keep_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("scan.json");
        std::fs::write(&p, r#"{ "strict_options": true, "preload": ["/opt/wrappers/redis.lua"] }"#).unwrap();
        let s = Settings::from_json_file(&p).unwrap();
        assert!(s.strict_options);
        assert_eq!(s.preload, vec![PathBuf::from("/opt/wrappers/redis.lua")]);
        assert_eq!(s.host_version, "16.0");
        assert_eq!(s.host_version_num, 160000);
    }

    #[test]
    fn bool_parsing() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" 1 "));
        assert!(!parse_bool("no"));
    }
}
