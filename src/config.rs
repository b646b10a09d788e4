use derive_setters::Setters;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::ViewerError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

#[derive(Debug, Clone, PartialEq, Deserialize, Setters)]
#[serde(default)]
#[setters(into)]
pub struct ViewerConfig {
    /// Endpoint serving `/records` and `/upload`.
    pub base_url: String,
    pub upload_enabled: bool,
    /// Milliseconds to wait for a terminal event before redrawing.
    pub event_poll_time: u64,
    /// Seconds before a request is abandoned.
    pub request_timeout: u64,
    pub max_column_width: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            upload_enabled: true,
            event_poll_time: 100,
            request_timeout: 30,
            max_column_width: 40,
        }
    }
}

impl ViewerConfig {
    /// Defaults, overlaid by the optional toml file and then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ViewerError> {
        let mut config = match path {
            Some(p) => {
                let path = expand_path(&p.to_string_lossy())?;
                debug!("Reading config from {}", path.display());
                let raw = fs::read_to_string(&path)?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ViewerError> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ViewerError> {
        if let Some(v) = lookup("CDRVIEW_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("CDRVIEW_UPLOAD_ENABLED") {
            self.upload_enabled = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(ViewerError::Config(format!(
                        "CDRVIEW_UPLOAD_ENABLED must be a boolean, got \"{other}\""
                    )));
                }
            };
        }
        Ok(())
    }

    /// Checks the base url and strips a trailing slash.
    pub fn validate(mut self) -> Result<Self, ViewerError> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ViewerError::Config(format!("base url \"{}\": {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ViewerError::Config(format!(
                "base url \"{}\" must use http or https",
                self.base_url
            )));
        }
        while self.base_url.ends_with('/') {
            self.base_url.pop();
        }
        if self.event_poll_time == 0 {
            return Err(ViewerError::Config("event_poll_time must be positive".into()));
        }
        Ok(self)
    }
}

pub fn expand_path(raw: &str) -> Result<PathBuf, ViewerError> {
    let expanded = shellexpand::full(raw.trim())
        .map_err(|e| ViewerError::Config(format!("could not expand \"{raw}\": {e}")))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn toml_overrides_defaults() {
        let config = ViewerConfig::from_toml(
            r#"
            base_url = "http://cdr.internal:9000/api/"
            upload_enabled = false
            "#,
        )
        .unwrap();
        assert!(!config.upload_enabled);
        assert_eq!(config.event_poll_time, 100);
        let config = config.validate().unwrap();
        assert_eq!(config.base_url, "http://cdr.internal:9000/api");
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CDRVIEW_BASE_URL", "https://example.org"),
            ("CDRVIEW_UPLOAD_ENABLED", "off"),
        ]);
        let mut config = ViewerConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.base_url, "https://example.org");
        assert!(!config.upload_enabled);
    }

    #[test]
    fn bad_env_boolean_is_rejected() {
        let mut config = ViewerConfig::default();
        let result = config.apply_env(|k| (k == "CDRVIEW_UPLOAD_ENABLED").then(|| "maybe".into()));
        assert!(matches!(result, Err(ViewerError::Config(_))));
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let config = ViewerConfig::default().base_url("/api");
        assert!(config.validate().is_err());
        let config = ViewerConfig::default().base_url("ftp://host/api");
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdrview.toml");
        fs::write(&path, "max_column_width = 12\n").unwrap();
        let config = ViewerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_column_width, 12);
    }
}
