use crate::error::{CloneError, ErrorCode};
use log::warn;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const BACKEND_URL_ENV: &str = "CLONEPLAN_BACKEND_URL";
pub const BACKEND_TIMEOUT_ENV: &str = "CLONEPLAN_BACKEND_TIMEOUT_SECS";
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the computation backend lives. File values are overridden by the
/// environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub backend_url: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    pub fn from_json_file(path: &str) -> Result<Self, CloneError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CloneError::new(
                ErrorCode::Io,
                format!("Could not read config file '{path}': {e}"),
            )
        })?;
        serde_json::from_str(&text).map_err(|e| {
            CloneError::invalid_input(format!("Could not parse config JSON '{path}': {e}"))
        })
    }

    /// Defaults overridden by the environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn load(path: Option<&str>) -> Result<Self, CloneError> {
        match path {
            Some(path) => Ok(Self::from_json_file(path)?.with_env_overrides()),
            None => Ok(Self::from_env()),
        }
    }

    fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(BACKEND_URL_ENV).ok(),
            std::env::var(BACKEND_TIMEOUT_ENV).ok(),
        )
    }

    pub fn with_overrides(mut self, url: Option<String>, timeout_secs: Option<String>) -> Self {
        if let Some(url) = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            self.backend_url = url;
        }
        if let Some(raw) = timeout_secs {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeout_secs = secs,
                _ => warn!("Ignoring {BACKEND_TIMEOUT_ENV}='{raw}', expected a positive integer"),
            }
        }
        self
    }

    pub fn base_url(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
