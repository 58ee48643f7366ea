//! Composer configuration, resolved from the environment.
//!
//! Precedence for every setting:
//! 1) explicit override (CLI flag, builder call)
//! 2) env var (`GAIT_*`)
//! 3) built-in default

use crate::ModelChoice;
use std::time::Duration;

pub const QUERY_MANAGER_URL_ENV: &str = "GAIT_QUERY_MANAGER_URL";
pub const HTTP_TIMEOUT_SECS_ENV: &str = "GAIT_HTTP_TIMEOUT_SECS";
pub const MODEL_ENV: &str = "GAIT_MODEL";

pub const DEFAULT_QUERY_MANAGER_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Name reported when an explicit base URL override is rejected.
pub const QUERY_MANAGER_URL_FLAG: &str = "--query-manager-url";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}={value:?} ({expected})")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposerConfig {
    /// Base URL of the query manager service, without trailing slash
    pub query_manager_url: String,
    /// Per-request HTTP timeout; `None` waits forever
    pub request_timeout: Option<Duration>,
    pub default_model: ModelChoice,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            query_manager_url: DEFAULT_QUERY_MANAGER_URL.to_string(),
            request_timeout: Some(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)),
            default_model: ModelChoice::default(),
        }
    }
}

impl ComposerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup` instead of the process environment.
    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(url) = get(QUERY_MANAGER_URL_ENV) {
            config.query_manager_url =
                normalize_base_url(&url, DEFAULT_QUERY_MANAGER_URL, QUERY_MANAGER_URL_ENV)?;
        }
        if let Some(secs) = get(HTTP_TIMEOUT_SECS_ENV) {
            let secs = secs.parse::<u64>().map_err(|_| ConfigError::Invalid {
                var: HTTP_TIMEOUT_SECS_ENV,
                value: secs.clone(),
                expected: "integer seconds; 0 disables",
            })?;
            config = config.with_timeout_secs(secs);
        }
        if let Some(model) = get(MODEL_ENV) {
            config.default_model = model.parse().map_err(|_| ConfigError::Invalid {
                var: MODEL_ENV,
                value: model.clone(),
                expected: "OpenAi or Custom",
            })?;
        }
        Ok(config)
    }

    pub fn with_query_manager_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.query_manager_url =
            normalize_base_url(url, DEFAULT_QUERY_MANAGER_URL, QUERY_MANAGER_URL_FLAG)?;
        Ok(self)
    }

    /// `0` disables the timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }
}

/// Trimmed, scheme-qualified base URL without trailing slashes.
///
/// Blank input falls back to `default`; a bare host gets `http://`. Anything
/// that still does not parse as a base URL is rejected under `var`.
pub fn normalize_base_url(
    base_url: &str,
    default: &str,
    var: &'static str,
) -> Result<String, ConfigError> {
    let trimmed = base_url.trim();
    let base = if trimmed.is_empty() { default } else { trimmed };
    let invalid = || ConfigError::Invalid {
        var,
        value: base_url.to_string(),
        expected: "http(s) base URL",
    };

    let is_base = |candidate: &str| {
        url::Url::parse(candidate).is_ok_and(|u| !u.cannot_be_a_base())
    };
    let qualified = if is_base(base) {
        base.to_string()
    } else if base.contains("://") {
        return Err(invalid());
    } else {
        let prefixed = format!("http://{base}");
        if !is_base(&prefixed) {
            return Err(invalid());
        }
        prefixed
    };
    Ok(qualified.trim_end_matches('/').to_string())
}
