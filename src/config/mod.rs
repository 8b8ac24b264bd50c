#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

use crate::utils::error::{ApiError, Result};
use crate::utils::validation::{self, Validate};
use std::env;
use std::time::Duration;

pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
pub const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 30;

/// 連線設定
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub refresh_path: String,
    /// Applied to every ordinary request when set.
    pub request_timeout: Option<Duration>,
    /// Upper bound on the refresh exchange. `None` waits indefinitely.
    pub refresh_timeout: Option<Duration>,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            request_timeout: None,
            refresh_timeout: Some(Duration::from_secs(DEFAULT_REFRESH_TIMEOUT_SECS)),
            user_agent: format!("broiler-api/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// 從環境變數載入配置
    ///
    /// `API_BASE_URL` is required. `API_REFRESH_PATH`, `API_REQUEST_TIMEOUT_SECS`
    /// and `API_REFRESH_TIMEOUT_SECS` are optional; a refresh timeout of `0`
    /// disables the bound.
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("API_BASE_URL").map_err(|_| ApiError::MissingConfigError {
            field: "API_BASE_URL".to_string(),
        })?;

        let mut config = Self::new(base_url);

        if let Ok(path) = env::var("API_REFRESH_PATH") {
            config.refresh_path = path;
        }
        if let Some(secs) = parse_secs_var("API_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_secs_var("API_REFRESH_TIMEOUT_SECS")? {
            config.refresh_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Joins a relative API path onto the base URL, keeping any base path prefix.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_secs_var(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ApiError::InvalidConfigValueError {
                field: name.to_string(),
                value: raw.clone(),
                reason: format!("Expected a number of seconds: {}", e),
            }),
        Err(_) => Ok(None),
    }
}

impl Validate for ClientConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_url("api.base_url", &self.base_url)?;
        validation::validate_api_path("api.refresh_path", &self.refresh_path)?;
        validation::validate_non_empty_string("api.user_agent", &self.user_agent)?;

        if let Some(timeout) = self.request_timeout {
            validation::validate_positive_number(
                "api.request_timeout_secs",
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                1,
            )?;
        }
        if let Some(timeout) = self.refresh_timeout {
            validation::validate_positive_number(
                "api.refresh_timeout_secs",
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                1,
            )?;
        }

        Ok(())
    }
}
