use crate::config::ClientConfig;
use crate::domain::model::Credentials;
use crate::utils::error::{ApiError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub api: ApiSection,
    pub auth: Option<AuthSection>,
    pub logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    pub base_url: String,
    pub refresh_path: Option<String>,
    pub request_timeout_secs: Option<u64>,
    /// `0` disables the refresh bound.
    pub refresh_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    pub verbose: Option<bool>,
    pub json: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ApiError::Io)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ApiError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${API_BASE_URL})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ApiError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 轉換為 client 使用的連線設定
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.api.base_url.clone());

        if let Some(path) = &self.api.refresh_path {
            config.refresh_path = path.clone();
        }
        if let Some(secs) = self.api.request_timeout_secs {
            config.request_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = self.api.refresh_timeout_secs {
            config.refresh_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(agent) = &self.api.user_agent {
            config.user_agent = agent.clone();
        }

        config
    }

    /// 兩個欄位都存在時才回傳登入憑證
    pub fn credentials(&self) -> Option<Credentials> {
        let auth = self.auth.as_ref()?;
        match (&auth.email, &auth.password) {
            (Some(email), Some(password)) => Some(Credentials {
                email: email.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    pub fn verbose(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.verbose)
            .unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        if self.api.base_url.contains("${") {
            return Err(ApiError::ConfigValidationError {
                field: "api.base_url".to_string(),
                message: format!("Unresolved environment variable in '{}'", self.api.base_url),
            });
        }

        if let Some(auth) = &self.auth {
            if auth.email.is_some() || auth.password.is_some() {
                let email = validation::validate_required_field("auth.email", &auth.email)?;
                validation::validate_non_empty_string("auth.email", email)?;
                validation::validate_required_field("auth.password", &auth.password)?;
            }
        }

        self.client_config().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_toml_config() {
        let toml_content = r#"
[api]
base_url = "https://api.broiler.example.com"
refresh_path = "/v1/auth/refresh"
request_timeout_secs = 15
refresh_timeout_secs = 10

[auth]
email = "ops@example.com"
password = "hunter2"

[logging]
verbose = true
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        let client = config.client_config();

        assert_eq!(client.base_url, "https://api.broiler.example.com");
        assert_eq!(client.refresh_path, "/v1/auth/refresh");
        assert_eq!(client.request_timeout, Some(Duration::from_secs(15)));
        assert_eq!(client.refresh_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.credentials().unwrap().email, "ops@example.com");
        assert!(config.verbose());
        assert!(!config.json_logs());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("BROILER_TEST_BASE_URL", "https://test.api.com");

        let toml_content = r#"
[api]
base_url = "${BROILER_TEST_BASE_URL}"
refresh_timeout_secs = 0
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.api.base_url, "https://test.api.com");
        assert_eq!(config.client_config().refresh_timeout, None);
        assert!(config.credentials().is_none());

        std::env::remove_var("BROILER_TEST_BASE_URL");
    }

    #[test]
    fn test_unresolved_variable_fails_validation() {
        let toml_content = r#"
[api]
base_url = "${BROILER_TEST_UNSET_VARIABLE}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ApiError::ConfigValidationError { .. })
        ));
    }

    #[test]
    fn test_partial_credentials_fail_validation() {
        let toml_content = r#"
[api]
base_url = "https://api.example.com"

[auth]
email = "ops@example.com"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.credentials().is_none());
        assert!(matches!(
            config.validate(),
            Err(ApiError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = r#"
[api]
base_url = "http://localhost:4000/api"
"#;

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.client_config().endpoint("/farms"), "http://localhost:4000/api/farms");
    }
}
