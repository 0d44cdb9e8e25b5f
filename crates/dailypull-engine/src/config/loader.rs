use super::schema::RunConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./dailypull.yaml
    /// 2. ~/.dailypull/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<RunConfig, ConfigError> {
        let local_config = PathBuf::from("./dailypull.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".dailypull").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(RunConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<RunConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: RunConfig = serde_yaml::from_str(&content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Rejects configurations the run could never complete with.
    pub fn validate(config: &RunConfig) -> Result<(), ConfigError> {
        let selectors = &config.selectors;
        let required = [
            ("selectors.login.email", &selectors.login.email),
            ("selectors.login.password", &selectors.login.password),
            ("selectors.login.submit", &selectors.login.submit),
            ("selectors.from_date", &selectors.from_date),
            ("selectors.to_date", &selectors.to_date),
        ];
        for (field, list) in required {
            if list.is_empty() {
                return Err(ConfigError::Invalid(format!("{field} has no candidates")));
            }
        }

        if url::Url::parse(&config.site.base_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "site.base_url is not a valid URL: {}",
                config.site.base_url
            )));
        }
        if url::Url::parse(&config.site.report_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "site.report_url is not a valid URL: {}",
                config.site.report_url
            )));
        }
        if config.timeouts.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.poll_interval_ms must be positive".into(),
            ));
        }
        if config.publish.batch_rows == 0 {
            return Err(ConfigError::Invalid(
                "publish.batch_rows must be positive".into(),
            ));
        }
        Ok(())
    }
}
