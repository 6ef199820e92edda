use std::fs;
use std::path::Path;
use tracing::debug;
use crate::shared::types::BotConfig;
use crate::shared::errors::AppError;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from Config.toml in the working directory
    pub fn load_config() -> Result<BotConfig, AppError> {
        Self::load_from("Config.toml")
    }

    /// Load configuration from the given file
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<BotConfig, AppError> {
        let config_content = fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config = Self::parse(&config_content)?;
        debug!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<BotConfig, AppError> {
        toml::from_str(content)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = ConfigLoader::parse(
            r#"
            bot_id = 7

            [swap]
            min_percent = 0.5

            [execution]
            max_poll_attempts = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.bot_id, 7);
        assert_eq!(config.swap.min_percent, 0.5);
        assert_eq!(config.swap.fee_percent, 0.2);
        assert_eq!(config.swap.price_freshness_secs, 3600);
        assert_eq!(config.execution.initial_delay_secs, 5);
        assert_eq!(config.execution.poll_interval_secs, 7);
        assert_eq!(config.execution.max_poll_attempts, 10);
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let result = ConfigLoader::parse("swap = 12");
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_bundled_config() {
        let config = ConfigLoader::load_config().unwrap();
        assert_eq!(config.bot_id, 1);
        assert_eq!(config.paper.pairs_file, "data/swap_pairs.json");
        assert_eq!(config.paper.balances.get("ETH"), Some(&100.0));
    }
}
