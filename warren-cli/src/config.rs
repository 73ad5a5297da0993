//! Configuration loading: TOML file, `.env`, then `WARREN_*` variables.

use std::path::Path;
use std::{env, fs};

use serde::{Deserialize, Serialize};
use tracing::debug;
use warren_messaging::{PoolConfig, RabbitMqConfig, TopologyConfig};

use crate::error::{CliError, CliResult};

/// File read when `--config` is not given, if it exists
pub const DEFAULT_CONFIG_FILE: &str = "warren.toml";

/// Prefix of environment overrides
const ENV_PREFIX: &str = "WARREN";

/// Everything the CLI needs to reach the broker and declare topology
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarrenConfig {
    /// Broker connection
    pub rabbitmq: RabbitMqConfig,
    /// Exchange, queue and binding to declare
    pub topology: TopologyConfig,
    /// Channel pool
    pub pool: PoolConfig,
}

impl WarrenConfig {
    /// Load from `path` (or `warren.toml` when present) and apply environment overrides
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!(path = %env_file.display(), "Loaded .env file");
        }

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| env::var(format!("{}_{}", ENV_PREFIX, key)).ok())?;
        Ok(config)
    }

    /// Read a TOML configuration file
    pub fn from_file(path: &Path) -> CliResult<Self> {
        debug!(path = %path.display(), "Reading configuration file");
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML configuration
    pub fn from_toml(content: &str) -> CliResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> CliResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply overrides from a variable lookup keyed without the prefix
    /// (`URL`, `VHOST`, `EXCHANGE`, `QUEUE`, `POOL_SIZE`).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> CliResult<()> {
        if let Some(url) = lookup("URL") {
            self.rabbitmq.url = url;
        }
        if let Some(vhost) = lookup("VHOST") {
            self.rabbitmq.vhost = vhost;
        }
        if let Some(exchange) = lookup("EXCHANGE") {
            self.topology.exchange.name = exchange;
        }
        if let Some(queue) = lookup("QUEUE") {
            self.topology.queue.name = queue;
        }
        if let Some(size) = lookup("POOL_SIZE") {
            self.pool.max_size = size.parse().map_err(|_| {
                CliError::Config(format!("{}_POOL_SIZE must be a number, got '{}'", ENV_PREFIX, size))
            })?;
        }
        Ok(())
    }

    /// Check the broker URL, topology names and pool bounds
    pub fn validate(&self) -> CliResult<()> {
        self.rabbitmq.validate()?;
        self.topology.validate()?;
        self.pool.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = WarrenConfig::default();
        assert_eq!(config.rabbitmq.url, "amqp://localhost:5672");
        assert_eq!(config.topology.exchange.name, "micronaut");
        assert_eq!(config.topology.queue.name, "analytics");
        assert_eq!(config.pool.max_size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = WarrenConfig::from_toml(
            r#"
            [rabbitmq]
            url = "amqp://rabbit:5672"

            [topology.queue]
            name = "inventory"
            "#,
        )
        .unwrap();

        assert_eq!(config.rabbitmq.url, "amqp://rabbit:5672");
        assert_eq!(config.rabbitmq.vhost, "/");
        assert_eq!(config.topology.exchange.name, "micronaut");
        assert_eq!(config.topology.queue.name, "inventory");
        assert!(config.topology.queue.durable);
        assert_eq!(config.topology.routing_key(), "inventory");
    }

    #[test]
    fn test_invalid_toml() {
        let result = WarrenConfig::from_toml("[rabbitmq\nurl = ");
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[topology.exchange]\nname = \"books\"\nkind = \"topic\"").unwrap();

        let config = WarrenConfig::from_file(file.path()).unwrap();
        assert_eq!(config.topology.exchange.name, "books");
        assert_eq!(
            config.topology.exchange.kind,
            warren_messaging::ExchangeKind::Topic
        );
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("URL", "amqp://broker:5672"),
            ("EXCHANGE", "books"),
            ("QUEUE", "inventory"),
            ("POOL_SIZE", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = WarrenConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.rabbitmq.url, "amqp://broker:5672");
        assert_eq!(config.topology.exchange.name, "books");
        assert_eq!(config.topology.queue.name, "inventory");
        assert_eq!(config.pool.max_size, 3);
    }

    #[test]
    fn test_bad_pool_size_override() {
        let mut config = WarrenConfig::default();
        let result = config.apply_overrides(|key| (key == "POOL_SIZE").then(|| "many".to_string()));
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_toml_output_reparses() {
        let config = WarrenConfig::default();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("micronaut"));
        assert_eq!(WarrenConfig::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_url_and_huge_pool() {
        let mut config = WarrenConfig::default();
        config.rabbitmq.url = "localhost:5672".to_string();
        assert!(config.validate().is_err());

        let mut config = WarrenConfig::default();
        config
            .apply_overrides(|key| (key == "POOL_SIZE").then(|| usize::MAX.to_string()))
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(CliError::Messaging(warren_messaging::MessagingError::Configuration(_)))
        ));
    }

    #[test]
    fn test_validate_rejects_reserved_exchange() {
        let mut config = WarrenConfig::default();
        config.topology.exchange.name = "amq.direct".to_string();
        assert!(matches!(
            config.validate(),
            Err(CliError::Messaging(warren_messaging::MessagingError::Configuration(_)))
        ));
    }
}
