use core_config::{ConfigError, FromEnv, NatsConfig, ServerConfig};

/// Connection name the API reports to NATS.
pub const CONNECTION_NAME: &str = "mailer-api";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub nats: NatsConfig,
}

impl FromEnv for Config {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            nats: NatsConfig::from_env()?.with_connection_name(CONNECTION_NAME),
        })
    }
}
