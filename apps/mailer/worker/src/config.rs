//! Configuration for the mailer worker

use core_config::{
    env_optional, env_or_default, env_parse, env_required, ConfigError, Environment, FromEnv,
    NatsConfig, ServerConfig,
};
use email::SmtpStream;
use messaging::{
    ConsumerSpec, FailurePolicy, StreamConfig, StreamSpec, SubjectMode, WorkerConfig,
};
use std::time::Duration;

pub const CONNECTION_NAME: &str = "mailer-worker";
pub const DEFAULT_HEALTH_PORT: u16 = 8081;

#[derive(Debug, Clone)]
pub struct Config {
    pub nats: NatsConfig,
    pub health: ServerConfig,
    /// `None` selects the log-only sender
    pub smtp_url: Option<String>,
    pub stream_max_bytes: i64,
    pub durable: String,
    pub max_ack_pending: i64,
    pub ack_wait: Duration,
    pub failure_policy: FailurePolicy,
}

impl Config {
    fn from_env_for(environment: &Environment) -> Result<Self, ConfigError> {
        let smtp_url = if environment.is_production() {
            Some(env_required("SMTP_URL")?)
        } else {
            env_optional("SMTP_URL")
        };

        let ack_wait_secs: u64 = env_parse("WORKER_ACK_WAIT_SECS", SmtpStream::ACK_WAIT_SECS)?;
        if ack_wait_secs == 0 {
            return Err(ConfigError::Invalid(
                "WORKER_ACK_WAIT_SECS must be positive".to_string(),
            ));
        }

        let nats = NatsConfig::from_env()?.with_connection_name(CONNECTION_NAME);
        let durable = SubjectMode::from_debug(nats.debug).durable(SmtpStream::CONSUMER_NAME);

        Ok(Self {
            nats,
            health: ServerConfig::from_env_with_port("HEALTH_PORT", DEFAULT_HEALTH_PORT)?,
            smtp_url,
            stream_max_bytes: env_parse("STREAM_MAX_BYTES", SmtpStream::MAX_BYTES)?,
            durable: env_or_default("WORKER_DURABLE", &durable),
            max_ack_pending: env_parse("WORKER_MAX_ACK_PENDING", SmtpStream::MAX_PENDING)?,
            ack_wait: Duration::from_secs(ack_wait_secs),
            failure_policy: env_parse("WORKER_FAILURE_POLICY", FailurePolicy::default())?,
        })
    }

    pub fn stream(&self) -> StreamSpec {
        StreamSpec::from_stream::<SmtpStream>().with_max_bytes(self.stream_max_bytes)
    }

    pub fn consumer(&self, filter_subject: String) -> ConsumerSpec {
        ConsumerSpec::from_stream::<SmtpStream>(filter_subject)
            .with_durable(&self.durable)
            .with_max_ack_pending(self.max_ack_pending)
            .with_ack_wait(self.ack_wait)
    }

    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig::from_stream::<SmtpStream>().with_failure_policy(self.failure_policy)
    }
}

impl FromEnv for Config {
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_for(&Environment::from_env())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [(&str, Option<&str>); 12] = [
        ("NATS_URL", Some("nats://localhost:4222")),
        ("DEBUG", None),
        ("NATS_USER_JWT", None),
        ("NATS_NKEY", None),
        ("APP_ENV", None),
        ("SMTP_URL", None),
        ("HEALTH_PORT", None),
        ("STREAM_MAX_BYTES", None),
        ("WORKER_DURABLE", None),
        ("WORKER_MAX_ACK_PENDING", None),
        ("WORKER_ACK_WAIT_SECS", None),
        ("WORKER_FAILURE_POLICY", None),
    ];

    /// Run `f` with a clean worker environment plus `vars`.
    fn with_env<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let mut all: Vec<(&str, Option<&str>)> = BASE
            .iter()
            .filter(|(key, _)| !vars.iter().any(|(k, _)| k == key))
            .copied()
            .collect();
        all.extend_from_slice(vars);
        temp_env::with_vars(all, f);
    }

    #[test]
    fn test_development_defaults() {
        with_env(&[], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.smtp_url, None);
            assert_eq!(config.health.port, DEFAULT_HEALTH_PORT);
            assert_eq!(config.durable, "smtp");
            assert_eq!(config.max_ack_pending, 1);
            assert_eq!(config.ack_wait, Duration::from_secs(30));
            assert_eq!(config.failure_policy, FailurePolicy::Isolate);
            assert_eq!(config.stream().max_bytes, 1024 * 1024);
            assert_eq!(config.nats.connection_name, CONNECTION_NAME);
        });
    }

    #[test]
    fn test_debug_mode_uses_its_own_durable() {
        with_env(&[("DEBUG", Some("1"))], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.durable, "smtp-debug");

            let consumer = config.consumer("debug.smtp.>".to_string());
            assert_eq!(consumer.deliver_group(), "smtp-debug");
        });
    }

    #[test]
    fn test_overrides() {
        with_env(
            &[
                ("SMTP_URL", Some("google://k:pw@gmail.com:587")),
                ("HEALTH_PORT", Some("9100")),
                ("STREAM_MAX_BYTES", Some("2048")),
                ("WORKER_DURABLE", Some("mailers")),
                ("WORKER_MAX_ACK_PENDING", Some("8")),
                ("WORKER_ACK_WAIT_SECS", Some("5")),
                ("WORKER_FAILURE_POLICY", Some("fail-fast")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.smtp_url.as_deref(), Some("google://k:pw@gmail.com:587"));
                assert_eq!(config.health.port, 9100);
                assert_eq!(config.failure_policy, FailurePolicy::FailFast);

                let consumer = config.consumer("debug.smtp.>".to_string());
                assert_eq!(consumer.durable, "mailers");
                assert_eq!(consumer.deliver_group(), "mailers");
                assert_eq!(consumer.max_ack_pending, 8);
                assert_eq!(consumer.ack_wait, Duration::from_secs(5));
                assert_eq!(config.stream().max_bytes, 2048);
            },
        );
    }

    #[test]
    fn test_production_requires_smtp_url() {
        with_env(
            &[
                ("APP_ENV", Some("production")),
                ("NATS_USER_JWT", Some("jwt")),
                ("NATS_NKEY", Some("seed")),
            ],
            || {
                let err = Config::from_env().unwrap_err();
                assert!(err.to_string().contains("SMTP_URL"));
            },
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        with_env(&[("WORKER_FAILURE_POLICY", Some("retry-forever"))], || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("WORKER_FAILURE_POLICY"));
        });
        with_env(&[("WORKER_ACK_WAIT_SECS", Some("0"))], || {
            assert!(Config::from_env().is_err());
        });
    }
}
