use crate::{env_flag, env_optional, env_required, ConfigError, Environment, FromEnv};
use std::fmt;

/// Connection name reported to the server unless a process sets its own.
pub const DEFAULT_CONNECTION_NAME: &str = "queue-client";

/// NATS connection settings.
///
/// Reads:
/// - `NATS_URL` (required)
/// - `NATS_USER_JWT` / `NATS_NKEY` (user JWT and nkey seed; both or neither,
///   both required in production)
/// - `DEBUG` (non-empty selects debug subjects)
#[derive(Clone, PartialEq, Eq)]
pub struct NatsConfig {
    pub url: String,
    pub user_jwt: Option<String>,
    pub nkey_seed: Option<String>,
    pub debug: bool,
    pub connection_name: String,
}

impl NatsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_jwt: None,
            nkey_seed: None,
            debug: false,
            connection_name: DEFAULT_CONNECTION_NAME.to_string(),
        }
    }

    pub fn with_credentials(mut self, jwt: impl Into<String>, seed: impl Into<String>) -> Self {
        self.user_jwt = Some(jwt.into());
        self.nkey_seed = Some(seed.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = name.into();
        self
    }

    /// Credentials in the `.creds` file layout understood by NATS clients.
    pub fn credentials(&self) -> Option<String> {
        let (jwt, seed) = (self.user_jwt.as_ref()?, self.nkey_seed.as_ref()?);
        Some(format!(
            "-----BEGIN NATS USER JWT-----\n{}\n------END NATS USER JWT------\n\n\
             -----BEGIN USER NKEY SEED-----\n{}\n------END USER NKEY SEED------\n",
            jwt.trim(),
            seed.trim()
        ))
    }

    fn from_env_for(environment: &Environment) -> Result<Self, ConfigError> {
        let url = env_required("NATS_URL")?;
        let user_jwt = env_optional("NATS_USER_JWT");
        let nkey_seed = env_optional("NATS_NKEY");

        match (&user_jwt, &nkey_seed) {
            (Some(_), Some(_)) => {}
            (None, None) if !environment.is_production() => {}
            (None, _) => return Err(ConfigError::MissingEnvVar("NATS_USER_JWT".to_string())),
            (_, None) => return Err(ConfigError::MissingEnvVar("NATS_NKEY".to_string())),
        }

        Ok(Self {
            url,
            user_jwt,
            nkey_seed,
            debug: env_flag("DEBUG"),
            connection_name: DEFAULT_CONNECTION_NAME.to_string(),
        })
    }
}

impl FromEnv for NatsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_for(&Environment::from_env())
    }
}

impl fmt::Debug for NatsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatsConfig")
            .field("url", &self.url)
            .field("user_jwt", &self.user_jwt.as_ref().map(|_| "<redacted>"))
            .field("nkey_seed", &self.nkey_seed.as_ref().map(|_| "<redacted>"))
            .field("debug", &self.debug)
            .field("connection_name", &self.connection_name)
            .finish()
    }
}
