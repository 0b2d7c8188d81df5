use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions as SqlxConnectOptions, PgSslMode as SqlxSslMode};
use thiserror::Error;
use tokio_postgres::{Config as TokioPgConnectOptions, config::SslMode as TokioPgSslMode};

/// Application name reported to Postgres by every mirror connection.
const APP_NAME_MIRROR: &str = "staging_mirror";

/// Errors produced when validating connection configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates were supplied.
    #[error("trusted root certificates must be set when tls is enabled")]
    MissingTrustedRootCerts,
}

/// Connection settings for one Postgres database.
///
/// This intentionally does not implement `Serialize` to avoid accidentally
/// leaking the password into serialized forms.
#[derive(Debug, Clone, Deserialize)]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Database name to connect to.
    pub name: String,
    pub username: String,
    pub password: Option<SecretString>,
    #[serde(default = "TlsConfig::disabled")]
    pub tls: TlsConfig,
}

/// TLS settings for a Postgres connection.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// PEM bundle of trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    pub enabled: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            trusted_root_certs: "".to_owned(),
            enabled: false,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.trim().is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Conversion from [`PgConnectionConfig`] into a driver-specific option type.
///
/// Both the tokio-postgres client (catalog inspection, DDL, bulk transfer)
/// and the sqlx pool (entity reconciliation) are built from the same config.
pub trait IntoConnectOptions<Output> {
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<SqlxConnectOptions> for PgConnectionConfig {
    fn with_db(&self) -> SqlxConnectOptions {
        let ssl_mode = if self.tls.enabled {
            SqlxSslMode::VerifyFull
        } else {
            SqlxSslMode::Prefer
        };

        let mut connect_options = SqlxConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .database(&self.name)
            .application_name(APP_NAME_MIRROR)
            .ssl_mode(ssl_mode)
            .ssl_root_cert_from_pem(self.tls.trusted_root_certs.clone().into_bytes());

        if let Some(password) = &self.password {
            connect_options = connect_options.password(password.expose_secret());
        }

        connect_options
    }
}

impl IntoConnectOptions<TokioPgConnectOptions> for PgConnectionConfig {
    fn with_db(&self) -> TokioPgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            TokioPgSslMode::Require
        } else {
            TokioPgSslMode::Prefer
        };

        let mut config = TokioPgConnectOptions::new();
        config
            .host(self.host.clone())
            .port(self.port)
            .user(self.username.clone())
            .dbname(self.name.clone())
            .application_name(APP_NAME_MIRROR)
            .ssl_mode(ssl_mode);

        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PgConnectionConfig {
        PgConnectionConfig {
            host: "localhost".to_owned(),
            port: 5432,
            name: "mirror".to_owned(),
            username: "postgres".to_owned(),
            password: None,
            tls: TlsConfig::disabled(),
        }
    }

    #[test]
    fn tokio_options_carry_database_and_user() {
        let options: TokioPgConnectOptions = config().with_db();
        assert_eq!(options.get_dbname(), Some("mirror"));
        assert_eq!(options.get_user(), Some("postgres"));
        assert_eq!(options.get_application_name(), Some(APP_NAME_MIRROR));
    }

    #[test]
    fn tls_validation_requires_certs() {
        let tls = TlsConfig {
            trusted_root_certs: "".to_owned(),
            enabled: true,
        };
        assert!(tls.validate().is_err());
        assert!(TlsConfig::disabled().validate().is_ok());
    }
}
