use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Configuration for connecting to a Postgres database.
///
/// This struct holds all necessary connection parameters. It intentionally
/// does not implement `Serialize` to avoid accidentally leaking the password
/// into serialized forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port number on which the Postgres server is listening.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name of the Postgres database to connect to.
    pub name: String,
    /// Username for authenticating with the Postgres server.
    pub username: String,
    /// Password for the specified user. Redacted in debug output.
    #[serde(default)]
    pub password: Option<SecretString>,
}

fn default_port() -> u16 {
    5432
}

impl PgConnectionConfig {
    /// Returns the driver connection options for this configuration.
    pub fn client_config(&self) -> postgres::Config {
        let mut config = postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.name)
            .user(&self.username);
        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }
        config
    }
}

impl Default for PgConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: default_port(),
            name: "postgres".to_string(),
            username: "postgres".to_string(),
            password: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_redacted_in_debug_output() {
        let config = PgConnectionConfig {
            password: Some(SecretString::new("hunter2".to_string())),
            ..PgConnectionConfig::default()
        };

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let config: PgConnectionConfig = serde_json::from_str(
            r#"{"host": "db.internal", "name": "warehouse", "username": "reader"}"#,
        )
        .unwrap();

        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 5432);
        assert!(config.password.is_none());
    }
}
