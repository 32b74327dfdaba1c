//! Server settings file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use courier_smtp::{AuthMechanism, Security, SessionConfig};
use serde::Deserialize;

/// Server settings as stored in the JSON settings file.
///
/// ```json
/// {
///   "host": "smtp.example.com",
///   "security": "starttls",
///   "username": "alice@example.com",
///   "mechanism": "LOGIN"
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    /// Server hostname.
    pub host: String,
    /// Server port; defaults from `security`.
    pub port: Option<u16>,
    /// Security mode.
    pub security: Security,
    /// Username; authentication is skipped without one.
    pub username: Option<String>,
    /// Password or token. Prefer `COURIER_SECRET`.
    pub secret: Option<String>,
    /// SASL mechanism.
    pub mechanism: AuthMechanism,
    /// Mechanism tried if `mechanism` is not offered.
    pub fallback_mechanism: Option<AuthMechanism>,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Upload timeout in seconds.
    pub upload_timeout_secs: Option<u64>,
    /// Name sent with EHLO.
    pub client_id: Option<String>,
}

impl ServerSettings {
    /// Reads settings from a JSON file.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    fn parse(contents: &str) -> anyhow::Result<Self> {
        let settings: Self = serde_json::from_str(contents)?;
        if settings.host.trim().is_empty() {
            bail!("`host` is required");
        }
        Ok(settings)
    }

    /// Builds the session configuration. `secret` overrides the secret
    /// from the file.
    pub fn into_config(self, secret: Option<String>) -> anyhow::Result<SessionConfig> {
        let mut builder = SessionConfig::builder(self.host)
            .security(self.security)
            .mechanism(self.mechanism);

        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(fallback) = self.fallback_mechanism {
            builder = builder.fallback_mechanism(fallback);
        }
        if let Some(secs) = self.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.upload_timeout_secs {
            builder = builder.upload_timeout(Duration::from_secs(secs));
        }
        if let Some(client_id) = self.client_id {
            builder = builder.client_id(client_id);
        }
        if let Some(username) = self.username {
            let Some(secret) = secret.or(self.secret) else {
                bail!("No secret for {username}: set COURIER_SECRET or `secret`");
            };
            builder = builder.credentials(username, secret);
        }

        Ok(builder.build())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn minimal_settings_use_defaults() {
        let settings = ServerSettings::parse(r#"{"host": "smtp.example.com"}"#).unwrap();
        let config = settings.into_config(None).unwrap();

        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.security, Security::Tls);
        assert_eq!(config.port, 465);
        assert!(!config.uses_auth());
    }

    #[test]
    fn full_settings() {
        let settings = ServerSettings::parse(
            r#"{
                "host": "smtp.example.com",
                "port": 2525,
                "security": "starttls",
                "username": "alice@example.com",
                "secret": "from-file",
                "mechanism": "CRAM-MD5",
                "fallback_mechanism": "LOGIN",
                "connect_timeout_secs": 10,
                "upload_timeout_secs": 300,
                "client_id": "laptop.example.com"
            }"#,
        )
        .unwrap();
        let config = settings.into_config(None).unwrap();

        assert_eq!(config.port, 2525);
        assert_eq!(config.security, Security::StartTls);
        assert_eq!(config.mechanism, AuthMechanism::CramMd5);
        assert_eq!(config.fallback_mechanism, Some(AuthMechanism::Login));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.upload_timeout, Duration::from_secs(300));
        assert_eq!(config.client_id, "laptop.example.com");
        assert_eq!(config.credentials.unwrap().username(), "alice@example.com");
    }

    #[test]
    fn secret_argument_wins_over_file() {
        let settings = ServerSettings::parse(
            r#"{"host": "h.example.com", "username": "a@example.com", "secret": "old"}"#,
        )
        .unwrap();
        let config = settings.into_config(Some("new".into())).unwrap();
        assert_eq!(
            config.credentials,
            Some(courier_smtp::Credentials::new("a@example.com", "new"))
        );
    }

    #[test]
    fn username_without_secret_is_an_error() {
        let settings =
            ServerSettings::parse(r#"{"host": "h.example.com", "username": "a@example.com"}"#)
                .unwrap();
        assert!(settings.into_config(None).is_err());
    }

    #[test]
    fn host_is_required() {
        assert!(ServerSettings::parse(r#"{"port": 25}"#).is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(ServerSettings::parse(r#"{"host": "h", "pasword": "x"}"#).is_err());
    }
}
