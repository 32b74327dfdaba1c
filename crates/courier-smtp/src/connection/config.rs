//! Session configuration types.

use std::time::Duration;

use crate::auth::Credentials;
use crate::body::DEFAULT_CHUNK_SIZE;
use crate::types::AuthMechanism;

/// Default timeout for connecting through authentication.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the message upload.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption (port 25). **Not recommended for production.**
    Plain,
    /// Start with plaintext, upgrade with STARTTLS (port 587).
    StartTls,
    /// TLS from the start (port 465). **Recommended.**
    #[default]
    Tls,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Plain => 25,
            Self::StartTls => 587,
            Self::Tls => 465,
        }
    }
}

/// SMTP session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Credentials; `None` skips authentication.
    pub credentials: Option<Credentials>,
    /// SASL mechanism used when credentials are set.
    pub mechanism: AuthMechanism,
    /// Mechanism tried once if `mechanism` is not supported by the server.
    pub fallback_mechanism: Option<AuthMechanism>,
    /// Deadline for connecting, handshake, authentication and envelope.
    pub connect_timeout: Duration,
    /// Deadline for the DATA transfer.
    pub upload_timeout: Duration,
    /// Name sent with EHLO/HELO.
    pub client_id: String,
    /// Bytes written between progress reports.
    pub chunk_size: usize,
}

impl SessionConfig {
    /// Creates a new configuration with implicit TLS on port 465.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        SessionConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder::new(host)
    }

    /// Returns true if authentication was requested.
    #[must_use]
    pub const fn uses_auth(&self) -> bool {
        self.credentials.is_some()
    }
}

/// Builder for session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    credentials: Option<Credentials>,
    mechanism: AuthMechanism,
    fallback_mechanism: Option<AuthMechanism>,
    connect_timeout: Duration,
    upload_timeout: Duration,
    client_id: Option<String>,
    chunk_size: usize,
}

impl SessionConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::default(),
            credentials: None,
            mechanism: AuthMechanism::default(),
            fallback_mechanism: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            client_id: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Enables authentication with the given username and secret.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, secret: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, secret));
        self
    }

    /// Sets the SASL mechanism.
    #[must_use]
    pub const fn mechanism(mut self, mechanism: AuthMechanism) -> Self {
        self.mechanism = mechanism;
        self
    }

    /// Sets the fallback mechanism.
    #[must_use]
    pub const fn fallback_mechanism(mut self, mechanism: AuthMechanism) -> Self {
        self.fallback_mechanism = Some(mechanism);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the upload timeout.
    #[must_use]
    pub const fn upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    /// Sets the name sent with EHLO.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the progress chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            host: self.host,
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            credentials: self.credentials,
            mechanism: self.mechanism,
            fallback_mechanism: self.fallback_mechanism,
            connect_timeout: self.connect_timeout,
            upload_timeout: self.upload_timeout,
            client_id: self.client_id.unwrap_or_else(local_hostname),
            chunk_size: self.chunk_size.max(1),
        }
    }
}

/// Returns this machine's hostname for EHLO, or `localhost`.
fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty() && name.is_ascii() && !name.contains(char::is_whitespace))
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(Security::Plain.default_port(), 25);
        assert_eq!(Security::StartTls.default_port(), 587);
        assert_eq!(Security::Tls.default_port(), 465);
    }

    #[test]
    fn test_config_new() {
        let config = SessionConfig::new("smtp.example.com");
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 465);
        assert_eq!(config.security, Security::Tls);
        assert!(!config.uses_auth());
        assert_eq!(config.mechanism, AuthMechanism::Plain);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.upload_timeout, DEFAULT_UPLOAD_TIMEOUT);
        assert!(!config.client_id.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::builder("smtp.example.com")
            .port(2525)
            .security(Security::StartTls)
            .credentials("user", "secret")
            .mechanism(AuthMechanism::Login)
            .fallback_mechanism(AuthMechanism::Plain)
            .connect_timeout(Duration::from_secs(10))
            .upload_timeout(Duration::from_secs(120))
            .client_id("client.example.com")
            .chunk_size(0)
            .build();

        assert_eq!(config.port, 2525);
        assert_eq!(config.security, Security::StartTls);
        assert_eq!(config.credentials.unwrap().username(), "user");
        assert_eq!(config.mechanism, AuthMechanism::Login);
        assert_eq!(config.fallback_mechanism, Some(AuthMechanism::Plain));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.upload_timeout, Duration::from_secs(120));
        assert_eq!(config.client_id, "client.example.com");
        assert_eq!(config.chunk_size, 1);
    }

    #[test]
    fn test_config_builder_default_port() {
        let config = SessionConfig::builder("smtp.example.com")
            .security(Security::StartTls)
            .build();

        assert_eq!(config.port, 587);
    }

    #[test]
    fn test_security_serde_names() {
        let parsed: Security = serde_json::from_str("\"starttls\"").unwrap();
        assert_eq!(parsed, Security::StartTls);
        assert_eq!(serde_json::to_string(&Security::Plain).unwrap(), "\"plain\"");
    }
}
