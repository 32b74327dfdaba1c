//! Connection setup, TLS and deadline-guarded line I/O.

mod config;
mod stream;
mod transport;

pub use config::{Security, SessionConfig, SessionConfigBuilder};
pub use stream::{Connector, NetworkConnector, SmtpStream};
pub use transport::Transport;
pub(crate) use transport::guarded;

use crate::types::{AuthMechanism, Extension, Reply};
use std::collections::HashSet;

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Creates server info from the greeting banner.
    #[must_use]
    pub fn from_greeting(greeting: &Reply) -> Self {
        // Hostname is the first word after the code
        let hostname = greeting
            .first_line()
            .split_whitespace()
            .next()
            .unwrap_or("unknown")
            .to_string();

        Self {
            hostname,
            extensions: HashSet::new(),
        }
    }

    /// Replaces the extensions with those listed in an EHLO reply.
    ///
    /// The first line of the reply is the server greeting and is skipped.
    pub fn update_from_ehlo(&mut self, reply: &Reply) {
        self.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
    }

    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Checks if 8BITMIME is supported.
    #[must_use]
    pub fn supports_8bitmime(&self) -> bool {
        self.supports(&Extension::EightBitMime)
    }

    /// Returns true if the server advertised SIZE, with or without a limit.
    #[must_use]
    pub fn advertises_size(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Size(_)))
    }

    /// Returns the maximum message size, if advertised.
    ///
    /// A limit of zero means no fixed limit (RFC 1870).
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(Some(size)) if *size > 0 => Some(*size),
            _ => None,
        })
    }

    /// Returns advertised authentication mechanisms, or `None` if the
    /// server did not advertise AUTH at all.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Option<&[AuthMechanism]> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Auth(mechanisms) => Some(mechanisms.as_slice()),
            _ => None,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ReplyCode;

    fn ehlo_reply(lines: &[&str]) -> Reply {
        Reply::new(
            ReplyCode::OK,
            lines.iter().map(|line| (*line).to_string()).collect(),
        )
    }

    #[test]
    fn hostname_from_greeting() {
        let greeting = Reply::new(
            ReplyCode::SERVICE_READY,
            vec!["mx.example.com ESMTP ready".to_string()],
        );
        assert_eq!(ServerInfo::from_greeting(&greeting).hostname, "mx.example.com");
    }

    #[test]
    fn extensions_from_ehlo() {
        let mut info = ServerInfo::default();
        info.update_from_ehlo(&ehlo_reply(&[
            "mx.example.com greets you",
            "STARTTLS",
            "SIZE 1000",
            "8BITMIME",
            "AUTH PLAIN LOGIN",
        ]));

        assert!(info.supports_starttls());
        assert!(info.supports_8bitmime());
        assert!(info.advertises_size());
        assert_eq!(info.max_message_size(), Some(1000));
        assert_eq!(
            info.auth_mechanisms().unwrap(),
            &[AuthMechanism::Plain, AuthMechanism::Login]
        );
    }

    #[test]
    fn greeting_line_is_not_an_extension() {
        let mut info = ServerInfo::default();
        info.update_from_ehlo(&ehlo_reply(&["STARTTLS"]));
        assert!(!info.supports_starttls());
        assert!(info.auth_mechanisms().is_none());
    }

    #[test]
    fn size_zero_means_unlimited() {
        let mut info = ServerInfo::default();
        info.update_from_ehlo(&ehlo_reply(&["mx", "SIZE 0"]));
        assert!(info.advertises_size());
        assert_eq!(info.max_message_size(), None);
    }
}
