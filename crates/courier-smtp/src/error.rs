//! Error types for SMTP sessions.

use std::io;
use std::time::Duration;

use crate::session::Phase;
use crate::types::{Address, AuthMechanism, Reply};

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP session errors.
///
/// Every error is terminal for the session that produced it. Retrying is
/// up to the caller, with a new session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// TCP connection could not be established.
    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server closed the connection.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Greeting, EHLO or HELO was refused.
    #[error("Server refused {command}: {reply}")]
    Handshake {
        /// The refused command (or `greeting`).
        command: &'static str,
        /// Server reply.
        reply: Reply,
    },

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(#[source] io::Error),

    /// STARTTLS requested but not advertised.
    #[error("Server does not support STARTTLS")]
    StartTlsUnsupported,

    /// STARTTLS command refused.
    #[error("Server refused STARTTLS: {0}")]
    StartTlsRefused(Reply),

    /// Credentials rejected or exchange failed.
    #[error("Authentication failed: {message}")]
    Auth {
        /// Description of the failure.
        message: String,
        /// Last server reply, if any.
        reply: Option<Reply>,
    },

    /// Selected mechanism is not available on the server.
    #[error("Server does not support AUTH {mechanism}")]
    AuthUnsupported {
        /// The rejected mechanism.
        mechanism: AuthMechanism,
        /// Server reply, when the server refused the AUTH command itself.
        reply: Option<Reply>,
    },

    /// MAIL FROM rejected.
    #[error("Sender rejected: {0}")]
    SenderRejected(Reply),

    /// Every RCPT TO was rejected.
    #[error("All {} recipients rejected", rejected.len())]
    RecipientsRejected {
        /// Each recipient with the reply that rejected it.
        rejected: Vec<(Address, Reply)>,
    },

    /// DATA command or final submission rejected.
    #[error("Message rejected: {0}")]
    DataRejected(Reply),

    /// Message exceeds the server's advertised SIZE.
    #[error("Message exceeds size limit: {size} > {limit} bytes")]
    MessageTooLarge {
        /// Message size in bytes.
        size: usize,
        /// Advertised limit.
        limit: usize,
    },

    /// A phase deadline expired.
    #[error("{phase} phase timed out after {limit:?}")]
    Timeout {
        /// Phase whose deadline expired.
        phase: Phase,
        /// Configured limit for that phase.
        limit: Duration,
    },

    /// The caller cancelled the session.
    #[error("Cancelled")]
    Cancelled,

    /// Malformed reply.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Well-formed reply outside the expected classes.
    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply {
        /// The command that was answered.
        command: &'static str,
        /// Server reply.
        reply: Reply,
    },

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Invalid session configuration or input.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),
}

/// Failure category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// DNS/TCP failure, disconnect, or refused greeting.
    Connect,
    /// TLS handshake failure or STARTTLS unavailable.
    Tls,
    /// Credentials rejected or mechanism unsupported.
    Auth,
    /// Sender or all recipients rejected.
    Envelope,
    /// DATA or final submission rejected.
    Data,
    /// Phase deadline exceeded.
    Timeout,
    /// User-initiated abort.
    Cancelled,
    /// Malformed or out-of-sequence reply.
    Protocol,
    /// Caller input rejected before any I/O.
    InvalidInput,
}

impl Error {
    /// Returns the failure category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect { .. }
            | Self::Io(_)
            | Self::ConnectionClosed
            | Self::Handshake { .. } => ErrorKind::Connect,
            Self::InvalidDnsName(_)
            | Self::TlsHandshake(_)
            | Self::StartTlsUnsupported
            | Self::StartTlsRefused(_) => ErrorKind::Tls,
            Self::Auth { .. } | Self::AuthUnsupported { .. } => ErrorKind::Auth,
            Self::SenderRejected(_) | Self::RecipientsRejected { .. } => ErrorKind::Envelope,
            Self::DataRejected(_) | Self::MessageTooLarge { .. } => ErrorKind::Data,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Protocol(_) | Self::UnexpectedReply { .. } => ErrorKind::Protocol,
            Self::InvalidAddress(_) | Self::InvalidConfig(_) | Self::InvalidState(_) => {
                ErrorKind::InvalidInput
            }
        }
    }

    /// Returns the last server reply involved in this error, if any.
    #[must_use]
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            Self::Handshake { reply, .. }
            | Self::UnexpectedReply { reply, .. }
            | Self::StartTlsRefused(reply)
            | Self::SenderRejected(reply)
            | Self::DataRejected(reply) => Some(reply),
            Self::Auth { reply, .. } | Self::AuthUnsupported { reply, .. } => reply.as_ref(),
            Self::RecipientsRejected { rejected } => rejected.last().map(|(_, reply)| reply),
            _ => None,
        }
    }

    /// Creates an authentication error.
    pub(crate) fn auth(message: impl Into<String>, reply: Option<Reply>) -> Self {
        Self::Auth {
            message: message.into(),
            reply,
        }
    }

    /// Returns true if the server reply behind this error is permanent (5xx).
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.reply().is_some_and(Reply::is_permanent_error)
    }

    /// Returns true if the server reply behind this error is transient (4xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.reply().is_some_and(Reply::is_transient_error)
    }
}
