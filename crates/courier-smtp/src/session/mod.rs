//! The SMTP session state machine.
//!
//! A [`Session`] runs exactly one operation, either [`Session::send`] or
//! [`Session::probe`], and then stays in a terminal state:
//!
//! ```text
//! Ready → Connecting → Greeting → (TlsUpgrading) → (Authenticating)
//!       → Envelope → DataTransfer → Quitting → Closed
//! ```
//!
//! Any error moves the session to `Failed`. The connection is closed on
//! every exit path; QUIT is only sent after a successful operation.

mod state;

pub use state::{Deadline, Phase, State};

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::auth;
use crate::body::{self, Progress, ProgressCallback};
use crate::cancel::CancelHandle;
use crate::command::{BodyType, Command};
use crate::connection::{
    Connector, NetworkConnector, Security, ServerInfo, SessionConfig, Transport, guarded,
};
use crate::error::{Error, Result};
use crate::types::{Address, Envelope, Reply, ReplyClass, ReplyCode};

/// Outcome of a successful [`Session::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Recipients accepted by the server.
    pub accepted: Vec<Address>,
    /// Recipients refused by the server, with the refusing reply.
    pub rejected: Vec<(Address, Reply)>,
    /// Final reply to the message data (usually carries a queue id).
    pub reply: Reply,
    /// Bytes of message data written, after dot-stuffing.
    pub bytes: usize,
}

/// One SMTP session.
pub struct Session<C: Connector = NetworkConnector> {
    config: SessionConfig,
    connector: C,
    cancel: CancelHandle,
    progress: Option<ProgressCallback>,
    transitions: Vec<State>,
}

impl Session {
    /// Creates a session that connects over TCP and rustls.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(config, NetworkConnector::new())
    }
}

impl<C: Connector> Session<C> {
    /// Creates a session that opens its connection through `connector`.
    #[must_use]
    pub fn with_connector(config: SessionConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            cancel: CancelHandle::new(),
            progress: None,
            transitions: vec![State::Ready],
        }
    }

    /// Sets a callback invoked after each chunk of message data.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(Progress) + Send + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Returns a handle that cancels this session from another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> State {
        self.transitions.last().copied().unwrap_or(State::Ready)
    }

    /// Returns every state entered so far, starting with `Ready`.
    #[must_use]
    pub fn transitions(&self) -> &[State] {
        &self.transitions
    }

    /// Submits `message` to the recipients of `envelope`.
    ///
    /// `message` is the rendered RFC 5322 message. Line endings are
    /// normalized and the end-of-data marker is added.
    ///
    /// Succeeds if at least one recipient was accepted and the server
    /// accepted the data. Refused recipients are listed in the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the session was already used, the envelope has
    /// no recipients, or any protocol step fails. See [`Error::kind`].
    pub async fn send(&mut self, envelope: &Envelope, message: &[u8]) -> Result<SendReport> {
        self.ensure_ready()?;
        if envelope.recipients().is_empty() {
            return Err(Error::InvalidConfig("Envelope has no recipients".into()));
        }

        let mut slot = None;
        let result = self.run_send(&mut slot, envelope, message).await;
        self.finish(slot, result).await
    }

    /// Connects and authenticates without sending a message.
    ///
    /// Returns the capabilities the server advertised.
    ///
    /// # Errors
    ///
    /// Returns an error if the session was already used or connecting,
    /// TLS, or authentication fails.
    pub async fn probe(&mut self) -> Result<ServerInfo> {
        self.ensure_ready()?;

        let mut slot = None;
        let result = self.run_probe(&mut slot).await;
        self.finish(slot, result).await
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            State::Ready => Ok(()),
            state => Err(Error::InvalidState(format!(
                "Session already used (state {state:?})"
            ))),
        }
    }

    fn enter(&mut self, state: State) {
        tracing::debug!(from = ?self.state(), to = ?state, "Session state transition");
        self.transitions.push(state);
    }

    /// Closes the connection and enters the terminal state for `result`.
    async fn finish<T>(
        &mut self,
        slot: Option<Transport<C::Stream>>,
        result: Result<T>,
    ) -> Result<T> {
        if let Some(mut transport) = slot {
            transport.close().await;
        }

        match &result {
            Ok(_) => self.enter(State::Closed),
            Err(err) => {
                tracing::warn!(error = %err, state = ?self.state(), "SMTP session failed");
                self.enter(State::Failed);
            }
        }
        result
    }

    async fn run_probe(&mut self, slot: &mut Option<Transport<C::Stream>>) -> Result<ServerInfo> {
        let server = self.establish(slot).await?;
        let transport = connected(slot)?;
        self.quit(transport).await;
        tracing::info!(host = %self.config.host, server = %server.hostname, "Probe succeeded");
        Ok(server)
    }

    async fn run_send(
        &mut self,
        slot: &mut Option<Transport<C::Stream>>,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<SendReport> {
        let server = self.establish(slot).await?;
        let transport = connected(slot)?;
        let encoded = body::encode(message);

        self.enter(State::Envelope);
        let deadline = Deadline::after(Phase::Envelope, self.config.connect_timeout);
        let (accepted, rejected) =
            Self::envelope(transport, &server, envelope, message, encoded.len(), deadline).await?;

        self.enter(State::DataTransfer);
        let deadline = Deadline::after(Phase::Upload, self.config.upload_timeout);
        let reply = transport.command(&Command::Data, deadline).await?;
        expect(reply, "DATA", &[ReplyClass::PositiveIntermediate], Error::DataRejected)?;

        let chunk_size = self.config.chunk_size;
        let reply =
            body::stream(transport, &encoded, chunk_size, deadline, self.progress.as_mut()).await?;
        let reply = expect(reply, "DATA", &[ReplyClass::PositiveCompletion], Error::DataRejected)?;

        self.quit(transport).await;
        tracing::info!(
            accepted = accepted.len(),
            rejected = rejected.len(),
            reply = %reply,
            "Message submitted"
        );

        Ok(SendReport {
            accepted,
            rejected,
            reply,
            bytes: encoded.len(),
        })
    }

    /// Runs the phases shared by send and probe: connect, greeting, TLS
    /// upgrade and authentication.
    async fn establish(&mut self, slot: &mut Option<Transport<C::Stream>>) -> Result<ServerInfo> {
        let deadline = Deadline::after(Phase::Connection, self.config.connect_timeout);
        let host = self.config.host.clone();
        let port = self.config.port;
        let security = self.config.security;

        self.enter(State::Connecting);
        tracing::debug!(%host, port, ?security, "Connecting");
        let stream = guarded(
            &self.cancel,
            deadline,
            self.connector.connect(&host, port, security),
        )
        .await?;
        let transport = slot.insert(Transport::new(stream, self.cancel.clone()));

        self.enter(State::Greeting);
        let banner = transport.read_reply(deadline).await?;
        let banner = expect_ready(banner, "greeting", |reply| Error::Handshake {
            command: "greeting",
            reply,
        })?;
        let mut server = ServerInfo::from_greeting(&banner);
        self.hello(transport, &mut server, deadline).await?;

        if security == Security::StartTls {
            self.enter(State::TlsUpgrading);
            self.start_tls(slot, &mut server, deadline).await?;
        }

        if let Some(credentials) = self.config.credentials.clone() {
            self.enter(State::Authenticating);
            let transport = connected(slot)?;
            let used = auth::negotiate(
                transport,
                &server,
                &credentials,
                self.config.mechanism,
                self.config.fallback_mechanism,
                deadline,
            )
            .await?;
            tracing::debug!(mechanism = %used, "Authenticated");
        }

        Ok(server)
    }

    /// Sends EHLO, falling back to HELO where the connection allows it.
    async fn hello(
        &self,
        transport: &mut Transport<C::Stream>,
        server: &mut ServerInfo,
        deadline: Deadline,
    ) -> Result<()> {
        let hostname = self.config.client_id.clone();
        let reply = transport
            .command(&Command::Ehlo { hostname: hostname.clone() }, deadline)
            .await?;

        if reply.is_success() {
            server.update_from_ehlo(&reply);
            return Ok(());
        }

        let ehlo_unknown =
            reply.code == ReplyCode::SYNTAX_ERROR || reply.code == ReplyCode::NOT_IMPLEMENTED;
        if !ehlo_unknown || self.config.security == Security::StartTls {
            return Err(Error::Handshake {
                command: "EHLO",
                reply,
            });
        }

        tracing::debug!(code = reply.code.as_u16(), "EHLO refused, trying HELO");
        let reply = transport.command(&Command::Helo { hostname }, deadline).await?;
        if !reply.is_success() {
            return Err(Error::Handshake {
                command: "HELO",
                reply,
            });
        }
        server.extensions.clear();
        Ok(())
    }

    /// Upgrades the connection in `slot` with STARTTLS and repeats EHLO.
    async fn start_tls(
        &self,
        slot: &mut Option<Transport<C::Stream>>,
        server: &mut ServerInfo,
        deadline: Deadline,
    ) -> Result<()> {
        if !server.supports_starttls() {
            return Err(Error::StartTlsUnsupported);
        }

        let transport = connected(slot)?;
        let reply = transport.command(&Command::StartTls, deadline).await?;
        expect_ready(reply, "STARTTLS", Error::StartTlsRefused)?;
        // Plaintext sent ahead of the handshake must not be read as
        // protected data (CVE-2011-0411).
        if transport.has_buffered_input() {
            return Err(Error::Protocol(
                "Server sent data after STARTTLS reply".into(),
            ));
        }

        let plain = slot
            .take()
            .map(Transport::into_inner)
            .ok_or(Error::ConnectionClosed)?;
        let secure = guarded(
            &self.cancel,
            deadline,
            self.connector.upgrade(plain, &self.config.host),
        )
        .await?;
        let transport = slot.insert(Transport::new(secure, self.cancel.clone()));
        tracing::debug!("STARTTLS upgrade complete");

        self.hello(transport, server, deadline).await
    }

    /// MAIL FROM and RCPT TO. Returns the accepted and refused recipients.
    async fn envelope(
        transport: &mut Transport<C::Stream>,
        server: &ServerInfo,
        envelope: &Envelope,
        message: &[u8],
        size: usize,
        deadline: Deadline,
    ) -> Result<(Vec<Address>, Vec<(Address, Reply)>)> {
        if let Some(limit) = server.max_message_size().filter(|&limit| size > limit) {
            return Err(Error::MessageTooLarge { size, limit });
        }

        let eight_bit = body::is_8bit(message);
        let body = if server.supports_8bitmime() {
            Some(if eight_bit {
                BodyType::EightBitMime
            } else {
                BodyType::SevenBit
            })
        } else {
            if eight_bit {
                tracing::warn!("Sending 8-bit message to a server without 8BITMIME");
            }
            None
        };

        let cmd = Command::MailFrom {
            from: envelope.from().clone(),
            body,
            size: server.advertises_size().then_some(size),
        };
        let reply = transport.command(&cmd, deadline).await?;
        expect(reply, "MAIL FROM", &[ReplyClass::PositiveCompletion], Error::SenderRejected)?;

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for rcpt in envelope.recipients() {
            let reply = transport
                .command(&Command::RcptTo { to: rcpt.clone() }, deadline)
                .await?;
            match reply.class() {
                Some(ReplyClass::PositiveCompletion) => accepted.push(rcpt.clone()),
                Some(ReplyClass::TransientNegative | ReplyClass::PermanentNegative) => {
                    tracing::warn!(recipient = %rcpt, reply = %reply, "Recipient rejected");
                    rejected.push((rcpt.clone(), reply));
                }
                _ => {
                    return Err(Error::UnexpectedReply {
                        command: "RCPT TO",
                        reply,
                    });
                }
            }
        }

        if accepted.is_empty() {
            return Err(Error::RecipientsRejected { rejected });
        }
        Ok((accepted, rejected))
    }

    /// Best-effort QUIT. The reply, or its absence, does not matter.
    async fn quit(&mut self, transport: &mut Transport<C::Stream>) {
        self.enter(State::Quitting);
        let deadline = Deadline::after(Phase::Quit, self.config.connect_timeout);
        match transport.command(&Command::Quit, deadline).await {
            Ok(reply) => tracing::debug!(code = reply.code.as_u16(), "QUIT acknowledged"),
            Err(err) => tracing::debug!(error = %err, "QUIT failed"),
        }
    }
}

impl<C: Connector> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Returns the open connection.
fn connected<S>(slot: &mut Option<Transport<S>>) -> Result<&mut Transport<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    slot.as_mut().ok_or(Error::ConnectionClosed)
}

/// Accepts `reply` if its class is in `accepted`. Negative replies become
/// `rejected(reply)`, anything else is an unexpected reply.
fn expect(
    reply: Reply,
    command: &'static str,
    accepted: &[ReplyClass],
    rejected: impl FnOnce(Reply) -> Error,
) -> Result<Reply> {
    if reply.is_in(accepted) {
        return Ok(reply);
    }
    match reply.class() {
        Some(ReplyClass::TransientNegative | ReplyClass::PermanentNegative) => {
            Err(rejected(reply))
        }
        _ => Err(Error::UnexpectedReply { command, reply }),
    }
}

/// Like [`expect`], but only 220 is accepted.
fn expect_ready(
    reply: Reply,
    command: &'static str,
    rejected: impl FnOnce(Reply) -> Error,
) -> Result<Reply> {
    if reply.code == ReplyCode::SERVICE_READY {
        return Ok(reply);
    }
    expect(reply, command, &[], rejected)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn reply(code: u16) -> Reply {
        Reply::new(ReplyCode::new(code), vec!["text".to_string()])
    }

    #[test]
    fn expect_accepts_listed_classes() {
        let ok = expect(
            reply(354),
            "DATA",
            &[ReplyClass::PositiveIntermediate],
            Error::DataRejected,
        );
        assert_eq!(ok.unwrap().code, ReplyCode::START_DATA);
    }

    #[test]
    fn expect_maps_negative_replies() {
        let err = expect(
            reply(554),
            "DATA",
            &[ReplyClass::PositiveIntermediate],
            Error::DataRejected,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::DataRejected(r) if r.code == ReplyCode::TRANSACTION_FAILED
        ));
    }

    #[test]
    fn expect_flags_out_of_sequence_replies() {
        let err = expect(
            reply(250),
            "DATA",
            &[ReplyClass::PositiveIntermediate],
            Error::DataRejected,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnexpectedReply { command: "DATA", .. }));
    }

    #[test]
    fn only_220_means_ready() {
        let refused = Error::StartTlsRefused;
        assert!(expect_ready(reply(220), "STARTTLS", refused).is_ok());
        assert!(matches!(
            expect_ready(reply(454), "STARTTLS", refused),
            Err(Error::StartTlsRefused(_))
        ));
        assert!(matches!(
            expect_ready(reply(250), "STARTTLS", refused),
            Err(Error::UnexpectedReply { command: "STARTTLS", .. })
        ));
    }

    #[test]
    fn new_session_is_ready() {
        let session = Session::new(SessionConfig::new("smtp.example.com"));
        assert_eq!(session.state(), State::Ready);
        assert_eq!(session.transitions(), &[State::Ready]);
        assert!(!session.cancel_handle().is_cancelled());
    }
}
