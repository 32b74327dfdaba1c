//! SASL authentication (RFC 4954).
//!
//! The mechanism is always chosen by the caller. The server's AUTH list is
//! only used to refuse early when the mechanism is not offered.

pub mod sasl;

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::command::Command;
use crate::connection::{ServerInfo, Transport};
use crate::error::{Error, Result};
use crate::session::Deadline;
use crate::types::{AuthMechanism, Reply, ReplyClass, ReplyCode};

use sasl::OAuthError;

/// Upper bound on 334 challenges in one exchange.
const MAX_CHALLENGES: usize = 10;

/// Username and secret (password or `OAuth2` access token).
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    secret: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl AuthMechanism {
    fn initial_response(self, credentials: &Credentials) -> Option<String> {
        let Credentials { username, secret } = credentials;
        match self {
            Self::Plain => Some(sasl::plain_response(username, secret)),
            Self::XOAuth2 => Some(sasl::xoauth2_response(username, secret)),
            Self::OAuthBearer => Some(sasl::oauthbearer_response(username, secret)),
            Self::Login | Self::CramMd5 => None,
        }
    }
}

/// Challenge/response transcript of one mechanism attempt.
///
/// Only challenges are kept; responses carry credentials.
#[derive(Debug)]
pub struct AuthExchange {
    mechanism: AuthMechanism,
    challenges: Vec<Vec<u8>>,
    oauth_error: Option<OAuthError>,
}

impl AuthExchange {
    /// Starts an exchange.
    #[must_use]
    pub const fn new(mechanism: AuthMechanism) -> Self {
        Self {
            mechanism,
            challenges: Vec::new(),
            oauth_error: None,
        }
    }

    /// Returns the mechanism.
    #[must_use]
    pub const fn mechanism(&self) -> AuthMechanism {
        self.mechanism
    }

    /// Returns the decoded challenges received so far.
    #[must_use]
    pub fn challenges(&self) -> &[Vec<u8>] {
        &self.challenges
    }

    /// Records `challenge` and computes the base64 answer.
    ///
    /// # Errors
    ///
    /// Returns an auth error if the mechanism does not expect another
    /// challenge.
    pub fn respond(&mut self, credentials: &Credentials, challenge: Vec<u8>) -> Result<String> {
        let round = self.challenges.len();
        let answer = match self.mechanism {
            AuthMechanism::Plain if round == 0 && challenge.is_empty() => Some(
                sasl::plain_response(&credentials.username, &credentials.secret),
            ),
            AuthMechanism::Login => login_answer(credentials, &challenge, round).map(sasl::encode),
            AuthMechanism::CramMd5 if round == 0 => Some(
                sasl::cram_md5_response(&credentials.username, &credentials.secret, &challenge)
                    .map_err(|e| Error::auth(format!("CRAM-MD5 digest failed: {e}"), None))?,
            ),
            AuthMechanism::XOAuth2 | AuthMechanism::OAuthBearer if round == 0 => {
                // The challenge is a JSON error; answering lets the server
                // send its final failure reply.
                self.oauth_error = sasl::parse_oauth_error(&challenge).ok();
                Some(if self.mechanism == AuthMechanism::XOAuth2 {
                    String::new()
                } else {
                    sasl::encode([0x01])
                })
            }
            _ => None,
        };

        self.challenges.push(challenge);
        answer.ok_or_else(|| {
            Error::auth(
                format!("Unexpected challenge for {} in round {}", self.mechanism, round + 1),
                None,
            )
        })
    }

    fn failure(&self, reply: Reply) -> Error {
        let mut message = format!("{} rejected: {reply}", self.mechanism);
        if let Some(oauth) = &self.oauth_error {
            message.push_str(&format!(" (OAuth status {})", oauth.status));
        }
        Error::auth(message, Some(reply))
    }
}

/// Picks the LOGIN answer by prompt text, falling back to the round.
fn login_answer<'a>(credentials: &'a Credentials, prompt: &[u8], round: usize) -> Option<&'a str> {
    let prompt = String::from_utf8_lossy(prompt);
    let prompt = prompt.trim().trim_end_matches(':').to_ascii_lowercase();
    match prompt.as_str() {
        "username" | "user name" => Some(&credentials.username),
        "password" => Some(&credentials.secret),
        _ => match round {
            0 => Some(&credentials.username),
            1 => Some(&credentials.secret),
            _ => None,
        },
    }
}

/// Authenticates with `mechanism`, trying `fallback` once if the server
/// does not support the first choice.
///
/// Returns the mechanism that succeeded.
///
/// # Errors
///
/// Returns [`Error::Auth`] if the credentials are rejected,
/// [`Error::AuthUnsupported`] if neither mechanism is available, and any
/// transport error.
pub async fn negotiate<S>(
    transport: &mut Transport<S>,
    server: &ServerInfo,
    credentials: &Credentials,
    mechanism: AuthMechanism,
    fallback: Option<AuthMechanism>,
    deadline: Deadline,
) -> Result<AuthMechanism>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let first = authenticate(transport, server, credentials, mechanism, deadline).await;
    match (first, fallback) {
        (Err(Error::AuthUnsupported { .. }), Some(fallback)) if fallback != mechanism => {
            tracing::warn!(%mechanism, %fallback, "Mechanism unsupported, trying fallback");
            authenticate(transport, server, credentials, fallback, deadline).await?;
            Ok(fallback)
        }
        (result, _) => result.map(|()| mechanism),
    }
}

async fn authenticate<S>(
    transport: &mut Transport<S>,
    server: &ServerInfo,
    credentials: &Credentials,
    mechanism: AuthMechanism,
    deadline: Deadline,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(advertised) = server.auth_mechanisms() {
        if !advertised.contains(&mechanism) {
            return Err(Error::AuthUnsupported {
                mechanism,
                reply: None,
            });
        }
    }

    tracing::debug!(%mechanism, username = credentials.username(), "Authenticating");
    let mut exchange = AuthExchange::new(mechanism);
    let cmd = Command::Auth {
        mechanism,
        initial_response: mechanism.initial_response(credentials),
    };
    let mut reply = transport.command(&cmd, deadline).await?;

    // 504 rejects only this mechanism; 502 (no AUTH at all) is a failure.
    if reply.code == ReplyCode::PARAMETER_NOT_IMPLEMENTED {
        return Err(Error::AuthUnsupported {
            mechanism,
            reply: Some(reply),
        });
    }

    loop {
        match reply.class() {
            Some(ReplyClass::PositiveCompletion) => {
                tracing::debug!(%mechanism, "Authentication succeeded");
                return Ok(());
            }
            Some(ReplyClass::PositiveIntermediate) if reply.code == ReplyCode::AUTH_CONTINUE => {
                if exchange.challenges().len() >= MAX_CHALLENGES {
                    return Err(Error::auth("Too many authentication challenges", Some(reply)));
                }
                let challenge = sasl::decode(reply.first_line()).map_err(|e| {
                    Error::Protocol(format!("Invalid base64 in AUTH challenge: {e}"))
                })?;
                let answer = match exchange.respond(credentials, challenge) {
                    Ok(answer) => answer,
                    Err(err) => {
                        abort(transport, deadline).await?;
                        return Err(err);
                    }
                };
                reply = transport
                    .command(&Command::AuthResponse(answer), deadline)
                    .await?;
            }
            Some(ReplyClass::TransientNegative | ReplyClass::PermanentNegative) => {
                return Err(exchange.failure(reply));
            }
            _ => {
                return Err(Error::UnexpectedReply {
                    command: "AUTH",
                    reply,
                });
            }
        }
    }
}

/// Cancels a running exchange with `*` (RFC 4954 section 4).
async fn abort<S>(transport: &mut Transport<S>, deadline: Deadline) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reply = transport
        .command(&Command::AuthResponse("*".to_string()), deadline)
        .await?;
    tracing::debug!(code = reply.code.as_u16(), "Authentication exchange aborted");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cancel::CancelHandle;
    use crate::session::Phase;
    use crate::types::Extension;
    use std::time::Duration;
    use tokio_test::io::Builder;

    fn creds() -> Credentials {
        Credentials::new("alice", "wonderland")
    }

    fn deadline() -> Deadline {
        Deadline::after(Phase::Connection, Duration::from_secs(30))
    }

    fn server(mechanisms: &[AuthMechanism]) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.extensions.insert(Extension::Auth(mechanisms.to_vec()));
        info
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let debug = format!("{:?}", creds());
        assert!(debug.contains("alice"));
        assert!(!debug.contains("wonderland"));
    }

    #[test]
    fn login_answers_by_prompt() {
        let mut exchange = AuthExchange::new(AuthMechanism::Login);
        let user = exchange.respond(&creds(), b"Username:".to_vec()).unwrap();
        let pass = exchange.respond(&creds(), b"Password:".to_vec()).unwrap();
        assert_eq!(sasl::decode(&user).unwrap(), b"alice");
        assert_eq!(sasl::decode(&pass).unwrap(), b"wonderland");
        assert!(exchange.respond(&creds(), b"More?".to_vec()).is_err());
        assert_eq!(exchange.challenges().len(), 3);
    }

    #[test]
    fn plain_rejects_non_empty_challenge() {
        let mut exchange = AuthExchange::new(AuthMechanism::Plain);
        assert!(exchange.respond(&creds(), b"huh".to_vec()).is_err());
    }

    #[test]
    fn oauth_error_challenge_is_recorded() {
        let mut exchange = AuthExchange::new(AuthMechanism::XOAuth2);
        let answer = exchange
            .respond(&creds(), br#"{"status":"401","schemes":"bearer"}"#.to_vec())
            .unwrap();
        assert_eq!(answer, "");

        let err = exchange.failure(Reply::new(
            ReplyCode::AUTH_FAILED,
            vec!["5.7.8 Username and Password not accepted".to_string()],
        ));
        assert!(err.to_string().contains("OAuth status 401"));
    }

    #[tokio::test]
    async fn plain_success() {
        let mock = Builder::new()
            .write(b"AUTH PLAIN AGFsaWNlAHdvbmRlcmxhbmQ=\r\n")
            .read(b"235 2.7.0 Authentication successful\r\n")
            .build();
        let mut transport = Transport::new(mock, CancelHandle::new());

        let used = negotiate(
            &mut transport,
            &server(&[AuthMechanism::Plain]),
            &creds(),
            AuthMechanism::Plain,
            None,
            deadline(),
        )
        .await
        .unwrap();
        assert_eq!(used, AuthMechanism::Plain);
    }

    #[tokio::test]
    async fn login_exchange() {
        let mock = Builder::new()
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"YWxpY2U=\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"d29uZGVybGFuZA==\r\n")
            .read(b"235 ok\r\n")
            .build();
        let mut transport = Transport::new(mock, CancelHandle::new());

        negotiate(
            &mut transport,
            &server(&[AuthMechanism::Login]),
            &creds(),
            AuthMechanism::Login,
            None,
            deadline(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn rejected_credentials() {
        let mock = Builder::new()
            .write(b"AUTH PLAIN AGFsaWNlAHdvbmRlcmxhbmQ=\r\n")
            .read(b"535 5.7.8 Authentication credentials invalid\r\n")
            .build();
        let mut transport = Transport::new(mock, CancelHandle::new());

        let err = negotiate(
            &mut transport,
            &server(&[AuthMechanism::Plain, AuthMechanism::Login]),
            &creds(),
            AuthMechanism::Plain,
            Some(AuthMechanism::Login),
            deadline(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Auth { .. }));
        assert_eq!(err.reply().unwrap().code, ReplyCode::AUTH_FAILED);
    }

    #[tokio::test]
    async fn unadvertised_mechanism_sends_nothing() {
        let mock = Builder::new().build();
        let mut transport = Transport::new(mock, CancelHandle::new());

        let err = negotiate(
            &mut transport,
            &server(&[AuthMechanism::Login]),
            &creds(),
            AuthMechanism::CramMd5,
            None,
            deadline(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::AuthUnsupported {
                mechanism: AuthMechanism::CramMd5,
                reply: None
            }
        ));
        assert_eq!(transport.bytes_written(), 0);
    }

    #[tokio::test]
    async fn falls_back_once_when_unsupported() {
        let mock = Builder::new()
            .write(b"AUTH PLAIN AGFsaWNlAHdvbmRlcmxhbmQ=\r\n")
            .read(b"504 5.5.4 Unrecognized authentication type\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"YWxpY2U=\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"d29uZGVybGFuZA==\r\n")
            .read(b"235 ok\r\n")
            .build();
        let mut transport = Transport::new(mock, CancelHandle::new());

        // No AUTH advertised, so the server's 504 decides.
        let used = negotiate(
            &mut transport,
            &ServerInfo::default(),
            &creds(),
            AuthMechanism::Plain,
            Some(AuthMechanism::Login),
            deadline(),
        )
        .await
        .unwrap();
        assert_eq!(used, AuthMechanism::Login);
    }

    #[tokio::test]
    async fn auth_not_implemented_does_not_fall_back() {
        let mock = Builder::new()
            .write(b"AUTH PLAIN AGFsaWNlAHdvbmRlcmxhbmQ=\r\n")
            .read(b"502 5.5.1 Command not implemented\r\n")
            .build();
        let mut transport = Transport::new(mock, CancelHandle::new());

        let err = negotiate(
            &mut transport,
            &ServerInfo::default(),
            &creds(),
            AuthMechanism::Plain,
            Some(AuthMechanism::Login),
            deadline(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
        assert_eq!(err.reply().unwrap().code, ReplyCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn unexpected_challenge_aborts_exchange() {
        let mock = Builder::new()
            .write(b"AUTH PLAIN AGFsaWNlAHdvbmRlcmxhbmQ=\r\n")
            .read(b"334 YWdhaW4=\r\n")
            .write(b"*\r\n")
            .read(b"501 5.7.0 Authentication aborted\r\n")
            .build();
        let mut transport = Transport::new(mock, CancelHandle::new());

        let err = negotiate(
            &mut transport,
            &server(&[AuthMechanism::Plain]),
            &creds(),
            AuthMechanism::Plain,
            None,
            deadline(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
    }
}
