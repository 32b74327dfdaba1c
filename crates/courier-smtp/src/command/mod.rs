//! Client commands and their wire form.

use std::fmt::{self, Write};

use crate::types::{Address, AuthMechanism};

/// MAIL FROM `BODY=` parameter (RFC 6152).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// `7BIT`
    SevenBit,
    /// `8BITMIME`
    EightBitMime,
}

impl BodyType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7BIT",
            Self::EightBitMime => "8BITMIME",
        }
    }
}

/// A command line sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO, for servers that reject EHLO.
    Helo {
        /// Name the client announces.
        hostname: String,
    },
    /// EHLO
    Ehlo {
        /// Name the client announces.
        hostname: String,
    },
    /// STARTTLS
    StartTls,
    /// AUTH, optionally with a SASL-IR initial response (RFC 4954).
    Auth {
        /// Mechanism to start.
        mechanism: AuthMechanism,
        /// Base64 initial response; empty is sent as `=`.
        initial_response: Option<String>,
    },
    /// Base64 answer to a 334 challenge, or `*` to abort.
    AuthResponse(String),
    /// MAIL FROM with optional ESMTP parameters.
    MailFrom {
        /// Reverse path.
        from: Address,
        /// `BODY=` parameter.
        body: Option<BodyType>,
        /// `SIZE=` parameter in octets.
        size: Option<usize>,
    },
    /// RCPT TO
    RcptTo {
        /// Forward path.
        to: Address,
    },
    /// DATA
    Data,
    /// QUIT
    Quit,
}

impl Command {
    /// Command name used to label replies in errors.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } | Self::AuthResponse(_) => "AUTH",
            Self::MailFrom { .. } => "MAIL FROM",
            Self::RcptTo { .. } => "RCPT TO",
            Self::Data => "DATA",
            Self::Quit => "QUIT",
        }
    }

    /// Wire form, terminated by CRLF.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut line = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_line(&mut line);
        line.push_str("\r\n");
        line.into_bytes()
    }

    fn write_line(&self, out: &mut impl Write) -> fmt::Result {
        match self {
            Self::Helo { hostname } | Self::Ehlo { hostname } => {
                write!(out, "{} {hostname}", self.verb())
            }
            Self::Auth {
                mechanism,
                initial_response,
            } => {
                write!(out, "AUTH {mechanism}")?;
                match initial_response.as_deref() {
                    Some("") => out.write_str(" ="),
                    Some(response) => write!(out, " {response}"),
                    None => Ok(()),
                }
            }
            Self::AuthResponse(response) => out.write_str(response),
            Self::MailFrom { from, body, size } => {
                write!(out, "MAIL FROM:<{from}>")?;
                if let Some(body) = body {
                    write!(out, " BODY={}", body.as_str())?;
                }
                if let Some(size) = size {
                    write!(out, " SIZE={size}")?;
                }
                Ok(())
            }
            Self::RcptTo { to } => write!(out, "RCPT TO:<{to}>"),
            Self::StartTls | Self::Data | Self::Quit => out.write_str(self.verb()),
        }
    }
}

/// Log rendering. Credentials never appear in it.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth {
                mechanism,
                initial_response: Some(_),
            } => write!(f, "AUTH {mechanism} <redacted>"),
            Self::AuthResponse(_) => f.write_str("<redacted>"),
            _ => self.write_line(f),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn auth(mechanism: AuthMechanism, initial_response: Option<&str>) -> Command {
        Command::Auth {
            mechanism,
            initial_response: initial_response.map(str::to_string),
        }
    }

    #[test]
    fn wire_lines() {
        let cases: Vec<(Command, &[u8])> = vec![
            (
                Command::Ehlo {
                    hostname: "client.example.com".into(),
                },
                b"EHLO client.example.com\r\n",
            ),
            (
                Command::Helo {
                    hostname: "[192.0.2.1]".into(),
                },
                b"HELO [192.0.2.1]\r\n",
            ),
            (Command::StartTls, b"STARTTLS\r\n"),
            (
                Command::RcptTo {
                    to: addr("bob@example.net"),
                },
                b"RCPT TO:<bob@example.net>\r\n",
            ),
            (Command::Data, b"DATA\r\n"),
            (Command::Quit, b"QUIT\r\n"),
        ];
        for (command, expected) in cases {
            assert_eq!(command.serialize(), expected, "{command}");
        }
    }

    #[test]
    fn auth_initial_response_forms() {
        assert_eq!(
            auth(AuthMechanism::Plain, Some("AGFAYgBj")).serialize(),
            b"AUTH PLAIN AGFAYgBj\r\n"
        );
        assert_eq!(
            auth(AuthMechanism::XOAuth2, Some("")).serialize(),
            b"AUTH XOAUTH2 =\r\n"
        );
        assert_eq!(
            auth(AuthMechanism::CramMd5, None).serialize(),
            b"AUTH CRAM-MD5\r\n"
        );
        assert_eq!(Command::AuthResponse("*".into()).serialize(), b"*\r\n");
        assert_eq!(Command::AuthResponse(String::new()).serialize(), b"\r\n");
    }

    #[test]
    fn mail_from_parameters() {
        let bare = Command::MailFrom {
            from: addr("alice@example.org"),
            body: None,
            size: None,
        };
        assert_eq!(bare.serialize(), b"MAIL FROM:<alice@example.org>\r\n");

        let full = Command::MailFrom {
            from: addr("alice@example.org"),
            body: Some(BodyType::SevenBit),
            size: Some(4096),
        };
        assert_eq!(
            full.serialize(),
            b"MAIL FROM:<alice@example.org> BODY=7BIT SIZE=4096\r\n"
        );
    }

    #[test]
    fn display_hides_secrets() {
        assert_eq!(
            auth(AuthMechanism::Plain, Some("AGFAYgBj")).to_string(),
            "AUTH PLAIN <redacted>"
        );
        assert_eq!(auth(AuthMechanism::Login, None).to_string(), "AUTH LOGIN");
        assert_eq!(Command::AuthResponse("c2VjcmV0".into()).to_string(), "<redacted>");
        assert_eq!(
            Command::MailFrom {
                from: addr("alice@example.org"),
                body: Some(BodyType::EightBitMime),
                size: None,
            }
            .to_string(),
            "MAIL FROM:<alice@example.org> BODY=8BITMIME"
        );
    }

    #[test]
    fn verbs_label_replies() {
        assert_eq!(Command::AuthResponse(String::new()).verb(), "AUTH");
        assert_eq!(
            Command::RcptTo {
                to: addr("a@example.com")
            }
            .verb(),
            "RCPT TO"
        );
    }
}
