//! EHLO keywords and SASL mechanism names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One capability line from an EHLO reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS (RFC 3207)
    StartTls,
    /// AUTH with the mechanisms this client understands, in server order.
    Auth(Vec<AuthMechanism>),
    /// SIZE with the optional declared limit (RFC 1870).
    Size(Option<usize>),
    /// 8BITMIME (RFC 6152)
    EightBitMime,
    /// PIPELINING
    Pipelining,
    /// CHUNKING
    Chunking,
    /// SMTPUTF8
    SmtpUtf8,
    /// DSN
    Dsn,
    /// BINARYMIME
    BinaryMime,
    /// Anything else, kept verbatim.
    Unknown(String),
}

impl Extension {
    /// Parses one EHLO line (without the reply code).
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let (keyword, args) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(keyword, args)| (keyword, args.trim()));

        // Pre-RFC 2554 servers send `AUTH=LOGIN PLAIN`.
        if let Some(first) = keyword
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("AUTH="))
            .map(|_| &keyword[5..])
        {
            let names = first.split_whitespace().chain(args.split_whitespace());
            return Self::Auth(mechanisms(names));
        }

        match keyword.to_ascii_uppercase().as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(mechanisms(args.split_whitespace())),
            "SIZE" => Self::Size(
                args.split_whitespace()
                    .next()
                    .and_then(|limit| limit.parse().ok()),
            ),
            "8BITMIME" => Self::EightBitMime,
            "PIPELINING" => Self::Pipelining,
            "CHUNKING" => Self::Chunking,
            "SMTPUTF8" => Self::SmtpUtf8,
            "DSN" => Self::Dsn,
            "BINARYMIME" => Self::BinaryMime,
            _ => Self::Unknown(trimmed.to_string()),
        }
    }
}

fn mechanisms<'a>(names: impl Iterator<Item = &'a str>) -> Vec<AuthMechanism> {
    names.filter_map(AuthMechanism::parse).collect()
}

/// SASL mechanisms this client can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AuthMechanism {
    /// PLAIN (RFC 4616)
    #[default]
    #[serde(rename = "PLAIN")]
    Plain,
    /// LOGIN
    #[serde(rename = "LOGIN")]
    Login,
    /// CRAM-MD5 (RFC 2195)
    #[serde(rename = "CRAM-MD5")]
    CramMd5,
    /// `XOAUTH2`
    #[serde(rename = "XOAUTH2")]
    XOAuth2,
    /// `OAUTHBEARER` (RFC 7628)
    #[serde(rename = "OAUTHBEARER")]
    OAuthBearer,
}

impl AuthMechanism {
    /// Every supported mechanism.
    pub const ALL: [Self; 5] = [
        Self::Plain,
        Self::Login,
        Self::CramMd5,
        Self::XOAuth2,
        Self::OAuthBearer,
    ];

    /// Looks up a mechanism by its registered name, ignoring case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|mechanism| mechanism.as_str().eq_ignore_ascii_case(name))
    }

    /// Registered SASL name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
            Self::XOAuth2 => "XOAUTH2",
            Self::OAuthBearer => "OAUTHBEARER",
        }
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use AuthMechanism::{CramMd5, Login, OAuthBearer, Plain, XOAuth2};

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(Extension::parse("starttls"), Extension::StartTls);
        assert_eq!(Extension::parse("8bitmime"), Extension::EightBitMime);
        assert_eq!(Extension::parse(" Pipelining "), Extension::Pipelining);
        assert_eq!(Extension::parse("BinaryMIME"), Extension::BinaryMime);
    }

    #[test]
    fn auth_keeps_server_order_and_drops_unknown() {
        assert_eq!(
            Extension::parse("AUTH GSSAPI LOGIN plain XOAUTH2"),
            Extension::Auth(vec![Login, Plain, XOAuth2])
        );
        assert_eq!(Extension::parse("AUTH"), Extension::Auth(Vec::new()));
    }

    #[test]
    fn legacy_auth_equals_form() {
        assert_eq!(
            Extension::parse("AUTH=LOGIN CRAM-MD5"),
            Extension::Auth(vec![Login, CramMd5])
        );
        assert_eq!(Extension::parse("auth=PLAIN"), Extension::Auth(vec![Plain]));
    }

    #[test]
    fn size_limit() {
        assert_eq!(
            Extension::parse("SIZE 35882577"),
            Extension::Size(Some(35_882_577))
        );
        assert_eq!(Extension::parse("SIZE"), Extension::Size(None));
        assert_eq!(Extension::parse("SIZE lots"), Extension::Size(None));
    }

    #[test]
    fn unrecognised_lines_are_kept() {
        assert_eq!(
            Extension::parse("ENHANCEDSTATUSCODES"),
            Extension::Unknown("ENHANCEDSTATUSCODES".into())
        );
        assert_eq!(Extension::parse(""), Extension::Unknown(String::new()));
    }

    #[test]
    fn mechanism_names_round_trip() {
        for mechanism in AuthMechanism::ALL {
            assert_eq!(AuthMechanism::parse(mechanism.as_str()), Some(mechanism));
            assert_eq!(
                AuthMechanism::parse(&mechanism.as_str().to_lowercase()),
                Some(mechanism)
            );
        }
        assert_eq!(AuthMechanism::parse("NTLM"), None);
    }

    #[test]
    fn settings_use_registered_names() {
        assert_eq!(serde_json::to_string(&CramMd5).unwrap(), "\"CRAM-MD5\"");
        let parsed: AuthMechanism = serde_json::from_str("\"OAUTHBEARER\"").unwrap();
        assert_eq!(parsed, OAuthBearer);
        assert_eq!(AuthMechanism::default(), Plain);
    }
}
