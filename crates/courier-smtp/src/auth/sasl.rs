//! SASL response encodings.
//!
//! Implements:
//! - PLAIN (RFC 4616) - Basic username/password authentication
//! - CRAM-MD5 (RFC 2195) - HMAC-MD5 keyed challenge digest
//! - OAUTHBEARER (RFC 7628) - Standard `OAuth2` authentication
//! - XOAUTH2 (Google/Microsoft proprietary) - Legacy `OAuth2` authentication
//!
//! All functions return base64 text ready to put on the wire.

use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use md5::Md5;

type HmacMd5 = Hmac<Md5>;

/// Base64-encodes raw response bytes.
#[must_use]
pub fn encode(raw: impl AsRef<[u8]>) -> String {
    STANDARD.encode(raw)
}

/// Decodes a base64 server challenge.
///
/// # Errors
///
/// Returns an error if the challenge is not valid base64.
pub fn decode(challenge: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(challenge.trim())
}

/// Generates PLAIN initial response (RFC 4616).
///
/// Format: `\0<username>\0<password>` (base64 encoded)
///
/// The authorization identity is left empty, meaning "same as the
/// authentication identity".
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    encode(format!("\0{username}\0{password}"))
}

/// Generates the CRAM-MD5 answer to `challenge` (RFC 2195).
///
/// Format: `<username> <hex hmac-md5(password, challenge)>` (base64 encoded)
///
/// # Errors
///
/// Returns an error if the key is rejected by the HMAC implementation.
pub fn cram_md5_response(
    username: &str,
    password: &str,
    challenge: &[u8],
) -> Result<String, InvalidLength> {
    let mut mac = HmacMd5::new_from_slice(password.as_bytes())?;
    mac.update(challenge);
    let digest = mac.finalize().into_bytes();

    let mut answer = String::with_capacity(username.len() + 1 + digest.len() * 2);
    answer.push_str(username);
    answer.push(' ');
    for byte in digest {
        let _ = write!(answer, "{byte:02x}");
    }
    Ok(encode(answer))
}

/// Generates OAUTHBEARER initial response (RFC 7628).
///
/// Format: `n,a=<user>,\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn oauthbearer_response(user: &str, token: &str) -> String {
    encode(format!("n,a={user},\x01auth=Bearer {token}\x01\x01"))
}

/// Generates XOAUTH2 initial response (Google/Microsoft proprietary).
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    encode(format!("user={user}\x01auth=Bearer {token}\x01\x01"))
}

/// Parses an `OAuth2` error challenge from the server.
///
/// `OAuth2` errors are JSON-encoded: `{"status":"401", "schemes":"bearer", "scope":"..."}`
///
/// # Errors
///
/// Returns an error if the challenge cannot be parsed.
pub fn parse_oauth_error(challenge: &[u8]) -> Result<OAuthError, serde_json::Error> {
    serde_json::from_slice(challenge)
}

/// `OAuth2` error response from server.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct OAuthError {
    /// HTTP status code.
    pub status: String,
    /// Authentication schemes supported.
    #[serde(default)]
    pub schemes: Option<String>,
    /// `OAuth2` scope required.
    #[serde(default)]
    pub scope: Option<String>,
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

    fn decoded(response: &str) -> String {
        String::from_utf8(decode(response).unwrap()).unwrap()
    }

    #[test]
    fn test_plain_response_format() {
        assert_eq!(decoded(&plain_response("test", "pass")), "\0test\0pass");
    }

    #[test]
    fn test_plain_response_special_chars() {
        assert_eq!(
            decoded(&plain_response("user", "pass@word!")),
            "\0user\0pass@word!"
        );
    }

    #[test]
    fn test_cram_md5_rfc2195_example() {
        let challenge = b"<1896.697170952@postoffice.reston.mci.net>";
        let response = cram_md5_response("tim", "tanstaaftanstaaf", challenge).unwrap();
        assert_eq!(decoded(&response), "tim b913a602c7eda7a495b4e6e7334d3890");
    }

    #[test]
    fn test_oauthbearer_format() {
        assert_eq!(
            decoded(&oauthbearer_response("test@test.com", "abc")),
            "n,a=test@test.com,\x01auth=Bearer abc\x01\x01"
        );
    }

    #[test]
    fn test_xoauth2_format() {
        assert_eq!(
            decoded(&xoauth2_response("test@test.com", "abc")),
            "user=test@test.com\x01auth=Bearer abc\x01\x01"
        );
    }

    #[test]
    fn test_responses_are_base64() {
        let response = xoauth2_response("user@example.com", "token");
        assert!(!response.contains("user@example.com"));
        assert!(decode(&response).is_ok());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("not base64!").is_err());
        assert_eq!(decode("VXNlcm5hbWU6").unwrap(), b"Username:");
    }

    #[test]
    fn test_parse_oauth_error() {
        let json = br#"{"status":"401","schemes":"bearer","scope":"https://mail.google.com/"}"#;
        let error = parse_oauth_error(json).unwrap();

        assert_eq!(error.status, "401");
        assert_eq!(error.schemes.as_deref(), Some("bearer"));
        assert_eq!(error.scope.as_deref(), Some("https://mail.google.com/"));
    }

    #[test]
    fn test_parse_oauth_error_minimal() {
        let error = parse_oauth_error(br#"{"status":"invalid_token"}"#).unwrap();
        assert_eq!(error.status, "invalid_token");
        assert!(error.scope.is_none());
    }
}
