//! SMTP response parser.
//!
//! SMTP replies can be single-line or multi-line:
//! - Single: `250 OK\r\n`
//! - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
//!
//! Every line of a multi-line reply must carry the same code.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// One parsed reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyLine<'a> {
    /// Reply code.
    pub code: ReplyCode,
    /// True if this is the final line of the reply.
    pub last: bool,
    /// Text after the separator.
    pub text: &'a str,
}

/// Parses a single reply line (without its CRLF).
///
/// # Errors
///
/// Returns an error if the line has no three-digit code or an invalid
/// separator.
pub fn parse_line(line: &str) -> Result<ReplyLine<'_>> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 {
        return Err(Error::Protocol(format!("Reply too short: {line:?}")));
    }

    if !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(Error::Protocol(format!("Invalid reply code: {line:?}")));
    }
    let code = u16::from(bytes[0] - b'0') * 100
        + u16::from(bytes[1] - b'0') * 10
        + u16::from(bytes[2] - b'0');

    let last = match bytes.get(3) {
        None | Some(b' ') => true,
        Some(b'-') => false,
        Some(_) => {
            return Err(Error::Protocol(format!("Malformed reply line: {line:?}")));
        }
    };

    Ok(ReplyLine {
        code: ReplyCode::new(code),
        last,
        text: line.get(4..).unwrap_or(""),
    })
}

/// Collects reply lines into a [`Reply`].
#[derive(Debug, Default)]
pub struct ReplyAssembler {
    code: Option<ReplyCode>,
    message: Vec<String>,
}

impl ReplyAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line. Returns the complete reply after its final line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is malformed or its code differs from
    /// the first line's.
    pub fn push(&mut self, line: &str) -> Result<Option<Reply>> {
        let parsed = parse_line(line)?;

        match self.code {
            Some(code) if code != parsed.code => {
                return Err(Error::Protocol(format!(
                    "Reply code changed from {code} to {} within a multi-line reply",
                    parsed.code
                )));
            }
            Some(_) => {}
            None => self.code = Some(parsed.code),
        }

        self.message.push(parsed.text.to_string());

        if parsed.last {
            let message = std::mem::take(&mut self.message);
            self.code = None;
            return Ok(Some(Reply::new(parsed.code, message)));
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn assemble(lines: &[&str]) -> Result<Option<Reply>> {
        let mut assembler = ReplyAssembler::new();
        let mut reply = None;
        for line in lines {
            reply = assembler.push(line)?;
        }
        Ok(reply)
    }

    #[test]
    fn test_parse_single_line_reply() {
        let reply = assemble(&["250 OK"]).unwrap().unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["OK"]);
        assert!(reply.is_success());
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let reply = assemble(&["250-First line", "250-Second line", "250 Last line"])
            .unwrap()
            .unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["First line", "Second line", "Last line"]);
    }

    #[test]
    fn test_incomplete_reply() {
        assert!(assemble(&["250-First line"]).unwrap().is_none());
    }

    #[test]
    fn test_code_only_line() {
        let reply = assemble(&["354"]).unwrap().unwrap();
        assert_eq!(reply.code, ReplyCode::START_DATA);
        assert_eq!(reply.message, vec![""]);
    }

    #[test]
    fn test_mismatched_codes() {
        let err = assemble(&["250-First", "251 Second"]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_assembler_resets_between_replies() {
        let mut assembler = ReplyAssembler::new();
        assert!(assembler.push("334 VXNlcm5hbWU6").unwrap().is_some());
        let reply = assembler.push("235 ok").unwrap().unwrap();
        assert_eq!(reply.code, ReplyCode::AUTH_SUCCEEDED);
        assert_eq!(reply.message, vec!["ok"]);
    }

    #[test]
    fn test_parse_line_flags() {
        assert!(parse_line("250 OK").unwrap().last);
        assert!(!parse_line("250-Continuing").unwrap().last);
        assert_eq!(parse_line("250-SIZE 100").unwrap().text, "SIZE 100");
    }

    #[test]
    fn test_parse_error_too_short() {
        assert!(parse_line("25").is_err());
        assert!(parse_line("").is_err());
    }

    #[test]
    fn test_parse_error_invalid_code() {
        assert!(parse_line("ABC OK").is_err());
        assert!(parse_line("2x0 OK").is_err());
    }

    #[test]
    fn test_parse_error_bad_separator() {
        assert!(parse_line("250+OK").is_err());
    }
}
