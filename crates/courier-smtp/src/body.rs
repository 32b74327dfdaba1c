//! Message body transfer for the DATA phase.
//!
//! The payload is normalized to CRLF line endings and dot-stuffed
//! (RFC 5321 section 4.5.2), then written in chunks with a progress
//! callback after each one.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Transport;
use crate::error::Result;
use crate::session::Deadline;
use crate::types::Reply;

/// Default number of bytes written between progress callbacks.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// End-of-data marker. The encoded body always ends with CRLF, so the
/// marker completes the `CRLF . CRLF` sequence.
const END_OF_DATA: &[u8] = b".\r\n";

/// Bytes of the encoded body written so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Bytes written.
    pub sent: usize,
    /// Size of the encoded body.
    pub total: usize,
}

/// Observer for upload progress. Runs on the session's task, so it must be
/// cheap.
pub type ProgressCallback = Box<dyn FnMut(Progress) + Send>;

/// Converts a message to its DATA wire form.
///
/// Every line ends with CRLF (bare LF is converted) and lines starting with
/// `.` get a second one. A final line without a line ending is terminated.
#[must_use]
pub fn encode(message: &[u8]) -> Vec<u8> {
    if message.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(message.len() + message.len() / 64 + 2);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Returns true if the message contains bytes outside 7-bit ASCII.
#[must_use]
pub fn is_8bit(message: &[u8]) -> bool {
    !message.is_ascii()
}

/// Writes an [`encode`]d body followed by the end-of-data marker and
/// returns the server's final reply.
///
/// The caller must already have received the 354 reply to DATA.
///
/// # Errors
///
/// Returns an error if writing or reading fails, the deadline passes, or
/// the session is cancelled.
pub async fn stream<S>(
    transport: &mut Transport<S>,
    encoded: &[u8],
    chunk_size: usize,
    deadline: Deadline,
    mut progress: Option<&mut ProgressCallback>,
) -> Result<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let total = encoded.len();
    let mut sent = 0;

    for chunk in encoded.chunks(chunk_size.max(1)) {
        transport.write_all(chunk, deadline).await?;
        sent += chunk.len();
        if let Some(callback) = progress.as_mut() {
            callback(Progress { sent, total });
        }
    }

    transport.write_all(END_OF_DATA, deadline).await?;
    tracing::debug!(bytes = total, "Message body sent");
    transport.read_reply(deadline).await
}
