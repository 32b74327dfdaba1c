//! Deadline-guarded, cancellable line I/O.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::Instant;

use crate::cancel::CancelHandle;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::ReplyAssembler;
use crate::session::Deadline;
use crate::types::Reply;

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum reply line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 4096;

/// Upper bound on the shutdown handshake when closing.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs `fut` unless the session is cancelled or the deadline passes first.
pub(crate) async fn guarded<T, F>(cancel: &CancelHandle, deadline: Deadline, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    // timeout_at polls `fut` once before looking at the clock.
    if Instant::now() >= deadline.at() {
        return Err(deadline.expired());
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        res = tokio::time::timeout_at(deadline.at(), fut) => {
            res.unwrap_or_else(|_| Err(deadline.expired()))
        }
    }
}

/// An open SMTP connection.
///
/// Every read and write takes the deadline of the current phase and
/// stops early when the session's [`CancelHandle`] fires.
#[derive(Debug)]
pub struct Transport<S> {
    reader: BufReader<S>,
    cancel: CancelHandle,
    bytes_written: usize,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    pub fn new(stream: S, cancel: CancelHandle) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            cancel,
            bytes_written: 0,
        }
    }

    /// Reads one line, without its line ending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] on EOF, [`Error::Timeout`] or
    /// [`Error::Cancelled`] if interrupted, and a protocol error for
    /// overlong lines.
    pub async fn read_line(&mut self, deadline: Deadline) -> Result<String> {
        let mut buf = Vec::new();
        let reader = &mut self.reader;
        let limit = MAX_LINE_LENGTH as u64 + 1;

        guarded(&self.cancel, deadline, async {
            reader.take(limit).read_until(b'\n', &mut buf).await?;
            Ok(())
        })
        .await?;

        if buf.last() != Some(&b'\n') {
            if buf.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol(format!(
                    "Reply line exceeds {MAX_LINE_LENGTH} bytes"
                )));
            }
            return Err(Error::ConnectionClosed);
        }

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        tracing::trace!("S: {line}");
        Ok(line)
    }

    /// Reads a complete, possibly multi-line, reply.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the reply is malformed.
    pub async fn read_reply(&mut self, deadline: Deadline) -> Result<Reply> {
        let mut assembler = ReplyAssembler::new();
        loop {
            let line = self.read_line(deadline).await?;
            if let Some(reply) = assembler.push(&line)? {
                return Ok(reply);
            }
        }
    }

    /// Writes and flushes `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails, times out or is cancelled.
    pub async fn write_all(&mut self, data: &[u8], deadline: Deadline) -> Result<()> {
        let stream = self.reader.get_mut();
        guarded(&self.cancel, deadline, async {
            stream.write_all(data).await?;
            stream.flush().await?;
            Ok(())
        })
        .await?;
        self.bytes_written += data.len();
        Ok(())
    }

    /// Sends a command without waiting for the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn send(&mut self, cmd: &Command, deadline: Deadline) -> Result<()> {
        tracing::trace!("C: {cmd}");
        self.write_all(&cmd.serialize(), deadline).await
    }

    /// Sends a command and reads its reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or read fails.
    pub async fn command(&mut self, cmd: &Command, deadline: Deadline) -> Result<Reply> {
        self.send(cmd, deadline).await?;
        self.read_reply(deadline).await
    }

    /// Returns true if the server sent bytes that have not been read yet.
    #[must_use]
    pub fn has_buffered_input(&self) -> bool {
        !self.reader.buffer().is_empty()
    }

    /// Total bytes written to the stream.
    #[must_use]
    pub const fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Returns the underlying stream. Buffered input is discarded.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    /// Shuts the stream down, ignoring errors.
    pub async fn close(&mut self) {
        let stream = self.reader.get_mut();
        if tokio::time::timeout(CLOSE_TIMEOUT, stream.shutdown())
            .await
            .is_err()
        {
            tracing::debug!("Stream shutdown timed out");
        }
    }
}
