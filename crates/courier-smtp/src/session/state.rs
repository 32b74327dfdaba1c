//! Session states, phases and deadlines.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::Error;

/// State of a [`Session`](super::Session).
///
/// A session moves forward through these states only. `Closed` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Created, nothing sent yet.
    Ready,
    /// Opening the connection (and implicit TLS handshake).
    Connecting,
    /// Reading the banner and sending EHLO.
    Greeting,
    /// STARTTLS negotiation and the second EHLO.
    TlsUpgrading,
    /// SASL exchange.
    Authenticating,
    /// MAIL FROM and RCPT TO.
    Envelope,
    /// DATA, body and final reply.
    DataTransfer,
    /// QUIT.
    Quitting,
    /// Finished successfully, connection closed.
    Closed,
    /// Finished with an error, connection closed.
    Failed,
}

impl State {
    /// Returns true for `Closed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// A span of states sharing one deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Connecting through authentication; connection timeout.
    Connection,
    /// MAIL FROM and RCPT TO; connection timeout.
    Envelope,
    /// DATA through the final reply; upload timeout.
    Upload,
    /// QUIT; connection timeout.
    Quit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connection => "connection",
            Self::Envelope => "envelope",
            Self::Upload => "upload",
            Self::Quit => "quit",
        })
    }
}

/// Wall-clock deadline for one phase, fixed when the phase starts.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    phase: Phase,
    at: Instant,
    limit: Duration,
}

impl Deadline {
    /// Starts a deadline `limit` from now.
    #[must_use]
    pub fn after(phase: Phase, limit: Duration) -> Self {
        let now = Instant::now();
        // Saturate absurd limits instead of overflowing Instant
        let at = now
            .checked_add(limit)
            .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365));
        Self { phase, at, limit }
    }

    /// Returns the phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the expiry instant.
    #[must_use]
    pub const fn at(&self) -> Instant {
        self.at
    }

    /// Returns the timeout error for this deadline.
    #[must_use]
    pub const fn expired(&self) -> Error {
        Error::Timeout {
            phase: self.phase,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(State::Closed.is_terminal());
        assert!(State::Failed.is_terminal());
        assert!(!State::Quitting.is_terminal());
        assert!(!State::Ready.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_fixed_at_start() {
        let deadline = Deadline::after(Phase::Upload, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(deadline.at() - Instant::now(), Duration::from_secs(6));
        assert_eq!(deadline.phase(), Phase::Upload);
    }

    #[test]
    fn huge_limit_does_not_overflow() {
        let deadline = Deadline::after(Phase::Quit, Duration::MAX);
        assert!(deadline.at() > Instant::now());
        assert!(matches!(
            deadline.expired(),
            Error::Timeout { phase: Phase::Quit, limit } if limit == Duration::MAX
        ));
    }
}
