//! # courier-smtp
//!
//! An SMTP submission client (RFC 5321) built around a single-use session
//! state machine.
//!
//! ## Features
//!
//! - **Connection modes**: plaintext, STARTTLS upgrade and implicit TLS
//! - **Authentication**: PLAIN, LOGIN, CRAM-MD5, XOAUTH2, OAUTHBEARER, with an
//!   optional fallback mechanism
//! - **Partial acceptance**: refused recipients are reported, the message goes
//!   to the rest
//! - **Progress**: callback after each chunk of message data
//! - **Cancellation and timeouts**: a [`CancelHandle`] and per-phase deadlines
//!   interrupt any blocking step
//! - **Extensions**: SIZE, 8BITMIME, AUTH
//!
//! ## Quick Start
//!
//! ```ignore
//! use courier_smtp::{Address, Envelope, Security, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> courier_smtp::Result<()> {
//!     let config = SessionConfig::builder("smtp.example.com")
//!         .security(Security::StartTls)
//!         .credentials("user@example.com", "password")
//!         .build();
//!
//!     let envelope = Envelope::new(
//!         Address::new("user@example.com")?,
//!         [Address::new("friend@example.com")?],
//!     );
//!     let message = b"Subject: Test\r\n\r\nHello, World!\r\n";
//!
//!     let mut session = Session::new(config)
//!         .with_progress(|p| println!("{}/{} bytes", p.sent, p.total));
//!     let report = session.send(&envelope, message).await?;
//!     println!("queued: {}", report.reply);
//!     Ok(())
//! }
//! ```
//!
//! ## Session States
//!
//! ```text
//! Ready ─→ Connecting ─→ Greeting ─→ TlsUpgrading ─→ Authenticating
//!                                     (STARTTLS)      (credentials)
//!                                                          │
//!          Closed ←─ Quitting ←─ DataTransfer ←─ Envelope ←┘
//! ```
//!
//! [`Session::probe`] skips `Envelope` and `DataTransfer`. Any error ends in
//! `Failed`.
//!
//! ## Modules
//!
//! - [`auth`]: Credentials and SASL exchanges
//! - [`body`]: Dot-stuffing and chunked data transfer
//! - [`command`]: SMTP command builders
//! - [`connection`]: Configuration, connectors and guarded line I/O
//! - [`parser`]: Reply line parser
//! - [`session`]: The session state machine
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod body;
mod cancel;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod session;
pub mod types;

pub use auth::Credentials;
pub use body::Progress;
pub use cancel::CancelHandle;
pub use connection::{Connector, NetworkConnector, Security, ServerInfo, SessionConfig};
pub use error::{Error, ErrorKind, Result};
pub use session::{Phase, SendReport, Session, State};
pub use types::{Address, AuthMechanism, Envelope, Extension, Reply, ReplyClass, ReplyCode};
