//! `courier` - submit a message over SMTP or check server credentials.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod settings;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use courier_smtp::{Address, CancelHandle, Envelope, Session};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use settings::ServerSettings;

#[derive(Parser)]
#[command(name = "courier", version)]
#[command(about = "Submit mail over SMTP or check credentials")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Server settings file (JSON)
    #[arg(long, short, default_value = "courier.json")]
    settings: PathBuf,

    /// Password or token; overrides `secret` in the settings file
    #[arg(long, env = "COURIER_SECRET", hide_env_values = true)]
    secret: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Send a rendered RFC 5322 message
    Send {
        /// Envelope sender
        #[arg(long)]
        from: String,

        /// Recipients (repeat or comma-separate)
        #[arg(long, required = true, value_delimiter = ',')]
        to: Vec<String>,

        /// Message file, or `-` for stdin
        #[arg(default_value = "-")]
        message: PathBuf,
    },

    /// Connect and authenticate without sending
    Probe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerSettings::load(&args.settings)
        .await?
        .into_config(args.secret)?;

    let session = Session::new(config)
        .with_progress(|p| info!(sent = p.sent, total = p.total, "Uploading"));
    cancel_on_ctrl_c(session.cancel_handle());

    match args.command {
        Command::Send { from, to, message } => cmd_send(session, &from, &to, &message).await,
        Command::Probe => cmd_probe(session).await,
    }
}

/// Cancels the session on the first Ctrl-C.
fn cancel_on_ctrl_c(cancel: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });
}

async fn cmd_send(
    mut session: Session,
    from: &str,
    to: &[String],
    message: &Path,
) -> anyhow::Result<()> {
    let from = Address::new(from).context("Invalid sender")?;
    let recipients = to
        .iter()
        .map(|rcpt| Address::new(rcpt.trim()))
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid recipient")?;
    let envelope = Envelope::new(from, recipients);
    let message = read_message(message).await?;

    let report = session
        .send(&envelope, &message)
        .await
        .context("Sending failed")?;

    for (rcpt, reply) in &report.rejected {
        println!("rejected {rcpt}: {reply}");
    }
    for rcpt in &report.accepted {
        println!("accepted {rcpt}");
    }
    println!("{} bytes sent, server said: {}", report.bytes, report.reply);
    Ok(())
}

async fn cmd_probe(mut session: Session) -> anyhow::Result<()> {
    let info = session.probe().await.context("Probe failed")?;

    let mut extensions: Vec<String> = info
        .extensions
        .iter()
        .map(|ext| format!("{ext:?}"))
        .collect();
    extensions.sort();
    println!("{} accepted the connection", info.hostname);
    for ext in extensions {
        println!("  {ext}");
    }
    Ok(())
}

async fn read_message(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buf)
            .await
            .context("Failed to read message from stdin")?;
        return Ok(buf);
    }
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read message from {}", path.display()))
}
