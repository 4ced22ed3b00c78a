#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Operator CLI for the Merchant mail and research integrations

use anyhow::Context;
use clap::{Parser, Subcommand};
use merchant_connect::{
    Attachment, DEFAULT_INBOX_LIMIT, ImapTransport, MailMessage, MailboxCredentials, Mailer,
    OutboundEmail, TrafficEstimator, TrendLookup, TrendOutcome, fetch_inbox, verify_connection,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "merchant-cli")]
#[command(about = "Mailbox diagnostics, outbound mail and prospect research for Merchant")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the configured IMAP mailbox accepts a login
    Verify,

    /// Show the most recent INBOX messages
    Inbox {
        /// Maximum number of messages to fetch
        #[arg(long, default_value_t = DEFAULT_INBOX_LIMIT)]
        limit: usize,
    },

    /// Estimate monthly visits for a domain
    Traffic {
        /// Domain, e.g. example.com
        domain: String,
    },

    /// Summarize Google Trends data for a search term
    Trend {
        /// Search term
        term: String,
    },

    /// Send an HTML email through the configured SMTP relay
    Send {
        #[arg(long)]
        to: String,

        #[arg(long)]
        subject: String,

        /// HTML body
        #[arg(long)]
        html: String,

        #[arg(long)]
        cc: Vec<String>,

        #[arg(long)]
        bcc: Vec<String>,

        /// File to attach; may be repeated
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Verify => cmd_verify(&args).await,
        Command::Inbox { limit } => cmd_inbox(&args, *limit).await,
        Command::Traffic { domain } => cmd_traffic(&args, domain).await,
        Command::Trend { term } => cmd_trend(&args, term).await,
        Command::Send {
            to,
            subject,
            html,
            cc,
            bcc,
            attachments,
        } => {
            let email = OutboundEmail {
                cc: cc.clone(),
                bcc: bcc.clone(),
                attachments: read_attachments(attachments)?,
                ..OutboundEmail::new(to, subject, html)
            };
            cmd_send(&args, &email).await
        }
    }
}

async fn cmd_verify(args: &Args) -> anyhow::Result<ExitCode> {
    let credentials = MailboxCredentials::from_env()?;
    let transport = ImapTransport::from_env()?;

    let check = verify_connection(&transport, &credentials).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&check)?);
    } else {
        println!("{}", check.message);
    }

    Ok(if check.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_inbox(args: &Args, limit: usize) -> anyhow::Result<ExitCode> {
    let credentials = MailboxCredentials::from_env()?;
    let transport = ImapTransport::from_env()?;

    let messages = fetch_inbox(&transport, &credentials, limit).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
    } else {
        print_message_table(&messages);
    }

    Ok(ExitCode::SUCCESS)
}

async fn cmd_traffic(args: &Args, domain: &str) -> anyhow::Result<ExitCode> {
    let estimator = TrafficEstimator::from_env()?;
    let estimate = estimator.estimate(domain).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&estimate)?);
    } else {
        println!("Domain:     {}", estimate.domain);
        println!("Traffic:    {}", estimate.raw_traffic);
        println!("Estimate:   {}", estimate.estimated_visits);
        println!("Conclusion: {}", estimate.conclusion());
    }

    Ok(ExitCode::SUCCESS)
}

async fn cmd_trend(args: &Args, term: &str) -> anyhow::Result<ExitCode> {
    let lookup = TrendLookup::from_env()?;
    let outcome = lookup.lookup(term).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{outcome}");
    }

    Ok(if matches!(outcome, TrendOutcome::Failed(_)) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn cmd_send(args: &Args, email: &OutboundEmail) -> anyhow::Result<ExitCode> {
    let mailer = Mailer::from_env()?;
    let receipt = mailer.send(email).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        println!("Sent {} to {}", receipt.message_id, receipt.to);
    }

    Ok(ExitCode::SUCCESS)
}

fn read_attachments(paths: &[PathBuf]) -> anyhow::Result<Vec<Attachment>> {
    paths
        .iter()
        .map(|path| {
            let data = std::fs::read(path)
                .with_context(|| format!("Cannot read attachment {}", path.display()))?;
            let filename = path
                .file_name()
                .map_or_else(|| "attachment".to_string(), |n| n.to_string_lossy().into_owned());
            Ok(Attachment::new(filename, data))
        })
        .collect()
}

fn print_message_table(messages: &[MailMessage]) {
    if messages.is_empty() {
        println!("No emails found.");
        return;
    }

    let header = format!(
        "{:<8} {:<20} {:<30} {}",
        "UID", "Date", "From", "Subject"
    );
    println!("{header}");
    println!("{}", "-".repeat(100));

    for message in messages {
        let date = message
            .date
            .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d %H:%M").to_string());
        let marker = if message.has_attachments { " [+]" } else { "" };
        println!(
            "{:<8} {:<20} {:<30} {}{}",
            message.id,
            date,
            truncate(&message.from_addr, 28),
            truncate(&message.subject, 40),
            marker,
        );
    }

    println!("\n{} email(s)", messages.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
