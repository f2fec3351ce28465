//! `mailbridge search|read|reply` -- one-shot mailbox operations.
//!
//! # Example
//!
//! ```text
//! mailbridge search --trigger-mode subject --trigger-value "[ask]"
//! mailbridge read 18f0a2b3c4d5e6f7 --json
//! mailbridge reply --thread-id 18f0a --to "Ann <ann@x.com>" --subject Question --body "Done."
//! ```

use anyhow::Context;
use clap::Args;

use mailbridge_types::{EmailChannelConfig, MessageEnvelope};

use super::build_channel;

/// Arguments for `mailbridge search`.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Print envelopes as JSON lines instead of a summary.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `mailbridge read`.
#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Message id, as listed by `search`.
    pub id: String,

    /// Print the envelope as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `mailbridge reply`.
#[derive(Args, Debug)]
pub struct ReplyArgs {
    /// Thread to reply in.
    #[arg(long)]
    pub thread_id: String,

    /// Recipient; `"Name <address>"` is accepted.
    #[arg(long)]
    pub to: String,

    /// Subject of the message being answered; `Re:` is added if missing.
    #[arg(long, default_value = "")]
    pub subject: String,

    /// Reply body.
    #[arg(long)]
    pub body: String,

    /// Id of the message being answered.
    #[arg(long)]
    pub in_reply_to: Option<String>,
}

pub async fn search(config: EmailChannelConfig, args: SearchArgs) -> anyhow::Result<()> {
    let channel = build_channel(config)?;
    let result = channel.mailbox().search_new_emails().await;
    channel.stop().await;

    let envelopes = result.context("search failed")?;
    if envelopes.is_empty() && !args.json {
        println!("No new mail.");
    }
    for envelope in &envelopes {
        if args.json {
            println!("{}", serde_json::to_string(envelope)?);
        } else {
            print_summary(envelope, &channel.mailbox().context_key(envelope));
        }
    }
    Ok(())
}

pub async fn read(config: EmailChannelConfig, args: ReadArgs) -> anyhow::Result<()> {
    let channel = build_channel(config)?;
    let envelope = channel.mailbox().read_email(&args.id).await;
    channel.stop().await;

    let Some(envelope) = envelope else {
        anyhow::bail!("could not read message {}", args.id);
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        print_summary(&envelope, &channel.mailbox().context_key(&envelope));
        println!();
        println!("{}", envelope.body);
    }
    Ok(())
}

pub async fn reply(config: EmailChannelConfig, args: ReplyArgs) -> anyhow::Result<()> {
    let channel = build_channel(config)?;
    let result = channel
        .mailbox()
        .send_reply(
            &args.thread_id,
            &args.to,
            &args.subject,
            &args.body,
            args.in_reply_to.as_deref(),
        )
        .await;
    channel.stop().await;

    result.context("reply failed")?;
    println!("Reply sent.");
    Ok(())
}

fn print_summary(envelope: &MessageEnvelope, context_key: &str) {
    println!("{}  {}", envelope.id, envelope.date);
    println!("  from:    {}", envelope.from);
    println!("  subject: {}", envelope.subject);
    println!("  context: {context_key}");
}
