//! `mailbridge` -- drive a mailbox through an MCP mail worker.
//!
//! Provides the following subcommands:
//!
//! - `mailbridge search` -- List new mail matching the trigger.
//! - `mailbridge read <id>` -- Read one message.
//! - `mailbridge reply` -- Reply within a thread.
//! - `mailbridge poll` -- Poll on an interval, printing new mail until Ctrl-C.
//! - `mailbridge info` -- Start the worker and show its handshake details.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

/// mailbridge email channel CLI.
#[derive(Parser, Debug)]
#[command(name = "mailbridge", about = "Mailbox polling over an MCP mail worker", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (default: ~/.mailbridge/config.json if present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the trigger mode from the config file.
    #[arg(long, global = true, value_enum)]
    trigger_mode: Option<TriggerModeArg>,

    /// Override the trigger value from the config file.
    #[arg(long, global = true)]
    trigger_value: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// List new mail matching the trigger (does not mark it processed).
    Search(commands::mailbox::SearchArgs),

    /// Read one message by id.
    Read(commands::mailbox::ReadArgs),

    /// Reply within a thread.
    Reply(commands::mailbox::ReplyArgs),

    /// Poll for new mail and print each message as a JSON line.
    Poll,

    /// Start the worker and print what it reports about itself.
    Info,
}

/// Trigger modes accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TriggerModeArg {
    Label,
    Address,
    Subject,
}

impl From<TriggerModeArg> for mailbridge_types::TriggerMode {
    fn from(arg: TriggerModeArg) -> Self {
        match arg {
            TriggerModeArg::Label => Self::Label,
            TriggerModeArg::Address => Self::Address,
            TriggerModeArg::Subject => Self::Subject,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let overrides = commands::Overrides {
        trigger_mode: cli.trigger_mode.map(Into::into),
        trigger_value: cli.trigger_value,
    };
    let config = commands::load_config(cli.config.as_deref(), &overrides)?;

    match cli.command {
        Commands::Search(args) => commands::mailbox::search(config, args).await?,
        Commands::Read(args) => commands::mailbox::read(config, args).await?,
        Commands::Reply(args) => commands::mailbox::reply(config, args).await?,
        Commands::Poll => commands::poll::run(config).await?,
        Commands::Info => commands::info(config).await?,
    }

    Ok(())
}
