use chrono::{DateTime, Utc};
use clap::Parser;
use owo_colors::OwoColorize;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod cli;
mod output;

use cli::{Cli, Commands};
use output::JsonLines;
use slackstream_core::link::parse_time;
use slackstream_core::types::ConversationsParams;
use slackstream_core::{logging, Config, EntityList, SlackClient, SlackError, Stream, StreamError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("environment variable {0} is not set or empty")]
    MissingToken(String),

    #[error("nothing to do: every entry is excluded")]
    NoEntries,

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Slack(#[from] SlackError),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::MissingToken(_) | CliError::NoEntries => 2,
            CliError::Stream(e) if e.is_cancelled() => 130,
            CliError::Stream(e) if e.is_invalid_auth() => 3,
            CliError::Slack(e) if e.is_invalid_auth() => 3,
            _ => 1,
        }
    }

    fn code_str(&self) -> &'static str {
        match self {
            CliError::MissingToken(_) => "missing_token",
            CliError::NoEntries => "no_entries",
            CliError::Stream(e) => e.code_str(),
            CliError::Slack(e) => e.code_str(),
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init("slackstream=info");

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping");
            on_signal.cancel();
        }
    });

    if let Err(e) = run(&cli, &cancel).await {
        eprintln!("{} [{}]: {}", "Error".red().bold(), e.code_str().dimmed(), e);
        process::exit(e.exit_code());
    }
}

fn parse_opt_time(s: Option<&str>) -> Result<Option<DateTime<Utc>>, StreamError> {
    s.map(parse_time).transpose()
}

async fn run(cli: &Cli, cancel: &CancellationToken) -> Result<(), CliError> {
    let config = Config::load_or_default(cli.config.as_deref())?;
    let token = std::env::var(&cli.token_env)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| CliError::MissingToken(cli.token_env.clone()))?;

    let client = SlackClient::new(token)?;
    let mut builder = Stream::builder(Arc::new(client), config.limits).options(config.stream);
    if let Some(t) = parse_opt_time(cli.oldest.as_deref())? {
        builder = builder.oldest(t);
    }
    if let Some(t) = parse_opt_time(cli.latest.as_deref())? {
        builder = builder.latest(t);
    }
    let stream = builder.build()?;

    let sink = JsonLines::new(std::io::stdout());
    match &cli.command {
        Commands::Conversations { entries } => {
            let list = EntityList::from_entries(entries)?;
            let items = list.includes();
            if items.is_empty() {
                return Err(CliError::NoEntries);
            }
            info!(
                included = items.len(),
                excluded = list.exclude_count(),
                "streaming conversations"
            );
            stream.sync_conversations(cancel, &sink, &items).await?;
        }
        Commands::Users => stream.users(cancel, &sink).await?,
        Commands::Channels => {
            stream
                .list_channels(cancel, &sink, &ConversationsParams::default())
                .await?
        }
        Commands::Search { query } => stream.search(cancel, &sink, query).await?,
        Commands::Workspace => stream.workspace_info(cancel, &sink).await?,
    }
    info!("done");
    Ok(())
}
