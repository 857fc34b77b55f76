use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "slackstream")]
#[command(about = "Stream a Slack workspace as JSON lines")]
#[command(version)]
#[command(after_help = "\x1b[1;36mExamples:\x1b[0m
  slackstream conversations C0123ABC                  Channel with all its threads
  slackstream conversations C0123ABC:1610000000.000100 A single thread
  slackstream --oldest 2024-01-01 conversations C0123ABC
  slackstream users                                   Every user in the workspace
  slackstream search \"release notes\"                  Messages and files

\x1b[1;36mEntries:\x1b[0m
  ID[,OLDEST[,LATEST]]   Channel ID, CHANNEL:THREAD_TS link or archive URL
  ^ID                    Exclude an entry
  @FILE                  Read entries from FILE, one per line")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to <config dir>/slackstream/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Environment variable holding the Slack token
    #[arg(long, global = true, default_value = "SLACK_TOKEN")]
    pub token_env: String,

    /// Only fetch messages after this time (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
    #[arg(long, global = true)]
    pub oldest: Option<String>,

    /// Only fetch messages before this time
    #[arg(long, global = true)]
    pub latest: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Channels and threads, with members, files and canvases
    Conversations {
        /// Channel IDs, thread links or archive URLs
        #[arg(required = true)]
        entries: Vec<String>,
    },

    /// Every user in the workspace
    Users,

    /// Every conversation visible to the token
    Channels,

    /// Messages and files matching a search query
    Search { query: String },

    /// Team and user the token belongs to
    Workspace,
}
