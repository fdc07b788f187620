//! Command-line arguments of `karma-bot`.

use clap::Parser;
use karma_workflow::config::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONFIRM_REQUEST_TTL, DEFAULT_SELECT_RECIPIENT_TTL,
};
use karma_workflow::{SessionTtls, WorkflowConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "karma-bot", about = "Peer-approved karma transfers from the console")]
pub struct Args {
    /// JSON file mapping user ids to display names
    #[arg(long, env = "KARMA_USERS_FILE")]
    pub users: PathBuf,

    /// Seconds a recipient-selection prompt stays answerable
    #[arg(
        long,
        env = "KARMA_SELECT_TTL_SECS",
        default_value_t = DEFAULT_SELECT_RECIPIENT_TTL.as_secs()
    )]
    pub select_ttl_secs: u64,

    /// Seconds a confirmation prompt stays answerable
    #[arg(
        long,
        env = "KARMA_CONFIRM_TTL_SECS",
        default_value_t = DEFAULT_CONFIRM_REQUEST_TTL.as_secs()
    )]
    pub confirm_ttl_secs: u64,

    /// Commands buffered in front of the engine
    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Mirror the log on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            ttls: SessionTtls {
                select_recipient: Duration::from_secs(self.select_ttl_secs),
                confirm_request: Duration::from_secs(self.confirm_ttl_secs),
            },
            channel_capacity: self.channel_capacity,
        }
    }
}
