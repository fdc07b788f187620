//! Karma Bot
//!
//! Peer-approved karma transfers, driven from the console.
//!
//! Usage:
//!     karma-bot --users users.json [--select-ttl-secs 36000] [--confirm-ttl-secs 36000]

use anyhow::Context;
use clap::Parser;
use karma::{Args, ConsoleTransport};
use karma_logging::{init_logging, LogConfig};
use karma_workflow::{spawn_engine, ApprovalWorkflow, InMemoryLedger, StaticDirectory};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _log_guard = init_logging(LogConfig {
        app_name: "karma-bot",
        verbose: args.verbose,
    });

    let config = args.workflow_config();
    config.validate().context("Invalid workflow configuration")?;

    let directory = StaticDirectory::from_file(&args.users)?;
    info!("Starting karma bot");
    info!("  Users: {} ({})", directory.len(), args.users.display());
    info!(
        "  TTLs: select {}s, confirm {}s",
        args.select_ttl_secs, args.confirm_ttl_secs
    );

    let ledger = Arc::new(InMemoryLedger::new(directory.user_ids()));
    let transport = Arc::new(ConsoleTransport::new(std::io::stdout()));
    let workflow = ApprovalWorkflow::new(
        config,
        ledger,
        Arc::new(directory),
        transport.clone(),
    );
    let (engine, task) = spawn_engine(workflow);

    let input = BufReader::new(tokio::io::stdin());
    let result = karma::run(input, &engine, &transport).await;

    let dropped = engine.shutdown().await?;
    task.await.context("Engine task failed")?;
    info!(dropped, "Karma bot stopped");

    result
}
