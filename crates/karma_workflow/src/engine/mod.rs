//! Engine - single task that owns the workflow.
//!
//! Front ends hold an [`EngineHandle`] and talk to the engine through a
//! bounded command channel. Commands are processed one at a time, in the
//! order they were sent.

mod command;

pub use command::{Command, Responder};

use crate::error::WorkflowError;
use crate::metrics::MetricsSnapshot;
use crate::notice::Notice;
use crate::types::{HandledEvent, InboundEvent};
use crate::workflow::ApprovalWorkflow;
use anyhow::{anyhow, Result};
use karma_ids::{MessageId, UserId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Handle for interacting with the engine from other tasks.
///
/// Can be cloned and shared. Every call sends a [`Command`] and waits for the
/// engine's response.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    fn new(cmd_tx: mpsc::Sender<Command>) -> Self {
        Self { cmd_tx }
    }

    async fn send_and_wait<T>(&self, make_cmd: impl FnOnce(Responder<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make_cmd(tx))
            .await
            .map_err(|_| anyhow!("Engine channel closed"))?;
        rx.await
            .map_err(|_| anyhow!("Engine response channel closed"))
    }

    /// Run one workflow transition
    pub async fn dispatch(&self, event: InboundEvent) -> Result<HandledEvent> {
        self.send_and_wait(|respond| Command::Dispatch { event, respond })
            .await
    }

    /// Answer a `/show` command
    pub async fn show(
        &self,
        reply_to: MessageId,
        user: Option<UserId>,
    ) -> Result<std::result::Result<Notice, WorkflowError>> {
        self.send_and_wait(|respond| Command::Show {
            reply_to,
            user,
            respond,
        })
        .await
    }

    pub async fn session_count(&self) -> Result<usize> {
        self.send_and_wait(|respond| Command::SessionCount { respond })
            .await
    }

    pub async fn metrics(&self) -> Result<MetricsSnapshot> {
        self.send_and_wait(|respond| Command::Metrics { respond })
            .await
    }

    /// Stop the engine. Returns how many sessions were still open.
    pub async fn shutdown(&self) -> Result<usize> {
        self.send_and_wait(|respond| Command::Shutdown { respond })
            .await
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("cmd_tx", &"<Sender>")
            .finish()
    }
}

/// Engine - owns the workflow and processes commands in a loop.
pub struct Engine {
    workflow: ApprovalWorkflow,
    commands: mpsc::Receiver<Command>,
}

impl Engine {
    /// Create an engine and its handle. Drive it with [`Engine::run`].
    pub fn new(workflow: ApprovalWorkflow) -> (Self, EngineHandle) {
        let capacity = workflow.config().channel_capacity.max(1);
        let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
        let engine = Self {
            workflow,
            commands: cmd_rx,
        };
        (engine, EngineHandle::new(cmd_tx))
    }

    /// Run until shutdown or until every handle is dropped.
    pub async fn run(self) {
        let Self {
            workflow,
            mut commands,
        } = self;
        info!("Engine started");

        loop {
            match commands.recv().await {
                Some(cmd) => {
                    if !handle_command(&workflow, cmd).await {
                        break;
                    }
                }
                None => {
                    info!("Engine command channel closed");
                    workflow.shutdown().await;
                    break;
                }
            }
        }

        info!("Engine stopped");
    }
}

/// Handle a single command. Returns false once the engine should stop.
async fn handle_command(workflow: &ApprovalWorkflow, cmd: Command) -> bool {
    match cmd {
        Command::Dispatch { event, respond } => {
            let handled = workflow.handle(event).await;
            if respond.send(handled).is_err() {
                debug!("Dispatch caller went away before the result was ready");
            }
        }

        Command::Show {
            reply_to,
            user,
            respond,
        } => {
            let result = workflow.show(reply_to, user).await;
            let _ = respond.send(result);
        }

        Command::SessionCount { respond } => {
            let count = workflow.sessions().lock().await.len();
            let _ = respond.send(count);
        }

        Command::Metrics { respond } => {
            let _ = respond.send(workflow.metrics().snapshot());
        }

        Command::Shutdown { respond } => {
            info!("Engine received shutdown command");
            let dropped = workflow.shutdown().await;
            let _ = respond.send(dropped);
            return false;
        }
    }
    true
}

/// Spawn the engine on the current runtime.
pub fn spawn_engine(workflow: ApprovalWorkflow) -> (EngineHandle, JoinHandle<()>) {
    let (engine, handle) = Engine::new(workflow);
    let task = tokio::spawn(engine.run());
    (handle, task)
}
