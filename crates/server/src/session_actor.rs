//! Session actor: owns a `Session` and processes commands sequentially.
//!
//! Each admin session runs as an independent tokio task. Callers talk to it
//! through `SessionActorHandle`, which sends `SessionCommand` messages over an
//! mpsc channel. Lock-free reads go through `ArcSwap`. Background approval
//! tasks live in the session's `JoinSet` and are reaped by the same loop.

use std::sync::Arc;

use arc_swap::ArcSwap;
use joinwarden_protocol::UserId;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::login::LoginFlow;
use crate::session::{Session, SessionSnapshot};
use crate::session_command::SessionCommand;

/// Handle to a running session actor (cheap to Clone).
#[derive(Clone)]
pub struct SessionActorHandle {
    pub admin: UserId,
    command_tx: mpsc::Sender<SessionCommand>,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
}

impl SessionActorHandle {
    /// Spawn an actor for a fresh session.
    pub fn spawn(session: Session, flow: Arc<LoginFlow>) -> SessionActorHandle {
        let (command_tx, command_rx) = mpsc::channel(256);
        let admin = session.admin();
        let snapshot = session.snapshot_arc();

        tokio::spawn(actor_loop(session, flow, command_rx));

        SessionActorHandle {
            admin,
            command_tx,
            snapshot,
        }
    }

    /// Send a command to the actor (fire-and-forget).
    pub async fn send(&self, cmd: SessionCommand) {
        let name = cmd.name();
        if self.command_tx.send(cmd).await.is_err() {
            warn!(
                component = "session_actor",
                admin_id = %self.admin,
                command = name,
                "Actor channel closed, command dropped"
            );
        }
    }

    /// Queue an admin message without waiting for it to be handled.
    pub async fn handle_text(&self, text: String) {
        self.send(SessionCommand::HandleText { text, done: None })
            .await;
    }

    /// Queue an admin message and wait until the actor has handled it.
    pub async fn handle_text_and_wait(&self, text: String) {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::HandleText {
            text,
            done: Some(tx),
        })
        .await;
        let _ = rx.await;
    }

    pub async fn is_approving(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::IsApproving { reply }).await;
        rx.await.unwrap_or(false)
    }

    /// Stop the actor, releasing its platform connection. Returns once the
    /// actor has finished, or immediately if it already had.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Shutdown { reply }).await;
        let _ = rx.await;
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot.load_full()
    }
}

async fn actor_loop(
    mut session: Session,
    flow: Arc<LoginFlow>,
    mut command_rx: mpsc::Receiver<SessionCommand>,
) {
    let admin = session.admin();
    debug!(
        component = "session_actor",
        event = "session_actor.started",
        admin_id = %admin,
        "Session actor started"
    );

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                let Some(cmd) = cmd else {
                    session.close().await;
                    break;
                };
                match cmd {
                    SessionCommand::HandleText { text, done } => {
                        flow.handle_text(&mut session, &text).await;
                        if let Some(done) = done {
                            let _ = done.send(());
                        }
                    }
                    SessionCommand::IsApproving { reply } => {
                        let _ = reply.send(session.approval_guard().in_progress());
                    }
                    SessionCommand::Shutdown { reply } => {
                        session.close().await;
                        let _ = reply.send(());
                        break;
                    }
                }
            }
            Some(joined) = session.tasks_mut().join_next(), if session.has_tasks() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(
                            component = "session_actor",
                            event = "session_actor.task_panicked",
                            admin_id = %admin,
                            error = %e,
                            "Background task panicked"
                        );
                    }
                }
            }
        }
    }

    info!(
        component = "session_actor",
        event = "session_actor.stopped",
        admin_id = %admin,
        "Session actor stopped"
    );
}
