//! Commands sent to a session actor by the command surface and shutdown path.

use tokio::sync::oneshot;

/// A command that can be sent to a session actor.
pub enum SessionCommand {
    /// One message from the admin, handled by the login flow.
    /// `done` fires once the message has been fully processed.
    HandleText {
        text: String,
        done: Option<oneshot::Sender<()>>,
    },

    /// Whether a backlog pass is currently running
    IsApproving { reply: oneshot::Sender<bool> },

    /// Abort background tasks, disconnect the client, stop the actor.
    Shutdown { reply: oneshot::Sender<()> },
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SessionCommand::HandleText { .. } => "handle_text",
            SessionCommand::IsApproving { .. } => "is_approving",
            SessionCommand::Shutdown { .. } => "shutdown",
        }
    }
}
