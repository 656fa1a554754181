//! Telegram Bot API command surface
//!
//! Long-polls the bot for messages from the configured admin and feeds their
//! text into that admin's session actor. Replies and notifications go back
//! out through `send_message`.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use joinwarden_protocol::UserId;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{debug, error, info};

use crate::state::SessionRegistry;
use crate::surface::{ReplySink, SurfaceError};

/// Sends replies as private bot messages. A user's private chat id equals
/// their user id.
#[derive(Clone)]
pub struct TelegramSurface {
    bot: Bot,
}

impl TelegramSurface {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ReplySink for TelegramSurface {
    async fn send_text(&self, to: UserId, text: &str) -> Result<(), SurfaceError> {
        self.bot
            .send_message(ChatId(to.get()), text.to_string())
            .await
            .map(|_| ())
            .map_err(|e| SurfaceError::Delivery {
                to,
                reason: e.to_string(),
            })
    }
}

/// Routes inbound bot messages to session actors.
pub struct TelegramFrontend {
    bot: Bot,
    admin: UserId,
    registry: Arc<SessionRegistry>,
}

impl TelegramFrontend {
    pub fn new(bot: Bot, admin: UserId, registry: Arc<SessionRegistry>) -> Self {
        Self {
            bot,
            admin,
            registry,
        }
    }

    /// Dispatch updates until `shutdown` resolves. Fails if the dispatcher
    /// stops on its own first.
    pub async fn run(
        self: Arc<Self>,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        info!(
            component = "telegram",
            event = "telegram.dispatcher_started",
            admin_id = %self.admin,
            "Polling for bot messages"
        );

        let handler = dptree::entry().branch(Update::filter_message().endpoint({
            let frontend = Arc::clone(&self);
            move |msg: Message| {
                let frontend = Arc::clone(&frontend);
                async move {
                    frontend.handle_message(msg).await;
                    respond(())
                }
            }
        }));

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler).build();
        until_shutdown(dispatcher.dispatch(), shutdown).await
    }

    async fn handle_message(&self, msg: Message) {
        let from = msg.from.as_ref().map(|user| user.id.0);
        let Some(text) = admin_text(self.admin, from, msg.text()) else {
            debug!(
                component = "telegram",
                event = "telegram.message_ignored",
                from = ?from,
                chat_id = msg.chat.id.0,
                "Ignoring message"
            );
            return;
        };

        self.registry
            .get_or_create(self.admin)
            .handle_text(text)
            .await;
    }
}

/// Drive `dispatch` until `shutdown` resolves.
async fn until_shutdown(
    dispatch: impl Future<Output = ()>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    tokio::select! {
        _ = dispatch => {
            error!(
                component = "telegram",
                event = "telegram.dispatcher_stopped",
                "Dispatcher exited without a shutdown signal"
            );
            anyhow::bail!("bot dispatcher stopped unexpectedly")
        }
        _ = shutdown => {
            info!(
                component = "telegram",
                event = "telegram.shutdown_requested",
                "Stopping dispatcher"
            );
            Ok(())
        }
    }
}

/// Text of a message if it came from the admin and carries text.
fn admin_text(admin: UserId, from: Option<u64>, text: Option<&str>) -> Option<String> {
    let from = i64::try_from(from?).ok()?;
    if from != admin.get() {
        return None;
    }
    text.map(str::to_string)
}
