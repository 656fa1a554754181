//! Join-request approval engine
//!
//! Two activities per channel hand-off: a bounded backlog pass over the
//! pending requests that already exist, and an unbounded live subscription
//! for requests that arrive later. Both go through `approve`.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use joinwarden_connector_core::{pending_join_requests, PlatformClient, PlatformError};
use joinwarden_protocol::{ChannelId, EntityRef, PlatformUpdate, UserId};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::session::{ApprovalPermit, ApprovalTarget, Session};
use crate::surface::{deliver, ReplySink};

#[derive(Debug, Clone)]
pub struct ApprovalConfig {
    pub page_size: u32,
    /// Delay after each backlog attempt that did not already sleep on a flood wait
    pub pacing: Duration,
    /// Used when a flood wait carries no duration
    pub default_flood_wait: Duration,
    /// Send the admin a progress notice every N approvals; 0 disables
    pub progress_every: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            pacing: Duration::from_millis(200),
            default_flood_wait: Duration::from_secs(5),
            progress_every: 50,
        }
    }
}

/// Result of one approval attempt (including its flood-wait retry)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproveOutcome {
    Approved { waited: bool },
    Failed { error: PlatformError, waited: bool },
}

impl ApproveOutcome {
    pub fn waited(&self) -> bool {
        match self {
            ApproveOutcome::Approved { waited } | ApproveOutcome::Failed { waited, .. } => *waited,
        }
    }
}

/// Counters for one backlog pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BacklogTally {
    pub approved: u64,
    pub errors: u64,
}

#[derive(Clone)]
pub struct ApprovalEngine {
    config: Arc<ApprovalConfig>,
    surface: Arc<dyn ReplySink>,
    /// Receives live-path notifications
    notify_target: UserId,
}

impl ApprovalEngine {
    pub fn new(config: ApprovalConfig, surface: Arc<dyn ReplySink>, notify_target: UserId) -> Self {
        Self {
            config: Arc::new(config),
            surface,
            notify_target,
        }
    }

    /// Start the backlog pass and the live subscription for the session's
    /// channel. Returns false without doing anything if a pass is already
    /// running for this session or no channel has been selected.
    ///
    /// The live subscription is registered before the first page is requested.
    pub async fn start(&self, session: &mut Session) -> bool {
        let Some(target) = session.approval_target() else {
            warn!(
                component = "approval",
                event = "approval.start_without_target",
                admin_id = %session.admin(),
                "No client or channel; approval not started"
            );
            return false;
        };
        let Some(permit) = session.approval_guard().try_acquire() else {
            info!(
                component = "approval",
                event = "approval.already_running",
                admin_id = %target.admin,
                channel_id = %target.channel,
                "Backlog pass already in progress"
            );
            return false;
        };

        info!(
            component = "approval",
            event = "approval.started",
            admin_id = %target.admin,
            channel_id = %target.channel,
            "Starting backlog pass and live subscription"
        );

        let updates = match target.client.subscribe_updates().await {
            Ok(rx) => Some(rx),
            Err(e) => {
                error!(
                    component = "approval",
                    event = "approval.subscribe_failed",
                    channel_id = %target.channel,
                    error = %e,
                    "Live subscription failed"
                );
                self.reply(
                    target.admin,
                    &format!("⚠️ Live approvals unavailable: {e}"),
                )
                .await;
                None
            }
        };

        let tasks = session.tasks_mut();
        let engine = self.clone();
        let backlog_target = target.clone();
        tasks.spawn(async move { engine.run_backlog(backlog_target, permit).await });
        if let Some(updates) = updates {
            let engine = self.clone();
            tasks.spawn(async move { engine.run_live(target, updates).await });
        }
        true
    }

    async fn run_backlog(self, target: ApprovalTarget, permit: ApprovalPermit) {
        let title = self.channel_title(&target).await;
        self.reply(
            target.admin,
            &format!("🔄 Fetching pending requests for {title}..."),
        )
        .await;

        match self.backlog_pass(&target).await {
            Ok(tally) => {
                info!(
                    component = "approval",
                    event = "approval.backlog_complete",
                    channel_id = %target.channel,
                    approved = tally.approved,
                    errors = tally.errors,
                    "Backlog pass complete"
                );
                self.reply(
                    target.admin,
                    &format!(
                        "✅ Backfill complete! Approved {} users (errors: {}).",
                        tally.approved, tally.errors
                    ),
                )
                .await;
            }
            Err(e) => {
                error!(
                    component = "approval",
                    event = "approval.backlog_failed",
                    channel_id = %target.channel,
                    error = %e,
                    "Backlog pass aborted"
                );
                self.reply(target.admin, &format!("❌ Backfill error: {e}"))
                    .await;
            }
        }

        drop(permit);
    }

    /// Display name for messages; falls back to the id.
    async fn channel_title(&self, target: &ApprovalTarget) -> String {
        match target
            .client
            .resolve_entity(&EntityRef::Id(target.channel))
            .await
        {
            Ok(chat) => chat.display_name(),
            Err(e) => {
                warn!(
                    component = "approval",
                    event = "approval.title_unavailable",
                    channel_id = %target.channel,
                    error = %e,
                    "Could not resolve channel name"
                );
                target.channel.to_string()
            }
        }
    }

    /// Approve every pending request once. Per-item failures are counted;
    /// only a failure of the listing itself aborts the pass.
    pub async fn backlog_pass(&self, target: &ApprovalTarget) -> Result<BacklogTally, PlatformError> {
        let mut requests = pending_join_requests(
            target.client.clone(),
            target.channel,
            self.config.page_size,
        );
        let mut tally = BacklogTally::default();

        while let Some(request) = requests.next().await {
            let request = request?;
            let outcome = self
                .approve(target.client.as_ref(), target.channel, request.user_id)
                .await;

            match &outcome {
                ApproveOutcome::Approved { .. } => {
                    tally.approved += 1;
                    if tally.approved % 10 == 0 {
                        debug!(
                            component = "approval",
                            event = "approval.backlog_progress",
                            channel_id = %target.channel,
                            approved = tally.approved,
                            "Approved {}",
                            tally.approved
                        );
                    }
                    if self.config.progress_every > 0
                        && tally.approved % self.config.progress_every == 0
                    {
                        self.reply(
                            target.admin,
                            &format!("✅ Backfill update: approved {} users so far...", tally.approved),
                        )
                        .await;
                    }
                }
                ApproveOutcome::Failed { error, .. } => {
                    tally.errors += 1;
                    warn!(
                        component = "approval",
                        event = "approval.backlog_item_failed",
                        channel_id = %target.channel,
                        user_id = %request.user_id,
                        error = %error,
                        "Join request approval failed"
                    );
                }
            }

            if !outcome.waited() {
                tokio::time::sleep(self.config.pacing).await;
            }
        }

        Ok(tally)
    }

    /// Approve one request, honouring a single flood-wait retry.
    pub async fn approve(
        &self,
        client: &dyn PlatformClient,
        channel: ChannelId,
        user: UserId,
    ) -> ApproveOutcome {
        match client.approve_join_request(channel, user).await {
            Ok(()) => ApproveOutcome::Approved { waited: false },
            Err(PlatformError::FloodWait { seconds }) => {
                let wait = seconds
                    .map(Duration::from_secs)
                    .unwrap_or(self.config.default_flood_wait);
                warn!(
                    component = "approval",
                    event = "approval.flood_wait",
                    channel_id = %channel,
                    user_id = %user,
                    wait_secs = wait.as_secs(),
                    "Flood wait; retrying once"
                );
                tokio::time::sleep(wait).await;
                match client.approve_join_request(channel, user).await {
                    Ok(()) => ApproveOutcome::Approved { waited: true },
                    Err(error) => ApproveOutcome::Failed {
                        error,
                        waited: true,
                    },
                }
            }
            Err(error) => ApproveOutcome::Failed {
                error,
                waited: false,
            },
        }
    }

    /// Handle live updates until the client's update stream ends. Each
    /// update is handled in its own task.
    async fn run_live(
        self,
        target: ApprovalTarget,
        mut updates: mpsc::Receiver<PlatformUpdate>,
    ) {
        info!(
            component = "approval",
            event = "approval.live_subscribed",
            channel_id = %target.channel,
            "Listening for new join requests"
        );

        let mut handlers = JoinSet::new();
        while let Some(update) = updates.recv().await {
            while handlers.try_join_next().is_some() {}
            let engine = self.clone();
            let target = target.clone();
            handlers.spawn(async move {
                engine.handle_update(&target, update).await;
            });
        }

        info!(
            component = "approval",
            event = "approval.live_ended",
            channel_id = %target.channel,
            "Update stream closed"
        );
        while handlers.join_next().await.is_some() {}
    }

    /// Approve a live join request for the target channel, once, without
    /// flood-wait retry.
    pub async fn handle_update(&self, target: &ApprovalTarget, update: PlatformUpdate) {
        let PlatformUpdate::JoinRequested {
            channel_id,
            user_id,
            ..
        } = update
        else {
            return;
        };

        if !channel_id.same_channel(target.channel) {
            debug!(
                component = "approval",
                event = "approval.live_other_channel",
                channel_id = %channel_id,
                "Join request for another channel ignored"
            );
            return;
        }

        match target
            .client
            .approve_join_request(target.channel, user_id)
            .await
        {
            Ok(()) => {
                info!(
                    component = "approval",
                    event = "approval.live_approved",
                    channel_id = %target.channel,
                    user_id = %user_id,
                    "Approved new user {}",
                    user_id
                );
                self.reply(
                    self.notify_target,
                    &format!("✅ New request approved: {user_id}"),
                )
                .await;
            }
            Err(e) => {
                error!(
                    component = "approval",
                    event = "approval.live_failed",
                    channel_id = %target.channel,
                    user_id = %user_id,
                    error = %e,
                    "Error approving new request"
                );
            }
        }
    }

    async fn reply(&self, to: UserId, text: &str) {
        deliver(self.surface.as_ref(), to, text).await;
    }
}
