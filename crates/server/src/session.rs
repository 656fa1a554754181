//! Per-admin session record

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use joinwarden_connector_core::PlatformClient;
use joinwarden_protocol::{ChannelId, CodeToken, UserId};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Where the admin is in the login flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginStep {
    #[default]
    Idle,
    AwaitingPhone,
    AwaitingCode,
    Awaiting2fa,
    AwaitingChannel,
}

impl LoginStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginStep::Idle => "idle",
            LoginStep::AwaitingPhone => "awaiting_phone",
            LoginStep::AwaitingCode => "awaiting_code",
            LoginStep::Awaiting2fa => "awaiting_2fa",
            LoginStep::AwaitingChannel => "awaiting_channel",
        }
    }
}

/// At-most-one backlog pass per session.
///
/// Acquisition is a single compare-and-swap; the flag clears when the
/// returned permit drops, including on error paths and task abort.
#[derive(Debug, Clone, Default)]
pub struct ApprovalGuard(Arc<AtomicBool>);

impl ApprovalGuard {
    pub fn try_acquire(&self) -> Option<ApprovalPermit> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ApprovalPermit(self.0.clone()))
    }

    pub fn in_progress(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct ApprovalPermit(Arc<AtomicBool>);

impl Drop for ApprovalPermit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Read-only view published after every mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub admin: UserId,
    pub step: LoginStep,
    pub phone: Option<String>,
    pub channel_id: Option<ChannelId>,
    pub has_client: bool,
    pub logged_in: bool,
}

/// Everything the approval engine needs from a session
#[derive(Clone)]
pub struct ApprovalTarget {
    pub admin: UserId,
    pub client: Arc<dyn PlatformClient>,
    pub channel: ChannelId,
}

pub struct Session {
    admin: UserId,
    step: LoginStep,
    client: Option<Arc<dyn PlatformClient>>,
    phone: Option<String>,
    pending_code: Option<CodeToken>,
    saved_session: Option<String>,
    channel_id: Option<ChannelId>,
    approval: ApprovalGuard,
    tasks: JoinSet<()>,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
}

impl Session {
    pub fn new(admin: UserId) -> Self {
        let mut session = Self {
            admin,
            step: LoginStep::Idle,
            client: None,
            phone: None,
            pending_code: None,
            saved_session: None,
            channel_id: None,
            approval: ApprovalGuard::default(),
            tasks: JoinSet::new(),
            snapshot: Arc::new(ArcSwap::from_pointee(SessionSnapshot {
                admin,
                step: LoginStep::Idle,
                phone: None,
                channel_id: None,
                has_client: false,
                logged_in: false,
            })),
        };
        session.refresh_snapshot();
        session
    }

    pub fn admin(&self) -> UserId {
        self.admin
    }

    pub fn step(&self) -> LoginStep {
        self.step
    }

    pub fn client(&self) -> Option<Arc<dyn PlatformClient>> {
        self.client.clone()
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn pending_code(&self) -> Option<&CodeToken> {
        self.pending_code.as_ref()
    }

    pub fn saved_session(&self) -> Option<&str> {
        self.saved_session.as_deref()
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.channel_id
    }

    pub fn approval_guard(&self) -> &ApprovalGuard {
        &self.approval
    }

    pub fn tasks_mut(&mut self) -> &mut JoinSet<()> {
        &mut self.tasks
    }

    pub fn has_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// `/start`: back to the phone prompt. The previous attempt's client and
    /// tasks stay alive until a new phone number replaces them.
    pub fn restart(&mut self) {
        self.step = LoginStep::AwaitingPhone;
    }

    /// Bind a fresh client to this attempt.
    pub fn attach_client(&mut self, client: Arc<dyn PlatformClient>, phone: String) {
        self.client = Some(client);
        self.phone = Some(phone);
        self.pending_code = None;
        self.saved_session = None;
        self.channel_id = None;
    }

    pub fn code_requested(&mut self, token: CodeToken) {
        self.pending_code = Some(token);
        self.step = LoginStep::AwaitingCode;
    }

    pub fn password_required(&mut self) {
        self.pending_code = None;
        self.step = LoginStep::Awaiting2fa;
    }

    /// Store the exported credential and move on to channel selection.
    pub fn complete_login(&mut self, saved_session: String) {
        self.pending_code = None;
        self.saved_session = Some(saved_session);
        self.step = LoginStep::AwaitingChannel;
    }

    pub fn set_channel(&mut self, channel: ChannelId) {
        self.channel_id = Some(channel);
        self.step = LoginStep::Idle;
    }

    pub fn approval_target(&self) -> Option<ApprovalTarget> {
        Some(ApprovalTarget {
            admin: self.admin,
            client: self.client.clone()?,
            channel: self.channel_id?,
        })
    }

    /// Abort this attempt's background tasks and detach its client.
    pub async fn retire_client(&mut self) -> Option<Arc<dyn PlatformClient>> {
        self.tasks.shutdown().await;
        self.client.take()
    }

    /// Abort tasks and release the connection. Used on process shutdown.
    pub async fn close(&mut self) {
        if let Some(client) = self.retire_client().await {
            disconnect_quietly(self.admin, client.as_ref()).await;
        }
        self.refresh_snapshot();
    }

    pub fn snapshot_arc(&self) -> Arc<ArcSwap<SessionSnapshot>> {
        self.snapshot.clone()
    }

    pub fn refresh_snapshot(&mut self) {
        self.snapshot.store(Arc::new(SessionSnapshot {
            admin: self.admin,
            step: self.step,
            phone: self.phone.clone(),
            channel_id: self.channel_id,
            has_client: self.client.is_some(),
            logged_in: self.saved_session.is_some(),
        }));
    }
}

/// Disconnect a client, logging rather than propagating failures.
pub async fn disconnect_quietly(admin: UserId, client: &dyn PlatformClient) {
    match client.disconnect().await {
        Ok(()) => info!(
            component = "session",
            event = "session.client_disconnected",
            admin_id = %admin,
            "Platform client disconnected"
        ),
        Err(e) => warn!(
            component = "session",
            event = "session.disconnect_failed",
            admin_id = %admin,
            error = %e,
            "Platform client disconnect failed"
        ),
    }
}
