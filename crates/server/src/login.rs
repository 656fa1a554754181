//! Login flow executor
//!
//! Runs the action `transition::plan` picks for each admin message against
//! the session's platform client. Every platform failure is caught here and
//! reported as plain text; only the second-factor branch and the channel
//! checks get dedicated handling.

use std::sync::Arc;

use joinwarden_connector_core::{ClientFactory, PlatformClient, PlatformError};
use joinwarden_protocol::{ChatDescriptor, EntityRef, UserId};
use tracing::{debug, info, warn};

use crate::approval::ApprovalEngine;
use crate::session::{disconnect_quietly, Session};
use crate::surface::{deliver, ReplySink};
use crate::transition::{plan, Action, Input};

pub const WELCOME: &str = "Welcome! Send your phone number (e.g., +15551234567).";
pub const NUDGE: &str = "Use /start to begin.";
pub const OTP_SENT: &str = "OTP sent! Please enter the code:";
pub const PASSWORD_PROMPT: &str = "2FA enabled. Enter your password:";
pub const LOGIN_OK: &str =
    "✅ Login successful! Now send the channel ID or username (e.g., @ExampleChannel).";
pub const NOT_ADMIN: &str = "❌ You are not an admin in that channel.";
pub const NO_INVITE_RIGHT: &str = "❌ You lack \"Add Members\" permission.";
pub const CHANNEL_UNREACHABLE: &str =
    "❌ Cannot access channel. Check ID/username and admin status.";

/// Why a channel was rejected
#[derive(Debug)]
enum ChannelCheck {
    Accepted(ChatDescriptor),
    NotAdmin,
    NoInviteRight,
}

pub struct LoginFlow {
    factory: Arc<dyn ClientFactory>,
    surface: Arc<dyn ReplySink>,
    engine: ApprovalEngine,
}

impl LoginFlow {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        surface: Arc<dyn ReplySink>,
        engine: ApprovalEngine,
    ) -> Self {
        Self {
            factory,
            surface,
            engine,
        }
    }

    /// Handle one message from the admin. Never fails; errors become replies.
    pub async fn handle_text(&self, session: &mut Session, text: &str) {
        let admin = session.admin();
        let step = session.step();
        let action = plan(step, Input::parse(text));

        debug!(
            component = "login",
            event = "login.input",
            admin_id = %admin,
            step = step.as_str(),
            action = action_name(&action),
            "Handling admin message"
        );

        let result = match action {
            Action::Restart => {
                session.restart();
                self.reply(admin, WELCOME).await;
                Ok(())
            }
            Action::SubmitPhone(phone) => self.submit_phone(session, phone).await,
            Action::SubmitCode(code) => self.submit_code(session, &code).await,
            Action::SubmitPassword(password) => self.submit_password(session, &password).await,
            Action::SelectChannel(entity) => {
                self.select_channel(session, &entity).await;
                Ok(())
            }
            Action::Nudge => {
                self.reply(admin, NUDGE).await;
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(
                component = "login",
                event = "login.step_failed",
                admin_id = %admin,
                step = session.step().as_str(),
                error = %e,
                "Login step failed"
            );
            self.reply(admin, &format!("An error occurred: {e}")).await;
        }

        session.refresh_snapshot();
    }

    async fn submit_phone(&self, session: &mut Session, phone: String) -> Result<(), PlatformError> {
        let admin = session.admin();

        // A new attempt replaces the previous client entirely.
        if let Some(previous) = session.retire_client().await {
            disconnect_quietly(admin, previous.as_ref()).await;
        }

        let client = self.factory.create().await?;
        session.attach_client(client.clone(), phone.clone());

        self.reply(admin, "Connecting to Telegram...").await;
        client.connect().await?;
        self.reply(admin, "Sending OTP...").await;
        let token = client.request_code(&phone).await?;

        session.code_requested(token);
        info!(
            component = "login",
            event = "login.code_requested",
            admin_id = %admin,
            "One-time code requested"
        );
        self.reply(admin, OTP_SENT).await;
        Ok(())
    }

    async fn submit_code(&self, session: &mut Session, code: &str) -> Result<(), PlatformError> {
        let admin = session.admin();
        let client = session.client().ok_or(PlatformError::NotConnected)?;
        let phone = session.phone().unwrap_or_default().to_string();
        let token = session
            .pending_code()
            .cloned()
            .ok_or_else(|| PlatformError::Protocol("no code was requested".into()))?;

        match client.sign_in(&phone, &token, code).await {
            Ok(()) => self.complete_login(session, client.as_ref()).await,
            Err(PlatformError::PasswordRequired) => {
                session.password_required();
                info!(
                    component = "login",
                    event = "login.password_required",
                    admin_id = %admin,
                    "Two-step verification enabled"
                );
                self.reply(admin, PASSWORD_PROMPT).await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn submit_password(
        &self,
        session: &mut Session,
        password: &str,
    ) -> Result<(), PlatformError> {
        let client = session.client().ok_or(PlatformError::NotConnected)?;
        let credential = client.derive_password_credential(password).await?;
        client.check_password(credential).await?;
        self.complete_login(session, client.as_ref()).await
    }

    /// Export the authorized session before advancing; without it a dropped
    /// connection could not be restored for the channel check.
    async fn complete_login(
        &self,
        session: &mut Session,
        client: &dyn PlatformClient,
    ) -> Result<(), PlatformError> {
        let admin = session.admin();
        let saved = client.export_session().await?;
        session.complete_login(saved);
        info!(
            component = "login",
            event = "login.completed",
            admin_id = %admin,
            "Signed in"
        );
        self.reply(admin, LOGIN_OK).await;
        Ok(())
    }

    async fn select_channel(&self, session: &mut Session, entity: &EntityRef) {
        let admin = session.admin();
        let Some(client) = session.client() else {
            self.reply(admin, CHANNEL_UNREACHABLE).await;
            return;
        };

        let chat = match verify_channel(client.as_ref(), entity).await {
            Ok(ChannelCheck::Accepted(chat)) => chat,
            Ok(ChannelCheck::NotAdmin) => {
                self.reply(admin, NOT_ADMIN).await;
                return;
            }
            Ok(ChannelCheck::NoInviteRight) => {
                self.reply(admin, NO_INVITE_RIGHT).await;
                return;
            }
            Err(e) => {
                warn!(
                    component = "login",
                    event = "login.channel_unreachable",
                    admin_id = %admin,
                    error = %e,
                    "Channel lookup failed"
                );
                self.reply(admin, CHANNEL_UNREACHABLE).await;
                return;
            }
        };

        session.set_channel(chat.id);
        info!(
            component = "login",
            event = "login.channel_selected",
            admin_id = %admin,
            channel_id = %chat.id,
            "Channel selected"
        );
        self.reply(
            admin,
            &format!(
                "✅ Channel {} (ID: {}) set. Starting approval...",
                chat.display_name(),
                chat.id
            ),
        )
        .await;

        self.engine.start(session).await;
    }

    async fn reply(&self, to: UserId, text: &str) {
        deliver(self.surface.as_ref(), to, text).await;
    }
}

/// Resolve the channel and check that the signed-in account administers it
/// with the invite-users right.
async fn verify_channel(
    client: &dyn PlatformClient,
    entity: &EntityRef,
) -> Result<ChannelCheck, PlatformError> {
    if !client.is_connected() {
        client.connect().await?;
    }

    let chat = client.resolve_entity(entity).await?;
    let me = client.get_me().await?;
    let status = client.participant_status(chat.id, me).await?;

    Ok(if !status.is_admin() {
        ChannelCheck::NotAdmin
    } else if !status.can_invite_users() {
        ChannelCheck::NoInviteRight
    } else {
        ChannelCheck::Accepted(chat)
    })
}

fn action_name(action: &Action) -> &'static str {
    match action {
        Action::Restart => "restart",
        Action::SubmitPhone(_) => "submit_phone",
        Action::SubmitCode(_) => "submit_code",
        Action::SubmitPassword(_) => "submit_password",
        Action::SelectChannel(_) => "select_channel",
        Action::Nudge => "nudge",
    }
}
