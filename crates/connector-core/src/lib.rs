//! joinwarden connector core
//!
//! The platform client capability every connector implements, and the
//! classified error type the login flow and approval engine branch on.

mod error;
mod pages;

use std::sync::Arc;

use async_trait::async_trait;
use joinwarden_protocol::{
    ChannelId, ChatDescriptor, CodeToken, EntityRef, JoinRequestPage, PageCursor,
    ParticipantStatus, PasswordCredential, PlatformUpdate, UserId,
};
use tokio::sync::mpsc;

pub use error::PlatformError;
pub use pages::{pending_join_requests, JoinRequestStream};

/// An authenticated (or authenticating) connection to the messaging platform.
///
/// One instance backs exactly one login attempt. Implementations must be
/// cheap to share behind an `Arc`; every call may run concurrently with the
/// others.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn connect(&self) -> Result<(), PlatformError>;

    async fn disconnect(&self) -> Result<(), PlatformError>;

    fn is_connected(&self) -> bool;

    /// Ask the platform to send a one-time code to `phone`.
    async fn request_code(&self, phone: &str) -> Result<CodeToken, PlatformError>;

    /// Fails with [`PlatformError::PasswordRequired`] when the account has
    /// two-step verification enabled.
    async fn sign_in(&self, phone: &str, token: &CodeToken, code: &str)
        -> Result<(), PlatformError>;

    /// Derive the second-factor credential from the plain password using the
    /// platform's current password parameters.
    async fn derive_password_credential(
        &self,
        password: &str,
    ) -> Result<PasswordCredential, PlatformError>;

    async fn check_password(&self, credential: PasswordCredential) -> Result<(), PlatformError>;

    /// Serialized credential of the authenticated connection, used to
    /// restore it after a reconnect.
    async fn export_session(&self) -> Result<String, PlatformError>;

    async fn resolve_entity(&self, entity: &EntityRef) -> Result<ChatDescriptor, PlatformError>;

    async fn get_me(&self) -> Result<UserId, PlatformError>;

    async fn participant_status(
        &self,
        channel: ChannelId,
        user: UserId,
    ) -> Result<ParticipantStatus, PlatformError>;

    async fn join_request_page(
        &self,
        channel: ChannelId,
        cursor: Option<PageCursor>,
        limit: u32,
    ) -> Result<JoinRequestPage, PlatformError>;

    async fn approve_join_request(
        &self,
        channel: ChannelId,
        user: UserId,
    ) -> Result<(), PlatformError>;

    /// Register for live updates. Each call returns an independent receiver.
    async fn subscribe_updates(&self) -> Result<mpsc::Receiver<PlatformUpdate>, PlatformError>;
}

/// Creates a fresh, unconnected client for each login attempt.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn PlatformClient>, PlatformError>;
}
