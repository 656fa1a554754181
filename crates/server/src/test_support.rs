//! In-memory platform client and reply sink for server tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use joinwarden_connector_core::{ClientFactory, PlatformClient, PlatformError};
use joinwarden_protocol::{
    AdminRights, ChannelId, ChatDescriptor, CodeToken, EntityRef, JoinRequest, JoinRequestPage,
    PageCursor, ParticipantStatus, PasswordCredential, PlatformUpdate, UserId,
};
use tokio::sync::{mpsc, Notify, Semaphore};

use crate::surface::{ReplySink, SurfaceError};

pub const EXAMPLE_CHANNEL: ChannelId = ChannelId(-1003784917581);
pub const SELF_ID: UserId = UserId(4242);

#[derive(Default)]
struct FakeState {
    backlog: Vec<UserId>,
    page_failures: HashMap<usize, PlatformError>,
    approval_scripts: HashMap<UserId, VecDeque<Result<(), PlatformError>>>,
    approval_calls: Vec<UserId>,
    page_requests: usize,
    subscribers: Vec<mpsc::Sender<PlatformUpdate>>,
    connect_error: Option<PlatformError>,
    code_error: Option<PlatformError>,
    sign_in_error: Option<PlatformError>,
    password_error: Option<PlatformError>,
    resolve_error: Option<PlatformError>,
    disconnect_error: Option<PlatformError>,
    export_error: Option<PlatformError>,
    subscribe_error: Option<PlatformError>,
    calls: Vec<&'static str>,
    participant: Option<ParticipantStatus>,
    signed_in: bool,
    passwords: Vec<String>,
}

/// Scriptable [`PlatformClient`]. Unscripted calls succeed.
pub struct FakeClient {
    state: Mutex<FakeState>,
    connected: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    subscribed: Notify,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::with_backlog(0)
    }

    /// Pending requests from users `1..=count`.
    pub fn with_backlog(count: i64) -> Self {
        let state = FakeState {
            backlog: (1..=count).map(UserId).collect(),
            ..FakeState::default()
        };
        Self {
            state: Mutex::new(state),
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            subscribed: Notify::new(),
            gate: Mutex::new(None),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Queue results for successive approval calls for `user`.
    pub fn script_approval(&self, user: UserId, results: Vec<Result<(), PlatformError>>) {
        self.state()
            .approval_scripts
            .insert(user, results.into_iter().collect());
    }

    /// The zero-based `page`-th listing call fails with `error`.
    pub fn fail_page(&self, page: usize, error: PlatformError) {
        self.state().page_failures.insert(page, error);
    }

    pub fn fail_connect(&self, error: PlatformError) {
        self.state().connect_error = Some(error);
    }

    pub fn fail_request_code(&self, error: PlatformError) {
        self.state().code_error = Some(error);
    }

    pub fn fail_sign_in(&self, error: PlatformError) {
        self.state().sign_in_error = Some(error);
    }

    pub fn fail_password(&self, error: PlatformError) {
        self.state().password_error = Some(error);
    }

    pub fn fail_resolve(&self, error: PlatformError) {
        self.state().resolve_error = Some(error);
    }

    pub fn fail_disconnect(&self, error: PlatformError) {
        self.state().disconnect_error = Some(error);
    }

    pub fn fail_export(&self, error: PlatformError) {
        self.state().export_error = Some(error);
    }

    pub fn fail_subscribe(&self, error: PlatformError) {
        self.state().subscribe_error = Some(error);
    }

    pub fn set_participant(&self, status: ParticipantStatus) {
        self.state().participant = Some(status);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Approvals block until permits are added to the returned semaphore.
    pub fn hold_approvals(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn approval_calls(&self) -> Vec<UserId> {
        self.state().approval_calls.clone()
    }

    pub fn approval_calls_for(&self, user: UserId) -> usize {
        self.state()
            .approval_calls
            .iter()
            .filter(|u| **u == user)
            .count()
    }

    /// Order of subscription and listing calls, as `"subscribe"` and `"page"`.
    pub fn call_order(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn page_requests(&self) -> usize {
        self.state().page_requests
    }

    pub fn subscriptions(&self) -> usize {
        self.state().subscribers.len()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn passwords(&self) -> Vec<String> {
        self.state().passwords.clone()
    }

    pub async fn wait_for_subscription(&self) {
        loop {
            let notified = self.subscribed.notified();
            if self.subscriptions() > 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn push_update(&self, update: PlatformUpdate) {
        for tx in &self.state().subscribers {
            let _ = tx.try_send(update.clone());
        }
    }
}

#[async_trait]
impl PlatformClient for FakeClient {
    async fn connect(&self) -> Result<(), PlatformError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.state().connect_error.clone() {
            return Err(error);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PlatformError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.state().subscribers.clear();
        match self.state().disconnect_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn request_code(&self, phone: &str) -> Result<CodeToken, PlatformError> {
        match self.state().code_error.clone() {
            Some(error) => Err(error),
            None => Ok(CodeToken(format!("hash-{phone}"))),
        }
    }

    async fn sign_in(
        &self,
        _phone: &str,
        _token: &CodeToken,
        _code: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        match state.sign_in_error.clone() {
            Some(error) => Err(error),
            None => {
                state.signed_in = true;
                Ok(())
            }
        }
    }

    async fn derive_password_credential(
        &self,
        password: &str,
    ) -> Result<PasswordCredential, PlatformError> {
        self.state().passwords.push(password.to_string());
        Ok(PasswordCredential(serde_json::json!({ "srp": password.len() })))
    }

    async fn check_password(&self, _credential: PasswordCredential) -> Result<(), PlatformError> {
        let mut state = self.state();
        match state.password_error.clone() {
            Some(error) => Err(error),
            None => {
                state.signed_in = true;
                Ok(())
            }
        }
    }

    async fn export_session(&self) -> Result<String, PlatformError> {
        let state = self.state();
        match state.export_error.clone() {
            Some(error) => Err(error),
            None if state.signed_in => Ok("1BVtsOK8Bu".to_string()),
            None => Err(PlatformError::NotConnected),
        }
    }

    async fn resolve_entity(&self, entity: &EntityRef) -> Result<ChatDescriptor, PlatformError> {
        if let Some(error) = self.state().resolve_error.clone() {
            return Err(error);
        }
        match entity {
            EntityRef::Username(name) if name == "ExampleChannel" => Ok(example_channel()),
            EntityRef::Id(id) if id.same_channel(EXAMPLE_CHANNEL) => Ok(example_channel()),
            _ => Err(PlatformError::Rpc {
                code: 400,
                message: "USERNAME_NOT_OCCUPIED".into(),
            }),
        }
    }

    async fn get_me(&self) -> Result<UserId, PlatformError> {
        Ok(SELF_ID)
    }

    async fn participant_status(
        &self,
        _channel: ChannelId,
        _user: UserId,
    ) -> Result<ParticipantStatus, PlatformError> {
        Ok(self
            .state()
            .participant
            .unwrap_or(ParticipantStatus::Admin {
                rights: Some(AdminRights {
                    invite_users: true,
                    ..AdminRights::default()
                }),
            }))
    }

    async fn join_request_page(
        &self,
        _channel: ChannelId,
        cursor: Option<PageCursor>,
        limit: u32,
    ) -> Result<JoinRequestPage, PlatformError> {
        let mut state = self.state();
        let page = state.page_requests;
        state.page_requests += 1;
        state.calls.push("page");
        if let Some(error) = state.page_failures.remove(&page) {
            return Err(error);
        }

        let start = cursor
            .map(|c| {
                state
                    .backlog
                    .iter()
                    .position(|u| *u == c.offset_user)
                    .map_or(state.backlog.len(), |i| i + 1)
            })
            .unwrap_or(0);
        let requests: Vec<JoinRequest> = state
            .backlog
            .iter()
            .skip(start)
            .take(limit as usize)
            .map(|user_id| JoinRequest {
                user_id: *user_id,
                requested_at: Some(1_700_000_000),
                about: None,
            })
            .collect();
        // a short page is the last one
        let next_cursor = requests
            .last()
            .filter(|_| requests.len() == limit as usize)
            .map(|last| PageCursor {
                offset_date: 1_700_000_000,
                offset_user: last.user_id,
            });

        Ok(JoinRequestPage {
            requests,
            next_cursor,
        })
    }

    async fn approve_join_request(
        &self,
        _channel: ChannelId,
        user: UserId,
    ) -> Result<(), PlatformError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut state = self.state();
        state.approval_calls.push(user);
        state
            .approval_scripts
            .get_mut(&user)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()))
    }

    async fn subscribe_updates(&self) -> Result<mpsc::Receiver<PlatformUpdate>, PlatformError> {
        let mut state = self.state();
        state.calls.push("subscribe");
        if let Some(error) = state.subscribe_error.clone() {
            return Err(error);
        }
        let (tx, rx) = mpsc::channel(64);
        state.subscribers.push(tx);
        drop(state);
        self.subscribed.notify_waiters();
        Ok(rx)
    }
}

fn example_channel() -> ChatDescriptor {
    ChatDescriptor {
        id: EXAMPLE_CHANNEL,
        title: Some("Example Channel".into()),
        username: Some("ExampleChannel".into()),
    }
}

/// Hands out prepared clients in order, then fresh default ones.
#[derive(Default)]
pub struct FakeFactory {
    queued: Mutex<VecDeque<Arc<FakeClient>>>,
    created: Mutex<Vec<Arc<FakeClient>>>,
}

impl FakeFactory {
    pub fn with_clients(clients: Vec<Arc<FakeClient>>) -> Self {
        Self {
            queued: Mutex::new(clients.into_iter().collect()),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> Vec<Arc<FakeClient>> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientFactory for FakeFactory {
    async fn create(&self) -> Result<Arc<dyn PlatformClient>, PlatformError> {
        let client = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Arc::new(FakeClient::new()));
        self.created.lock().unwrap().push(client.clone());
        Ok(client)
    }
}

/// Records every reply in order.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(UserId, String)>>,
    changed: Notify,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, to: UserId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == to)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.sent().last().map(|(_, text)| text.clone())
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.sent().iter().any(|(_, text)| text.contains(needle))
    }

    /// Wait until some reply contains `needle`. Panics after 10s.
    pub async fn wait_for(&self, needle: &str) {
        let wait = async {
            loop {
                let notified = self.changed.notified();
                if self.contains(needle) {
                    return;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(Duration::from_secs(10), wait)
            .await
            .is_err()
        {
            panic!("no reply containing {needle:?}; sent: {:?}", self.sent());
        }
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn send_text(&self, to: UserId, text: &str) -> Result<(), SurfaceError> {
        self.sent.lock().unwrap().push((to, text.to_string()));
        self.changed.notify_waiters();
        Ok(())
    }
}
