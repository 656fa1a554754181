//! Bridge connector
//!
//! Spawns a platform bridge process (one per login attempt) and talks to it
//! over stdin/stdout using newline-delimited JSON. The bridge owns the
//! platform wire protocol; this side only correlates requests with
//! responses and fans out live updates.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use joinwarden_connector_core::{ClientFactory, PlatformClient, PlatformError};
use joinwarden_protocol::{
    BridgeFrame, BridgeOp, BridgeRequest, ChannelId, ChatDescriptor, CodeToken, EntityRef,
    JoinRequestPage, PageCursor, ParticipantStatus, PasswordCredential, PlatformUpdate, UserId,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Value, PlatformError>>>>>;
type Subscribers = Arc<Mutex<Vec<mpsc::Sender<PlatformUpdate>>>>;

/// How to launch the bridge and authenticate the application
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub program: String,
    pub args: Vec<String>,
    pub api_id: i32,
    pub api_hash: String,
    pub request_timeout: Duration,
}

impl BridgeConfig {
    pub fn new(program: impl Into<String>, api_id: i32, api_hash: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            api_id,
            api_hash: api_hash.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Creates one bridge process per login attempt.
pub struct BridgeClientFactory {
    config: Arc<BridgeConfig>,
}

impl BridgeClientFactory {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl ClientFactory for BridgeClientFactory {
    async fn create(&self) -> Result<Arc<dyn PlatformClient>, PlatformError> {
        let client = BridgeClient::spawn(self.config.clone())?;
        Ok(Arc::new(client))
    }
}

#[derive(Deserialize)]
struct SentCode {
    phone_code_hash: CodeToken,
}

#[derive(Deserialize)]
struct Authorized {
    #[serde(default)]
    session: Option<String>,
}

#[derive(Deserialize)]
struct Me {
    id: UserId,
}

pub struct BridgeClient {
    config: Arc<BridgeConfig>,
    stdin_tx: mpsc::Sender<String>,
    child: Arc<Mutex<Child>>,
    pending: PendingMap,
    subscribers: Subscribers,
    connected: Arc<AtomicBool>,
    session: ArcSwap<String>,
}

impl BridgeClient {
    /// Spawn the bridge process. The process is not yet connected to the
    /// platform; call [`PlatformClient::connect`].
    pub fn spawn(config: Arc<BridgeConfig>) -> Result<Self, PlatformError> {
        info!(
            component = "bridge_connector",
            event = "bridge.spawn",
            program = %config.program,
            "Spawning platform bridge"
        );

        let mut child = tokio::process::Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PlatformError::Transport(format!(
                    "Failed to spawn bridge {}: {}",
                    config.program, e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PlatformError::Transport("No stdin on bridge".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlatformError::Transport("No stdout on bridge".into()))?;

        let (stdin_tx, stdin_rx) = mpsc::channel::<String>(256);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let connected = Arc::new(AtomicBool::new(false));

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(
                        component = "bridge_connector",
                        event = "bridge.stderr",
                        line = %line,
                        "Bridge stderr"
                    );
                }
            });
        }

        tokio::spawn(Self::stdin_writer(stdin, stdin_rx));
        tokio::spawn(Self::read_loop(
            stdout,
            pending.clone(),
            subscribers.clone(),
            connected.clone(),
        ));

        Ok(Self {
            config,
            stdin_tx,
            child: Arc::new(Mutex::new(child)),
            pending,
            subscribers,
            connected,
            session: ArcSwap::from_pointee(String::new()),
        })
    }

    /// Send a request and wait for its correlated response.
    async fn call(&self, op: BridgeOp) -> Result<Value, PlatformError> {
        let request = BridgeRequest::new(op);
        let id = request.id.clone();
        let op_name = request.op.name();
        let line = serde_json::to_string(&request)
            .map_err(|e| PlatformError::Protocol(format!("encode {op_name}: {e}")))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        debug!(
            component = "bridge_connector",
            event = "bridge.request",
            request_id = %id,
            op = op_name,
            "Sending bridge request"
        );

        if self.stdin_tx.send(line).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(PlatformError::ChannelClosed);
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                Err(PlatformError::ChannelClosed)
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(PlatformError::Transport(format!(
                    "{op_name} timed out after {}s",
                    self.config.request_timeout.as_secs()
                )))
            }
        }
    }

    async fn call_as<T: DeserializeOwned>(&self, op: BridgeOp) -> Result<T, PlatformError> {
        let op_name = op.name();
        let value = self.call(op).await?;
        serde_json::from_value(value)
            .map_err(|e| PlatformError::Protocol(format!("decode {op_name}: {e}")))
    }

    /// Keep a `session` string from an authorization result. Returns it when
    /// one was present; `null` results carry none.
    fn remember_session(&self, result: Value) -> Option<String> {
        if result.is_null() {
            return None;
        }
        match serde_json::from_value::<Authorized>(result) {
            Ok(Authorized {
                session: Some(session),
            }) => {
                self.session.store(Arc::new(session.clone()));
                Some(session)
            }
            Ok(Authorized { session: None }) => None,
            Err(e) => {
                warn!(
                    component = "bridge_connector",
                    event = "bridge.session_undecodable",
                    error = %e,
                    "Ignoring malformed session in bridge result"
                );
                None
            }
        }
    }

    async fn stdin_writer(mut stdin: tokio::process::ChildStdin, mut rx: mpsc::Receiver<String>) {
        while let Some(mut line) = rx.recv().await {
            line.push('\n');
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                error!(
                    component = "bridge_connector",
                    event = "bridge.stdin.write_error",
                    error = %e,
                    "Failed to write to bridge stdin"
                );
                break;
            }
            if let Err(e) = stdin.flush().await {
                error!(
                    component = "bridge_connector",
                    event = "bridge.stdin.flush_error",
                    error = %e,
                    "Failed to flush bridge stdin"
                );
                break;
            }
        }
        debug!(
            component = "bridge_connector",
            event = "bridge.stdin.closed",
            "Stdin writer task ended"
        );
    }

    /// Read stdout line-by-line until EOF, resolving pending requests and
    /// forwarding updates. On exit every waiter and subscriber is released.
    async fn read_loop(
        stdout: tokio::process::ChildStdout,
        pending: PendingMap,
        subscribers: Subscribers,
        connected: Arc<AtomicBool>,
    ) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<BridgeFrame>(line) {
                        Ok(frame) => Self::dispatch_frame(frame, &pending, &subscribers).await,
                        Err(e) => {
                            warn!(
                                component = "bridge_connector",
                                event = "bridge.stdout.parse_error",
                                error = %e,
                                line_preview = %line.chars().take(200).collect::<String>(),
                                "Failed to parse bridge stdout"
                            );
                        }
                    }
                }
                Ok(None) => {
                    info!(
                        component = "bridge_connector",
                        event = "bridge.stdout.eof",
                        "Bridge stdout EOF"
                    );
                    break;
                }
                Err(e) => {
                    error!(
                        component = "bridge_connector",
                        event = "bridge.stdout.read_error",
                        error = %e,
                        "Error reading bridge stdout"
                    );
                    break;
                }
            }
        }

        connected.store(false, Ordering::SeqCst);
        for (_, tx) in pending.lock().await.drain() {
            let _ = tx.send(Err(PlatformError::ChannelClosed));
        }
        subscribers.lock().await.clear();
    }

    async fn dispatch_frame(frame: BridgeFrame, pending: &PendingMap, subscribers: &Subscribers) {
        match frame {
            BridgeFrame::Response {
                id,
                ok,
                result,
                error,
            } => {
                let Some(tx) = pending.lock().await.remove(&id) else {
                    debug!(
                        component = "bridge_connector",
                        event = "bridge.response.orphaned",
                        request_id = %id,
                        "Response for unknown or timed-out request"
                    );
                    return;
                };
                let outcome = if ok {
                    Ok(result)
                } else {
                    Err(match error {
                        Some(body) => PlatformError::from_rpc(body.code, &body.message, body.seconds),
                        None => PlatformError::Protocol("error response without body".into()),
                    })
                };
                let _ = tx.send(outcome);
            }
            BridgeFrame::Update { update } => {
                let mut subs = subscribers.lock().await;
                subs.retain(|tx| !tx.is_closed());
                for tx in subs.iter() {
                    if tx.try_send(update.clone()).is_err() {
                        warn!(
                            component = "bridge_connector",
                            event = "bridge.update.dropped",
                            "Update subscriber full or closed"
                        );
                    }
                }
            }
        }
    }
}

#[async_trait]
impl PlatformClient for BridgeClient {
    async fn connect(&self) -> Result<(), PlatformError> {
        let session = self.session.load();
        self.call(BridgeOp::Connect {
            api_id: self.config.api_id,
            api_hash: self.config.api_hash.clone(),
            session: (!session.is_empty()).then(|| (**session).clone()),
        })
        .await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PlatformError> {
        let result = self.call(BridgeOp::Disconnect).await.map(|_| ());
        self.connected.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            debug!(
                component = "bridge_connector",
                event = "bridge.kill_failed",
                error = %e,
                "Bridge process already gone"
            );
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn request_code(&self, phone: &str) -> Result<CodeToken, PlatformError> {
        let sent: SentCode = self
            .call_as(BridgeOp::SendCode {
                phone: phone.to_string(),
            })
            .await?;
        Ok(sent.phone_code_hash)
    }

    async fn sign_in(
        &self,
        phone: &str,
        token: &CodeToken,
        code: &str,
    ) -> Result<(), PlatformError> {
        let result = self
            .call(BridgeOp::SignIn {
                phone: phone.to_string(),
                phone_code_hash: token.clone(),
                code: code.to_string(),
            })
            .await?;
        self.remember_session(result);
        Ok(())
    }

    async fn derive_password_credential(
        &self,
        password: &str,
    ) -> Result<PasswordCredential, PlatformError> {
        self.call(BridgeOp::DerivePassword {
            password: password.to_string(),
        })
        .await
        .map(PasswordCredential)
    }

    async fn check_password(&self, credential: PasswordCredential) -> Result<(), PlatformError> {
        let result = self.call(BridgeOp::CheckPassword { credential }).await?;
        self.remember_session(result);
        Ok(())
    }

    async fn export_session(&self) -> Result<String, PlatformError> {
        let result = self.call(BridgeOp::ExportSession).await?;
        if let Some(session) = self.remember_session(result) {
            return Ok(session);
        }

        let known = self.session.load_full();
        if known.is_empty() {
            return Err(PlatformError::Protocol("bridge returned no session".into()));
        }
        Ok((*known).clone())
    }

    async fn resolve_entity(&self, entity: &EntityRef) -> Result<ChatDescriptor, PlatformError> {
        self.call_as(BridgeOp::ResolveEntity {
            entity: entity.clone(),
        })
        .await
    }

    async fn get_me(&self) -> Result<UserId, PlatformError> {
        let me: Me = self.call_as(BridgeOp::GetMe).await?;
        Ok(me.id)
    }

    async fn participant_status(
        &self,
        channel: ChannelId,
        user: UserId,
    ) -> Result<ParticipantStatus, PlatformError> {
        self.call_as(BridgeOp::GetParticipant {
            channel_id: channel,
            user_id: user,
        })
        .await
    }

    async fn join_request_page(
        &self,
        channel: ChannelId,
        cursor: Option<PageCursor>,
        limit: u32,
    ) -> Result<JoinRequestPage, PlatformError> {
        self.call_as(BridgeOp::GetJoinRequests {
            channel_id: channel,
            cursor,
            limit,
        })
        .await
    }

    async fn approve_join_request(
        &self,
        channel: ChannelId,
        user: UserId,
    ) -> Result<(), PlatformError> {
        self.call(BridgeOp::ApproveJoinRequest {
            channel_id: channel,
            user_id: user,
        })
        .await
        .map(|_| ())
    }

    async fn subscribe_updates(&self) -> Result<mpsc::Receiver<PlatformUpdate>, PlatformError> {
        let (tx, rx) = mpsc::channel(256);
        self.subscribers.lock().await.push(tx);
        Ok(rx)
    }
}
