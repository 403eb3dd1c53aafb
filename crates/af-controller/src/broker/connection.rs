//! Attachment to the privileged broker
//!
//! Maintains the Unix socket connection to the broker daemon, tracks the
//! permission grant, and turns socket traffic into [`BrokerEvent`]s on a
//! single channel consumed only by the controller owner task.
//!
//! Detach (socket EOF or read error) is authoritative: every in-flight
//! command resolves to `TransportLost` and its late result, should one
//! still be in the socket buffer, is never surfaced.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use af_core::error::ControllerError;
use af_core::ipc::{BrokerPush, BrokerRequest};
use af_core::traits::{Broker, BrokerEvent};
use af_core::types::CommandResult;

/// Channel capacity for events from the broker.
///
/// The controller drains this promptly; 64 covers a burst of lifecycle and
/// permission events without unbounded growth.
const BROKER_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Client name reported to the broker on attach
const CLIENT_NAME: &str = "appfreeze-controller";

struct ConnInner {
    /// Write half of the socket; `None` until attached and after detach
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Whether the broker is currently attached
    attached: AtomicBool,
    /// Whether the execution permission is granted
    permission: AtomicBool,
    /// Whether a permission request is outstanding (single-flight)
    permission_pending: AtomicBool,
    /// Correlation id counter for requests
    next_id: AtomicU64,
    /// In-flight `Exec` requests awaiting their result
    pending: Mutex<HashMap<u64, oneshot::Sender<CommandResult>>>,
    /// Event channel to the controller owner task
    events: mpsc::Sender<BrokerEvent>,
}

/// Connection to the privileged broker daemon
pub struct BrokerConnection {
    inner: Arc<ConnInner>,
    cancel: CancellationToken,
    shutdown_done: AtomicBool,
}

impl BrokerConnection {
    /// Start attaching to the broker at `socket_path`.
    ///
    /// Non-blocking: returns immediately with the connection handle and the
    /// event receiver. Attachment completes (or silently fails) in the
    /// background; a broker that never answers leaves the connection
    /// `Disconnected` indefinitely, with no automatic retry.
    pub fn connect(
        socket_path: impl Into<PathBuf>,
        connect_timeout: Duration,
    ) -> (Arc<Self>, mpsc::Receiver<BrokerEvent>) {
        let (event_tx, event_rx) = mpsc::channel(BROKER_EVENT_CHANNEL_CAPACITY);

        let inner = Arc::new(ConnInner {
            writer: Mutex::new(None),
            attached: AtomicBool::new(false),
            permission: AtomicBool::new(false),
            permission_pending: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            events: event_tx,
        });

        let connection = Arc::new(Self {
            inner: Arc::clone(&inner),
            cancel: CancellationToken::new(),
            shutdown_done: AtomicBool::new(false),
        });

        let socket_path = socket_path.into();
        let cancel = connection.cancel.clone();
        tokio::spawn(async move {
            let stream = match tokio::time::timeout(
                connect_timeout,
                UnixStream::connect(&socket_path),
            )
            .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::warn!(path = %socket_path.display(), "Broker socket unavailable: {}", e);
                    return;
                }
                Err(_) => {
                    tracing::warn!(path = %socket_path.display(), "Broker attach timed out");
                    return;
                }
            };

            let (read_half, mut write_half) = stream.into_split();

            if let Err(e) = write_line(&mut write_half, &BrokerRequest::Attach {
                client: CLIENT_NAME.to_string(),
            })
            .await
            {
                tracing::warn!("Failed to send attach request: {}", e);
                return;
            }
            *inner.writer.lock().await = Some(write_half);

            run_reader(inner, read_half, cancel).await;
        });

        (connection, event_rx)
    }

    /// Tear down the connection. Terminal and irreversible; called exactly
    /// once at controller shutdown, further calls are no-ops.
    pub async fn shutdown(&self) {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Unbinding broker connection");
        self.cancel.cancel();
        self.inner.writer.lock().await.take();
        self.inner.attached.store(false, Ordering::SeqCst);
    }

    async fn send_request(&self, request: &BrokerRequest) -> Result<(), ControllerError> {
        let mut writer = self.inner.writer.lock().await;
        let Some(write_half) = writer.as_mut() else {
            return Err(ControllerError::ConnectionUnavailable);
        };
        write_line(write_half, request).await.map_err(|e| {
            tracing::warn!("Broker write failed: {}", e);
            ControllerError::TransportLost
        })
    }
}

#[async_trait]
impl Broker for BrokerConnection {
    fn is_reachable(&self) -> bool {
        self.inner.attached.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    fn has_permission(&self) -> bool {
        self.inner.permission.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> Result<(), ControllerError> {
        if !self.is_reachable() {
            return Err(ControllerError::ConnectionUnavailable);
        }
        // Single-flight: a second request while one is pending is a no-op.
        if self.inner.permission_pending.swap(true, Ordering::SeqCst) {
            tracing::debug!("Permission request already pending");
            return Ok(());
        }

        let request_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::info!(request_id, "Requesting broker permission");
        if let Err(e) = self
            .send_request(&BrokerRequest::RequestPermission { request_id })
            .await
        {
            self.inner.permission_pending.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    async fn execute(&self, argv: Vec<String>) -> Result<CommandResult, ControllerError> {
        if !self.is_reachable() {
            return Err(ControllerError::ConnectionUnavailable);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id, tx);

        if let Err(e) = self.send_request(&BrokerRequest::Exec { id, argv }).await {
            self.inner.pending.lock().await.remove(&id);
            return Err(e);
        }

        // The sender is dropped on detach, resolving the wait to an error
        // rather than leaving the worker hanging on a dead socket.
        rx.await.map_err(|_| ControllerError::TransportLost)
    }
}

async fn write_line(
    writer: &mut OwnedWriteHalf,
    request: &BrokerRequest,
) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(request).map_err(std::io::Error::other)?;
    line.push(b'\n');
    writer.write_all(&line).await
}

async fn run_reader(
    inner: Arc<ConnInner>,
    read_half: OwnedReadHalf,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_push(&inner, &line).await,
                Ok(None) => {
                    tracing::info!("Broker closed the connection");
                    break;
                }
                Err(e) => {
                    tracing::warn!("Broker read error: {}", e);
                    break;
                }
            },
        }
    }

    detach(&inner).await;
}

async fn handle_push(inner: &Arc<ConnInner>, line: &str) {
    let push: BrokerPush = match serde_json::from_str(line) {
        Ok(push) => push,
        Err(e) => {
            tracing::warn!("Unparseable broker push: {}", e);
            return;
        }
    };

    match push {
        BrokerPush::Attached { permission } => {
            inner.attached.store(true, Ordering::SeqCst);
            inner.permission.store(permission, Ordering::SeqCst);
            tracing::info!(permission, "Broker attached");
            let _ = inner.events.send(BrokerEvent::Attached).await;
        }
        BrokerPush::PermissionResult {
            request_id,
            granted,
        } => {
            inner.permission.store(granted, Ordering::SeqCst);
            inner.permission_pending.store(false, Ordering::SeqCst);
            tracing::info!(request_id, granted, "Permission result");
            let _ = inner
                .events
                .send(BrokerEvent::PermissionResult {
                    request_id,
                    granted,
                })
                .await;
        }
        BrokerPush::ExecResult {
            id,
            exit_code,
            stdout,
            stderr,
        } => {
            let sender = inner.pending.lock().await.remove(&id);
            match sender {
                Some(tx) => {
                    let _ = tx.send(CommandResult {
                        exit_code,
                        stdout,
                        stderr,
                    });
                }
                // Late result for an attempt already abandoned; drop it.
                None => tracing::debug!(id, "Discarding unexpected exec result"),
            }
        }
        BrokerPush::Pong => {}
    }
}

async fn detach(inner: &Arc<ConnInner>) {
    let was_attached = inner.attached.swap(false, Ordering::SeqCst);
    inner.permission_pending.store(false, Ordering::SeqCst);
    inner.writer.lock().await.take();

    // Fail every in-flight command; their results are now meaningless.
    inner.pending.lock().await.clear();

    if was_attached {
        let _ = inner.events.send(BrokerEvent::Detached).await;
    }
}
