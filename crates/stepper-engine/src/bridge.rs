use crate::config::BridgeConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use stepper_common::protocol::{
    BridgeMessage, ToastAction, ToastOptions, ToastRequest, ToastResponse,
};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Cross-context channel shared by the interpreter and presentation surfaces.
///
/// Every subscriber sees every message, including the ones it posted.
#[derive(Clone)]
pub struct BroadcastChannel {
    tx: broadcast::Sender<BridgeMessage>,
}

impl BroadcastChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of subscribers that received the message.
    pub fn post(&self, message: BridgeMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeMessage> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("User cancelled interaction {toast_id}")]
    Cancelled { toast_id: String },

    #[error("No response to interaction {toast_id} within {timeout_ms}ms")]
    Expired { toast_id: String, timeout_ms: u64 },

    #[error("Bridge closed before a response arrived")]
    Closed,
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<ToastAction>>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<String, oneshot::Sender<ToastAction>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a pending entry however the waiting future ends.
struct PendingGuard {
    pending: PendingMap,
    toast_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.toast_id);
    }
}

/// Correlates interactive pause requests with their responses.
pub struct PauseBridge {
    channel: BroadcastChannel,
    pending: PendingMap,
    response_timeout: Option<Duration>,
    listener: JoinHandle<()>,
}

impl PauseBridge {
    /// Start listening for responses on `channel`.
    pub fn spawn(channel: BroadcastChannel, config: &BridgeConfig) -> Arc<Self> {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let rx = channel.subscribe();
        let listener = tokio::spawn(listen(rx, Arc::clone(&pending)));

        Arc::new(Self {
            channel,
            pending,
            response_timeout: config.response_timeout_ms.map(Duration::from_millis),
            listener,
        })
    }

    pub fn channel(&self) -> &BroadcastChannel {
        &self.channel
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Ask the operator to confirm and wait for the answer.
    ///
    /// Only an explicit `continue` resolves; any other action rejects.
    pub async fn request(
        &self,
        message: &str,
        options: ToastOptions,
    ) -> Result<String, BridgeError> {
        let toast_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(toast_id.clone(), tx);
        let _guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            toast_id: toast_id.clone(),
        };

        let delivered = self
            .channel
            .post(BridgeMessage::ShowInteractiveToastRequest(ToastRequest {
                toast_id: toast_id.clone(),
                message: message.to_string(),
                options,
            }));
        info!(toast_id = %toast_id, delivered, "Waiting for operator response");

        let action = match self.response_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(answer) => answer.map_err(|_| BridgeError::Closed)?,
                Err(_) => {
                    return Err(BridgeError::Expired {
                        toast_id,
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => rx.await.map_err(|_| BridgeError::Closed)?,
        };

        match action {
            ToastAction::Continue => Ok("User chose to continue".to_string()),
            ToastAction::Cancel | ToastAction::Other => Err(BridgeError::Cancelled { toast_id }),
        }
    }
}

impl Drop for PauseBridge {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn listen(mut rx: broadcast::Receiver<BridgeMessage>, pending: PendingMap) {
    loop {
        match rx.recv().await {
            Ok(BridgeMessage::InteractiveToastResponse(response)) => settle(&pending, response),
            Ok(BridgeMessage::ShowInteractiveToastRequest(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Bridge listener lagged; responses may be lost");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("Bridge listener stopped");
}

fn settle(pending: &PendingMap, response: ToastResponse) {
    let sender = lock(pending).remove(&response.toast_id);
    match sender {
        Some(tx) => {
            debug!(toast_id = %response.toast_id, action = ?response.action, "Settling interaction");
            let _ = tx.send(response.action);
        }
        None => warn!(toast_id = %response.toast_id, "Response for unknown interaction ignored"),
    }
}
