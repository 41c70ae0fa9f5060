use crate::server::{ServerEvent, ServerHandle};
use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use stepper_common::protocol::{
    BridgeMessage, DialogPolicy, ElementInfo, ElementRef, PageRequest, WireMessage,
};
use stepper_engine::backend::{BackendError, Page};
use stepper_engine::config::RemoteConfig;
use stepper_engine::{ActivityObserver, BroadcastChannel};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Reply = Result<Value, BackendError>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;
type ObserverSlot = Arc<Mutex<Option<Arc<ActivityObserver>>>>;

const CONNECT_POLL: Duration = Duration::from_millis(50);
/// Extra time the extension gets to report after its own idle deadline.
const NETWORK_IDLE_MARGIN: Duration = Duration::from_millis(1000);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

/// A page living in a browser extension connected over WebSocket.
pub struct RemotePage {
    outbound_tx: broadcast::Sender<WireMessage>,
    pending: PendingMap,
    observer: ObserverSlot,
    next_id: AtomicU64,
    request_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl RemotePage {
    /// Attach to a started server and relay interactive pauses over `channel`.
    pub fn attach(handle: ServerHandle, channel: BroadcastChannel, config: &RemoteConfig) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let observer: ObserverSlot = Arc::new(Mutex::new(None));
        let outbound_tx = handle.outbound_tx.clone();

        let relay = tokio::spawn(relay_bridge(channel.subscribe(), outbound_tx.clone()));
        let router = tokio::spawn(route_inbound(
            handle,
            channel,
            Arc::clone(&pending),
            Arc::clone(&observer),
        ));

        Self {
            outbound_tx,
            pending,
            observer,
            next_id: AtomicU64::new(1),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            tasks: vec![router, relay],
        }
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    async fn wait_for_connection(&self) -> Result<(), BackendError> {
        if self.outbound_tx.receiver_count() > 0 {
            return Ok(());
        }
        info!("Waiting for browser extension to connect...");
        let deadline = tokio::time::Instant::now() + self.request_timeout;
        while self.outbound_tx.receiver_count() == 0 {
            if tokio::time::Instant::now() >= deadline {
                return Err(BackendError::NotReady);
            }
            tokio::time::sleep(CONNECT_POLL).await;
        }
        info!("Extension connected.");
        Ok(())
    }

    async fn send(&self, request: PageRequest) -> Result<Value, BackendError> {
        self.send_with_timeout(request, self.request_timeout).await
    }

    /// Like `send`, but waits up to `timeout` for the reply.
    async fn send_with_timeout(
        &self,
        request: PageRequest,
        timeout: Duration,
    ) -> Result<Value, BackendError> {
        self.wait_for_connection().await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        debug!(id, ?request, "Sending page request");
        self.outbound_tx
            .send(WireMessage::PageRequest { id, request })
            .map_err(|_| BackendError::ConnectionLost)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(BackendError::ConnectionLost),
            Err(_) => Err(BackendError::Timeout(format!(
                "page request {} got no response within {}ms",
                id,
                timeout.as_millis()
            ))),
        }
    }

    async fn send_unit(&self, request: PageRequest) -> Result<(), BackendError> {
        self.send(request).await.map(|_| ())
    }

    async fn send_as<T: DeserializeOwned>(&self, request: PageRequest) -> Result<T, BackendError> {
        let value = self.send(request).await?;
        serde_json::from_value(value)
            .map_err(|e| BackendError::Remote(format!("Unexpected response shape: {}", e)))
    }
}

impl Drop for RemotePage {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Forward toast requests from the bridge to the extension.
async fn relay_bridge(
    mut bridge_rx: broadcast::Receiver<BridgeMessage>,
    outbound_tx: broadcast::Sender<WireMessage>,
) {
    loop {
        match bridge_rx.recv().await {
            Ok(msg @ BridgeMessage::ShowInteractiveToastRequest(_)) => {
                if outbound_tx.send(msg.into()).is_err() {
                    warn!("No extension connected to show interactive toast");
                }
            }
            // Responses come from the extension; echoing them back is pointless.
            Ok(BridgeMessage::InteractiveToastResponse(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Bridge relay lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Dispatch everything the extension sends.
async fn route_inbound(
    handle: ServerHandle,
    channel: BroadcastChannel,
    pending: PendingMap,
    observer: ObserverSlot,
) {
    let mut events_rx = handle.events_rx.lock().await;
    while let Some(event) = events_rx.recv().await {
        match event {
            ServerEvent::Connected(peer) => debug!(%peer, "Extension attached"),
            ServerEvent::Disconnected(peer) => {
                info!(%peer, "Extension detached");
                if handle.connections() == 0 {
                    fail_all(&pending);
                }
            }
            ServerEvent::Message(msg) => route_message(msg, &channel, &pending, &observer),
        }
    }
    fail_all(&pending);
}

fn route_message(
    msg: WireMessage,
    channel: &BroadcastChannel,
    pending: &PendingMap,
    observer: &ObserverSlot,
) {
    match msg {
        WireMessage::PageResponse {
            id,
            ok,
            value,
            error,
        } => {
            let reply = if ok {
                Ok(value)
            } else {
                Err(BackendError::Remote(
                    error.unwrap_or_else(|| "unknown error".to_string()),
                ))
            };
            match lock(pending).remove(&id) {
                Some(tx) => {
                    let _ = tx.send(reply);
                }
                None => warn!(id, "Response for unknown page request ignored"),
            }
        }
        WireMessage::ObserverEvent { event } => {
            let target = lock(observer).clone();
            match target {
                Some(observer) => observer.ingest(event),
                None => debug!(kind = event.kind(), "Observer event before listeners installed"),
            }
        }
        WireMessage::InteractiveToastResponse(response) => {
            channel.post(BridgeMessage::InteractiveToastResponse(response));
        }
        WireMessage::PageRequest { id, .. } => {
            warn!(id, "Extension sent a page request; ignoring");
        }
        WireMessage::ShowInteractiveToastRequest(request) => {
            warn!(toast_id = %request.toast_id, "Extension sent a toast request; ignoring");
        }
    }
}

fn fail_all(pending: &PendingMap) {
    for (_, tx) in lock(pending).drain() {
        let _ = tx.send(Err(BackendError::ConnectionLost));
    }
}

#[async_trait]
impl Page for RemotePage {
    async fn navigate(&self, url: &str) -> Result<(), BackendError> {
        self.send(PageRequest::Navigate {
            url: url.to_string(),
        })
        .await
        .map(|_| ())
        .map_err(|e| match e {
            BackendError::Remote(msg) => BackendError::Navigation(msg),
            other => other,
        })
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementInfo>, BackendError> {
        self.send_as(PageRequest::QueryAll {
            selector: selector.to_string(),
        })
        .await
    }

    async fn click(&self, element: &ElementRef) -> Result<(), BackendError> {
        self.send_unit(PageRequest::Click {
            element: element.clone(),
        })
        .await
    }

    async fn type_text(&self, element: &ElementRef, value: &str) -> Result<(), BackendError> {
        self.send_unit(PageRequest::TypeText {
            element: element.clone(),
            value: value.to_string(),
        })
        .await
    }

    async fn install_listeners(
        &self,
        observer: Arc<ActivityObserver>,
    ) -> Result<(), BackendError> {
        *lock(&self.observer) = Some(observer);
        self.send_unit(PageRequest::InstallListeners).await
    }

    async fn set_value(&self, element: &ElementRef, value: &str) -> Result<(), BackendError> {
        self.send_unit(PageRequest::SetValue {
            element: element.clone(),
            value: value.to_string(),
        })
        .await
    }

    async fn focus(&self, element: &ElementRef) -> Result<(), BackendError> {
        self.send_unit(PageRequest::Focus {
            element: element.clone(),
        })
        .await
    }

    async fn enable(&self, element: &ElementRef) -> Result<(), BackendError> {
        self.send_unit(PageRequest::Enable {
            element: element.clone(),
        })
        .await
    }

    async fn hover(&self, element: &ElementRef) -> Result<(), BackendError> {
        self.send_unit(PageRequest::Hover {
            element: element.clone(),
        })
        .await
    }

    async fn scroll_into_view(&self, element: &ElementRef) -> Result<(), BackendError> {
        self.send_unit(PageRequest::ScrollIntoView {
            element: element.clone(),
        })
        .await
    }

    async fn scroll_to(&self, x: i64, y: i64) -> Result<(), BackendError> {
        self.send_unit(PageRequest::ScrollTo { x, y }).await
    }

    async fn attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, BackendError> {
        self.send_as(PageRequest::Attribute {
            element: element.clone(),
            name: name.to_string(),
        })
        .await
    }

    async fn computed_style(
        &self,
        element: &ElementRef,
        property: &str,
    ) -> Result<String, BackendError> {
        self.send_as(PageRequest::ComputedStyle {
            element: element.clone(),
            property: property.to_string(),
        })
        .await
    }

    async fn execute_script(&self, script: &str) -> Result<Value, BackendError> {
        self.send(PageRequest::Execute {
            script: script.to_string(),
        })
        .await
        .map_err(|e| match e {
            BackendError::Remote(msg) => BackendError::Script(msg),
            other => other,
        })
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BackendError> {
        // The extension answers with a base64 PNG, optionally as a data URL.
        let encoded: String = self.send_as(PageRequest::Screenshot).await?;
        let data = encoded
            .split_once("base64,")
            .map(|(_, data)| data)
            .unwrap_or(&encoded);
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| BackendError::Other(format!("Base64 decode failed: {}", e)))
    }

    async fn handle_dialogs(&self, policy: DialogPolicy) -> Result<(), BackendError> {
        self.send_unit(PageRequest::HandleDialogs { policy }).await
    }

    async fn resize(&self, width: u32, height: u32) -> Result<(), BackendError> {
        self.send_unit(PageRequest::Resize { width, height }).await
    }

    async fn show_message(&self, text: &str) -> Result<(), BackendError> {
        self.send_unit(PageRequest::ShowMessage {
            text: text.to_string(),
        })
        .await
    }

    async fn wait_for_network_idle(&self, timeout_ms: u64) -> Result<bool, BackendError> {
        // The extension holds the reply until idle or its own deadline.
        let timeout = self
            .request_timeout
            .max(Duration::from_millis(timeout_ms) + NETWORK_IDLE_MARGIN);
        let value = self
            .send_with_timeout(PageRequest::NetworkIdle { timeout_ms }, timeout)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| BackendError::Remote(format!("Unexpected response shape: {}", e)))
    }
}
