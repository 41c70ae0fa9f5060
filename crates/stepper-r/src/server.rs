use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use stepper_common::protocol::WireMessage;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// What the connection loops report back to the page.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected(SocketAddr),
    Message(WireMessage),
    Disconnected(SocketAddr),
}

#[derive(Clone)]
pub struct RemoteServer {
    port: u16,
    // One sender fans out to every connection (usually one extension).
    outbound_tx: broadcast::Sender<WireMessage>,
}

pub struct ServerHandle {
    pub local_addr: SocketAddr,
    pub outbound_tx: broadcast::Sender<WireMessage>,
    pub events_rx: Arc<Mutex<mpsc::Receiver<ServerEvent>>>,
}

impl ServerHandle {
    /// Number of extension connections currently attached.
    pub fn connections(&self) -> usize {
        self.outbound_tx.receiver_count()
    }
}

impl RemoteServer {
    pub fn new(port: u16) -> Self {
        let (outbound_tx, _) = broadcast::channel(100);
        Self { port, outbound_tx }
    }

    /// Bind `127.0.0.1:<port>` and accept extension connections in the background.
    pub async fn start(&self) -> Result<ServerHandle, std::io::Error> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Remote server listening on: {}", local_addr);

        let (events_tx, events_rx) = mpsc::channel(100);
        let outbound_tx = self.outbound_tx.clone();
        let accept_tx = outbound_tx.clone();

        tokio::spawn(async move {
            debug!("Server accept loop started");
            while let Ok((stream, peer)) = listener.accept().await {
                info!("Accepted TCP connection from: {}", peer);
                let outbound_rx = accept_tx.subscribe();
                tokio::spawn(accept_connection(
                    stream,
                    peer,
                    outbound_rx,
                    events_tx.clone(),
                ));
            }
        });

        Ok(ServerHandle {
            local_addr,
            outbound_tx,
            events_rx: Arc::new(Mutex::new(events_rx)),
        })
    }
}

async fn accept_connection(
    stream: TcpStream,
    peer: SocketAddr,
    mut outbound_rx: broadcast::Receiver<WireMessage>,
    events_tx: mpsc::Sender<ServerEvent>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("Error during the websocket handshake occurred: {}", e);
            return;
        }
    };

    info!("New WebSocket connection: established");
    let _ = events_tx.send(ServerEvent::Connected(peer)).await;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            // Engine -> extension
            outbound = outbound_rx.recv() => {
                let msg = match outbound {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Connection lagged behind outbound messages");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to encode outbound message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_sender.send(Message::Text(json)).await {
                    error!("Failed to send message to WS: {}", e);
                    break;
                }
            }

            // Extension -> engine
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WireMessage>(&text) {
                            Ok(msg) => {
                                if events_tx.send(ServerEvent::Message(msg)).await.is_err() {
                                    error!("Page no longer listening; dropping connection");
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("Failed to parse message from extension: {} | Text: {}", e, text);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Detach before reporting so the connection count is already updated.
    drop(outbound_rx);
    let _ = events_tx.send(ServerEvent::Disconnected(peer)).await;
}
