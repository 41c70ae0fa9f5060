use futures::{SinkExt, StreamExt};
use serde_json::json;
use serial_test::serial;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stepper_common::protocol::{
    ElementRef, PageRequest, ToastAction, ToastOptions, ToastResponse, WireMessage,
};
use stepper_common::{EventDetails, ObserverEvent};
use stepper_engine::backend::{BackendError, Page};
use stepper_engine::config::{BridgeConfig, InterpreterConfig, ObserverConfig, RemoteConfig};
use stepper_engine::{
    ActivityObserver, BroadcastChannel, Interpreter, MemoryLogSink, PauseBridge, RecipeStore,
    RunOutput, StepResult,
};
use stepper_r::{RemotePage, RemoteServer};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect_simulated_client(addr: SocketAddr) -> Client {
    let url = format!("ws://{}", addr);
    for _ in 0..10 {
        if let Ok((ws_stream, _)) = connect_async(&url).await {
            return ws_stream;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("Failed to connect to simulated server");
}

async fn next_wire(client: &mut Client) -> WireMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("Timeout waiting for server message")
            .expect("Client stream ended unexpectedly")
            .expect("WS error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("Failed to deserialize");
        }
    }
}

async fn send_wire(client: &mut Client, msg: &WireMessage) {
    let text = serde_json::to_string(msg).unwrap();
    client.send(Message::Text(text)).await.unwrap();
}

async fn setup(timeout_ms: u64) -> (Arc<RemotePage>, BroadcastChannel, Client) {
    let server = RemoteServer::new(0);
    let handle = server.start().await.expect("Failed to start server");
    let addr = handle.local_addr;
    let channel = BroadcastChannel::new(16);
    let config = RemoteConfig {
        port: 0,
        request_timeout_ms: timeout_ms,
    };
    let page = Arc::new(RemotePage::attach(handle, channel.clone(), &config));
    let client = connect_simulated_client(addr).await;
    (page, channel, client)
}

#[tokio::test]
#[serial]
async fn test_page_request_round_trip() {
    let (page, _channel, mut client) = setup(2000).await;

    let query = tokio::spawn({
        let page = page.clone();
        async move { page.query_all("button").await }
    });

    let id = match next_wire(&mut client).await {
        WireMessage::PageRequest {
            id,
            request: PageRequest::QueryAll { selector },
        } => {
            assert_eq!(selector, "button");
            id
        }
        other => panic!("Wrong message received: {:?}", other),
    };
    send_wire(
        &mut client,
        &WireMessage::PageResponse {
            id,
            ok: true,
            value: json!([{"element": "el-1", "tag": "button", "text": "Go"}]),
            error: None,
        },
    )
    .await;

    let elements = query.await.unwrap().unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].element, ElementRef("el-1".into()));
    assert_eq!(elements[0].text, "Go");
    assert_eq!(page.pending_count(), 0);
}

#[tokio::test]
#[serial]
async fn test_remote_error_is_reported() {
    let (page, _channel, mut client) = setup(2000).await;

    let exec = tokio::spawn({
        let page = page.clone();
        async move { page.execute_script("nope()").await }
    });
    let id = match next_wire(&mut client).await {
        WireMessage::PageRequest { id, .. } => id,
        other => panic!("Wrong message received: {:?}", other),
    };
    send_wire(
        &mut client,
        &WireMessage::PageResponse {
            id,
            ok: false,
            value: serde_json::Value::Null,
            error: Some("nope is not defined".into()),
        },
    )
    .await;

    assert_eq!(
        exec.await.unwrap(),
        Err(BackendError::Script("nope is not defined".into()))
    );
}

#[tokio::test]
#[serial]
async fn test_observer_events_reach_observer() {
    let (page, _channel, mut client) = setup(2000).await;
    let observer = ActivityObserver::new(ObserverConfig::default());
    observer.start();

    let install = tokio::spawn({
        let page = page.clone();
        let observer = observer.clone();
        async move { observer.install(page.as_ref()).await }
    });
    let id = match next_wire(&mut client).await {
        WireMessage::PageRequest {
            id,
            request: PageRequest::InstallListeners,
        } => id,
        other => panic!("Wrong message received: {:?}", other),
    };
    send_wire(
        &mut client,
        &WireMessage::PageResponse {
            id,
            ok: true,
            value: serde_json::Value::Null,
            error: None,
        },
    )
    .await;
    install.await.unwrap().unwrap();

    send_wire(
        &mut client,
        &WireMessage::ObserverEvent {
            event: ObserverEvent::new(EventDetails::Location("https://a.test/".into()), 5),
        },
    )
    .await;

    for _ in 0..20 {
        if !observer.request().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let events = observer.request();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), "location");
}

#[tokio::test]
#[serial]
async fn test_interactive_toast_is_relayed_both_ways() {
    let (_page, channel, mut client) = setup(2000).await;
    let bridge = PauseBridge::spawn(channel, &BridgeConfig::default());

    let waiting = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.request("Approve?", ToastOptions::default()).await }
    });

    let request = match next_wire(&mut client).await {
        WireMessage::ShowInteractiveToastRequest(req) => req,
        other => panic!("Wrong message received: {:?}", other),
    };
    assert_eq!(request.message, "Approve?");
    send_wire(
        &mut client,
        &WireMessage::InteractiveToastResponse(ToastResponse {
            toast_id: request.toast_id,
            action: ToastAction::Continue,
        }),
    )
    .await;

    let answer = tokio::time::timeout(Duration::from_secs(2), waiting)
        .await
        .expect("Timeout waiting for toast answer")
        .unwrap();
    assert_eq!(answer, Ok("User chose to continue".to_string()));
}

#[tokio::test]
#[serial]
async fn test_closed_connection_fails_pending_request() {
    let (page, _channel, mut client) = setup(5000).await;

    let click = tokio::spawn({
        let page = page.clone();
        async move { page.click(&ElementRef("el-9".into())).await }
    });
    assert!(matches!(
        next_wire(&mut client).await,
        WireMessage::PageRequest { .. }
    ));
    client.close(None).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), click)
        .await
        .expect("Pending request was not failed")
        .unwrap();
    assert_eq!(result, Err(BackendError::ConnectionLost));
    assert_eq!(page.pending_count(), 0);
}

#[tokio::test]
#[serial]
async fn test_unanswered_request_times_out() {
    let (page, _channel, mut client) = setup(150).await;

    let resize = tokio::spawn({
        let page = page.clone();
        async move { page.resize(800, 600).await }
    });
    assert!(matches!(
        next_wire(&mut client).await,
        WireMessage::PageRequest {
            request: PageRequest::Resize {
                width: 800,
                height: 600
            },
            ..
        }
    ));

    assert!(matches!(
        resize.await.unwrap(),
        Err(BackendError::Timeout(_))
    ));
    assert_eq!(page.pending_count(), 0);
}

#[tokio::test]
#[serial]
async fn test_network_idle_outlives_request_timeout() {
    let (page, channel, mut client) = setup(150).await;
    let interpreter = Interpreter::new(
        page.clone(),
        ActivityObserver::new(ObserverConfig::default()),
        PauseBridge::spawn(channel, &BridgeConfig::default()),
        RecipeStore::in_memory(),
        Arc::new(MemoryLogSink::new()),
        InterpreterConfig::default(),
    );

    // The extension settles listener installs at once and reports idle late.
    let extension = tokio::spawn(async move {
        loop {
            match next_wire(&mut client).await {
                WireMessage::PageRequest {
                    id,
                    request: PageRequest::NetworkIdle { timeout_ms },
                } => {
                    assert_eq!(timeout_ms, 2000);
                    tokio::time::sleep(Duration::from_millis(400)).await;
                    send_wire(
                        &mut client,
                        &WireMessage::PageResponse {
                            id,
                            ok: true,
                            value: json!(true),
                            error: None,
                        },
                    )
                    .await;
                    return client;
                }
                WireMessage::PageRequest { id, .. } => {
                    send_wire(
                        &mut client,
                        &WireMessage::PageResponse {
                            id,
                            ok: true,
                            value: serde_json::Value::Null,
                            error: None,
                        },
                    )
                    .await;
                }
                _ => {}
            }
        }
    });

    let report = interpreter
        .run_script("waitfor network 2000")
        .await
        .unwrap();
    let _client = extension.await.unwrap();

    assert_eq!(report.output, RunOutput::Single(StepResult::ok("Network idle")));
    assert_eq!(page.pending_count(), 0);
}
