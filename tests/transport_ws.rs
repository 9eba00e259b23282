use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use prepwire::client::{EventBus, SessionTransport, WILDCARD};
use prepwire::core::{
    ClientEvent, ConnectionState, ConnectionStatus, MessageType, ServerEvent, TransportConfig,
};

fn tuning() -> TransportConfig {
    TransportConfig {
        reconnect_attempts: 3,
        reconnect_interval_ms: 50,
        heartbeat_interval_ms: 60_000,
    }
}

async fn wait_for(
    transport: &SessionTransport,
    what: &str,
    pred: impl Fn(&ConnectionState) -> bool,
) -> ConnectionState {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let state = transport.connection_state();
        if pred(&state) {
            return state;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}: {:?}", what, state);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn events_sent_while_disconnected_flush_in_fifo_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut received = Vec::new();
        while received.len() < 3 {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => received.push(text),
                Some(Ok(_)) => {}
                other => panic!("unexpected frame: {:?}", other),
            }
        }
        received
    });

    let transport = SessionTransport::new(format!("ws://{}", addr), tuning(), EventBus::new());
    for content in ["one", "two", "three"] {
        transport.send(ClientEvent::SendMessage {
            content: content.to_string(),
            message_type: MessageType::Text,
        });
    }
    transport.connect("fifo-session");

    let received = server.await.unwrap();
    let contents: Vec<String> = received
        .iter()
        .map(|text| {
            let value: serde_json::Value = serde_json::from_str(text).unwrap();
            assert_eq!(value["type"], "send_message");
            value["content"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(contents, ["one", "two", "three"]);

    transport.disconnect();
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_touching_the_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(WsMessage::Text("{not json".to_string())).await.unwrap();
        ws.send(WsMessage::Text(
            r#"{"type":"heartbeat","timestamp":"2026-01-01T00:00:00Z"}"#.to_string(),
        ))
        .await
        .unwrap();
        // Hold the connection open until the client goes away.
        while ws.next().await.is_some() {}
    });

    let bus = EventBus::new();
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = bus.on(WILDCARD, move |event| {
        let _ = event_tx.send(event.event_type().to_string());
    });

    let transport = SessionTransport::new(format!("ws://{}", addr), tuning(), bus);
    transport.connect("frames-session");

    // The only non-connection event delivered must be the valid heartbeat;
    // the garbage frame before it never reaches the bus.
    let mut seen = Vec::new();
    let heartbeat = loop {
        let event_type = tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
            .await
            .expect("timed out waiting for heartbeat")
            .expect("bus closed");
        if event_type == "connection_state_changed" {
            continue;
        }
        seen.push(event_type.clone());
        break event_type;
    };
    assert_eq!(heartbeat, "heartbeat");
    assert_eq!(seen, ["heartbeat"]);

    let state = transport.connection_state();
    assert_eq!(state.status, ConnectionStatus::Connected);
    assert!(state.error.is_none());

    transport.disconnect();
}

#[tokio::test]
async fn heartbeat_frames_go_out_on_the_configured_interval() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut heartbeats = Vec::new();
        while heartbeats.len() < 2 {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => heartbeats.push(text),
                Some(Ok(_)) => {}
                other => panic!("unexpected frame: {:?}", other),
            }
        }
        heartbeats
    });

    let transport = SessionTransport::new(
        format!("ws://{}", addr),
        TransportConfig {
            heartbeat_interval_ms: 50,
            ..tuning()
        },
        EventBus::new(),
    );
    transport.connect("heartbeat-session");

    let heartbeats = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("timed out waiting for heartbeats")
        .unwrap();
    for text in heartbeats {
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "heartbeat");
        assert!(value["timestamp"].is_string());
    }

    transport.disconnect();
}

#[tokio::test]
async fn normal_close_disconnects_without_reconnecting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "done".into(),
        }))
        .await
        .unwrap();
    });

    let bus = EventBus::new();
    let statuses = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let statuses_clone = std::sync::Arc::clone(&statuses);
    let _sub = bus.on("connection_state_changed", move |event| {
        if let ServerEvent::ConnectionStateChanged { state } = event {
            statuses_clone.lock().unwrap().push(state.status);
        }
    });

    let transport = SessionTransport::new(format!("ws://{}", addr), tuning(), bus);
    transport.connect("closing-session");

    // Every transition is broadcast, so the recorded sequence can't miss
    // the short-lived connected window.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let seen = statuses.lock().unwrap().clone();
        if seen.contains(&ConnectionStatus::Disconnected) {
            assert!(seen.contains(&ConnectionStatus::Connected));
            assert!(!seen.contains(&ConnectionStatus::Reconnecting));
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for clean disconnect: {:?}", seen);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Terminal: still disconnected, nothing rescheduled.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let state = transport.connection_state();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert_eq!(state.reconnect_attempts, 0);
}

#[tokio::test]
async fn dropped_connection_reconnects_and_recovers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        // First connection: accept the handshake, then drop the socket
        // with no close frame.
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        drop(ws);

        // Second connection: stay up.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let bus = EventBus::new();
    let reconnecting_seen = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let reconnecting_clone = std::sync::Arc::clone(&reconnecting_seen);
    let _sub = bus.on("connection_state_changed", move |event| {
        if let ServerEvent::ConnectionStateChanged { state } = event {
            if state.status == ConnectionStatus::Reconnecting {
                reconnecting_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }
    });

    let transport = SessionTransport::new(format!("ws://{}", addr), tuning(), bus);
    transport.connect("flaky-session");

    wait_for(&transport, "first connect", |s| {
        s.status == ConnectionStatus::Connected
    })
    .await;

    // Recovery resets the attempt counter.
    let state = wait_for(&transport, "reconnected", |s| {
        s.status == ConnectionStatus::Connected
            && reconnecting_seen.load(std::sync::atomic::Ordering::SeqCst)
    })
    .await;
    assert_eq!(state.reconnect_attempts, 0);
    assert!(state.error.is_none());

    transport.disconnect();
}

#[tokio::test]
async fn reconnect_cap_ends_in_terminal_error() {
    // Reserve an address nothing is listening on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let bus = EventBus::new();
    let attempts_seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let attempts_clone = std::sync::Arc::clone(&attempts_seen);
    let _sub = bus.on("connection_state_changed", move |event| {
        if let ServerEvent::ConnectionStateChanged { state } = event {
            if state.status == ConnectionStatus::Reconnecting {
                attempts_clone.lock().unwrap().push(state.reconnect_attempts);
            }
        }
    });

    let transport = SessionTransport::new(
        format!("ws://{}", addr),
        TransportConfig {
            reconnect_attempts: 3,
            reconnect_interval_ms: 10,
            heartbeat_interval_ms: 60_000,
        },
        bus,
    );
    transport.connect("doomed-session");

    let state = wait_for(&transport, "terminal error", |s| {
        s.status == ConnectionStatus::Error
            && s.error.as_deref() == Some("Failed to reconnect after maximum attempts")
    })
    .await;
    assert_eq!(state.reconnect_attempts, 3);
    assert_eq!(*attempts_seen.lock().unwrap(), vec![1, 2, 3]);

    // The cap is terminal: no further attempts are scheduled.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(attempts_seen.lock().unwrap().len(), 3);
    assert_eq!(
        transport.connection_state().status,
        ConnectionStatus::Error
    );
}
