//! Streaming connection against a local WebSocket server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use depth_aggregator::error::ConnectionError;
use depth_aggregator::stream::{ConnectionEvent, ConnectionState, StreamConfig, StreamingConnection};
use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

fn fast_config(max_reconnect_attempts: u32) -> StreamConfig {
    StreamConfig {
        max_reconnect_attempts,
        reconnect_interval: Duration::from_millis(20),
        connection_timeout: Duration::from_secs(2),
        auto_reconnect: true,
    }
}

async fn next_event(events: &mut UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event within deadline")
        .expect("event channel open")
}

/// Echo server accepting any number of clients. Returns its URI and accept count.
async fn echo_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let uri = format!("ws://{}", listener.local_addr().unwrap());
    let accepts = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepts);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_text() && ws.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (uri, accepts)
}

/// URI of a port with nothing listening.
fn refused_uri() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("ws://127.0.0.1:{port}")
}

#[tokio::test]
async fn echo_round_trip_and_graceful_close() {
    let (uri, _) = echo_server().await;
    let (mut connection, mut events) = StreamingConnection::new(fast_config(3));

    connection.connect(&uri).unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert!(connection.is_connected());

    assert!(connection.send("hello"));
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Message("hello".to_string())
    );

    connection.close().await;

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(!connection.send("dropped"));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn peer_close_triggers_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let uri = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        // First client: close right after the handshake.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        };
        let _ = ws.send(Message::Close(Some(frame))).await;
        drop(ws);

        // Second client: stay open.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (mut connection, mut events) = StreamingConnection::new(fast_config(3));
    connection.connect(&uri).unwrap();

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Error(ConnectionError::ClosedByPeer {
            code: Some(1000),
            reason: "bye".to_string(),
        })
    );
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Reconnecting {
            attempt: 1,
            max_attempts: 3,
        }
    );
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    assert!(connection.is_connected());
    assert_eq!(connection.reconnect_attempts(), 0);

    connection.stop().await;
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn unreachable_endpoint_exhausts_attempts() {
    let (mut connection, mut events) = StreamingConnection::new(fast_config(3));
    connection.connect(&refused_uri()).unwrap();

    let mut errors = Vec::new();
    let mut reconnecting = Vec::new();
    let exhausted = loop {
        match next_event(&mut events).await {
            ConnectionEvent::Error(err) => errors.push(err),
            ConnectionEvent::Reconnecting { attempt, .. } => reconnecting.push(attempt),
            ConnectionEvent::ReconnectExhausted { attempts } => break attempts,
            other => panic!("unexpected event: {:?}", other),
        }
    };

    assert_eq!(exhausted, 3);
    assert_eq!(reconnecting, vec![1, 2, 3]);
    // One failure per handshake, then the terminal error.
    assert_eq!(errors.len(), 5);
    assert_eq!(
        errors.last(),
        Some(&ConnectionError::ReconnectExhausted { attempts: 3 })
    );
    assert!(errors[..4]
        .iter()
        .all(|err| matches!(err, ConnectionError::Handshake(_) | ConnectionError::Timeout(_))));
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);

    connection.stop().await;
    assert_eq!(connection.state(), ConnectionState::Disconnected);

    drop(connection);
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn second_connect_while_active_is_ignored() {
    let (uri, accepts) = echo_server().await;
    let (mut connection, mut events) = StreamingConnection::new(fast_config(3));

    connection.connect(&uri).unwrap();
    connection.connect(&uri).unwrap();

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(accepts.load(Ordering::SeqCst), 1);
    assert!(events.try_recv().is_err());

    connection.close().await;
}

#[tokio::test]
async fn stop_interrupts_reconnect_wait() {
    let config = StreamConfig {
        reconnect_interval: Duration::from_secs(3600),
        ..fast_config(5)
    };
    let (mut connection, mut events) = StreamingConnection::new(config);
    connection.connect(&refused_uri()).unwrap();

    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Error(_)));
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Reconnecting { attempt: 1, .. }
    ));
    assert_eq!(connection.state(), ConnectionState::Reconnecting);

    tokio::time::timeout(Duration::from_secs(1), connection.stop())
        .await
        .expect("stop returned promptly");

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn invalid_uri_is_rejected_up_front() {
    let (mut connection, _events) = StreamingConnection::new(StreamConfig::default());

    let err = connection.connect("https://example.com/feed").unwrap_err();

    assert!(matches!(err, ConnectionError::InvalidUri { .. }));
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}
