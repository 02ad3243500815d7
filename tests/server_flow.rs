//! End-to-end server tests over a loopback WebSocket

mod common;

use common::{EngineOp, MockEngineFactory};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use wsrtc_signaling::engine::EngineEvent;
use wsrtc_signaling::{IceCandidate, SignalingConfig, SignalingServer};

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn loopback_config() -> SignalingConfig {
    SignalingConfig {
        bind_addr: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    }
}

async fn next_json(ws: &mut ClientSocket) -> serde_json::Value {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed unexpectedly")
            .expect("websocket read failed");
        if let Message::Text(raw) = frame {
            return serde_json::from_str(&raw).expect("frame is not JSON");
        }
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn full_signaling_exchange() {
    let factory = MockEngineFactory::new();
    let server = SignalingServer::new(loopback_config(), factory.clone()).unwrap();
    let registry = server.registry();
    let handle = server.start().await.unwrap();

    let url = format!("ws://{}", handle.local_addr());
    let (mut ws, _) = connect_async(&url).await.unwrap();

    // The server speaks first: an offer with a fresh token
    let offer = next_json(&mut ws).await;
    assert_eq!(offer["message_type"], "offer");
    let token = offer["token"].as_str().unwrap().to_string();
    assert!(!token.is_empty());
    assert!(offer["offer"].as_str().unwrap().contains("mock-offer"));
    assert_eq!(registry.len().await, 1);

    let engine = factory.created().remove(0);

    // Answer back under the issued token
    let answer = serde_json::json!({
        "message_type": "answer",
        "token": token,
        "answer": { "type": "answer", "sdp": "v=0\r\nclient-answer\r\n" },
    });
    ws.send(Message::Text(answer.to_string())).await.unwrap();
    wait_until("remote answer to reach the engine", || {
        engine
            .ops()
            .contains(&EngineOp::SetRemote("v=0\r\nclient-answer\r\n".to_string()))
    })
    .await;

    // Trickle a candidate up
    let candidate = serde_json::json!({
        "message_type": "iceCandidate",
        "token": token,
        "sdp_mid": "0",
        "sdp_mline_index": 0,
        "sdp": "candidate:1 1 UDP 2122252543 10.0.0.1 50001 typ host",
    });
    ws.send(Message::Text(candidate.to_string())).await.unwrap();
    wait_until("candidate to reach the engine", || {
        engine
            .ops()
            .iter()
            .any(|op| matches!(op, EngineOp::AddCandidate(sdp) if sdp.contains("candidate:1")))
    })
    .await;

    // A locally discovered candidate flows down as a round-trippable blob
    engine
        .emit(EngineEvent::CandidateDiscovered(IceCandidate {
            sdp_mid: "0".to_string(),
            sdp_mline_index: 0,
            sdp: "candidate:5 1 UDP 1686052607 203.0.113.9 40000 typ srflx".to_string(),
        }))
        .await;
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["message_type"], "iceCandidate");
    assert_eq!(frame["token"], token.as_str());
    let parsed: IceCandidate =
        serde_json::from_str(frame["icecandidate"].as_str().unwrap()).unwrap();
    assert!(parsed.sdp.contains("candidate:5"));

    // Client hangup tears the session down
    ws.close(None).await.unwrap();
    wait_until("engine close", || engine.ops().contains(&EngineOp::Close)).await;
    assert_eq!(registry.len().await, 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn each_connection_gets_its_own_session() {
    let factory = MockEngineFactory::new();
    let server = SignalingServer::new(loopback_config(), factory.clone()).unwrap();
    let registry = server.registry();
    let handle = server.start().await.unwrap();
    let url = format!("ws://{}", handle.local_addr());

    let (mut ws_a, _) = connect_async(&url).await.unwrap();
    let (mut ws_b, _) = connect_async(&url).await.unwrap();

    let token_a = next_json(&mut ws_a).await["token"].as_str().unwrap().to_string();
    let token_b = next_json(&mut ws_b).await["token"].as_str().unwrap().to_string();

    assert_ne!(token_a, token_b);
    assert_eq!(registry.len().await, 2);
    assert_eq!(factory.created().len(), 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn engine_setup_failure_reports_error_and_closes() {
    let factory = MockEngineFactory::new();
    factory.fail_create.store(true, Ordering::SeqCst);
    let server = SignalingServer::new(loopback_config(), factory.clone()).unwrap();
    let registry = server.registry();
    let handle = server.start().await.unwrap();

    let url = format!("ws://{}", handle.local_addr());
    let (mut ws, _) = connect_async(&url).await.unwrap();

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["message_type"], "error");
    assert!(frame["error"].as_str().unwrap().contains("mock factory failure"));

    // The failed session does not linger in the registry
    let cleaned = timeout(Duration::from_secs(5), async {
        while !registry.is_empty().await {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(cleaned.is_ok());

    handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_live_connections() {
    let factory = MockEngineFactory::new();
    let server = SignalingServer::new(loopback_config(), factory.clone()).unwrap();
    let handle = server.start().await.unwrap();

    let url = format!("ws://{}", handle.local_addr());
    let (mut ws, _) = connect_async(&url).await.unwrap();
    let _offer = next_json(&mut ws).await;
    let engine = factory.created().remove(0);

    handle.shutdown().await;

    // The client observes the close and the engine is released
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(_)) => break,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    wait_until("engine close", || engine.ops().contains(&EngineOp::Close)).await;
}
