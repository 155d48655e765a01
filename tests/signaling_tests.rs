//! End-to-end signaling and relay flows over real WebSocket connections.
//!
//! Each test mounts the router on an ephemeral port with a fast progress
//! cadence and drives it with tokio-tungstenite clients speaking the same
//! frames the browser UI sends.

use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use dropline::protocol::{ClientMessage, FileTransfer, ServerMessage};
use dropline::relay::ProgressSettings;
use dropline::routes::build_router;
use dropline::websocket::SignalingState;

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn start_server() -> String {
    let state = SignalingState::new(ProgressSettings {
        step: 10,
        tick: Duration::from_millis(5),
    });
    let app = build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("ws://{addr}/ws")
}

async fn connect(url: &str) -> WsClient {
    let (ws, _) = connect_async(url).await.expect("connect");
    ws
}

async fn send(ws: &mut WsClient, message: &ClientMessage) {
    let text = serde_json::to_string(message).expect("serialize");
    ws.send(Message::Text(text.into())).await.expect("send");
}

async fn recv(ws: &mut WsClient) -> ServerMessage {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("parse server message");
        }
    }
}

async fn register(ws: &mut WsClient, user_id: &str) {
    send(
        ws,
        &ClientMessage::Register {
            user_id: user_id.into(),
        },
    )
    .await;
    // Registration is fire-and-forget; give the server a beat to bind it
    // before another channel references the identifier.
    sleep(Duration::from_millis(50)).await;
}

fn connection_request(sender_id: &str, receiver_id: &str) -> ClientMessage {
    ClientMessage::ConnectionRequest {
        sender_id: sender_id.into(),
        receiver_id: receiver_id.into(),
        timestamp: Utc::now(),
    }
}

fn transfer(sender_id: &str, receiver_id: &str) -> FileTransfer {
    FileTransfer {
        sender_id: sender_id.into(),
        receiver_id: receiver_id.into(),
        file_name: "doc.pdf".into(),
        file_type: "application/pdf".into(),
        file_size: 1024,
        file_data: "aGVsbG8gd29ybGQ=".into(),
        file_index: 0,
        total_files: 1,
    }
}

#[tokio::test]
async fn end_to_end_transfer() {
    let url = start_server().await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    register(&mut alice, "user-AAA111").await;
    register(&mut bob, "user-BBB222").await;

    // Alice asks for a connection; Bob receives the forwarded request.
    send(&mut alice, &connection_request("user-AAA111", "user-BBB222")).await;
    let request_id = match recv(&mut bob).await {
        ServerMessage::ConnectionRequest {
            request_id,
            sender_id,
            receiver_id,
            ..
        } => {
            assert_eq!(sender_id, "user-AAA111");
            assert_eq!(receiver_id, "user-BBB222");
            request_id
        }
        other => panic!("unexpected message: {other:?}"),
    };

    // Bob approves; Alice learns who accepted.
    send(
        &mut bob,
        &ClientMessage::ConnectionResponse {
            request_id,
            sender_id: "user-AAA111".into(),
            receiver_id: "user-BBB222".into(),
            accepted: true,
        },
    )
    .await;
    match recv(&mut alice).await {
        ServerMessage::ConnectionAccepted { receiver_id } => {
            assert_eq!(receiver_id, "user-BBB222");
        }
        other => panic!("unexpected message: {other:?}"),
    }

    // Alice sends the file; both sides see a monotonic progress sequence
    // and Bob additionally receives the full descriptor at 100.
    send(
        &mut alice,
        &ClientMessage::File(transfer("user-AAA111", "user-BBB222")),
    )
    .await;

    let mut bob_progress = Vec::new();
    let delivered = loop {
        match recv(&mut bob).await {
            ServerMessage::FileProgress {
                file_index,
                progress,
                sender_id,
            } => {
                assert_eq!(file_index, 0);
                assert_eq!(sender_id.as_deref(), Some("user-AAA111"));
                bob_progress.push(progress);
            }
            ServerMessage::File { transfer, progress } => {
                assert_eq!(progress, 100);
                break transfer;
            }
            other => panic!("unexpected message: {other:?}"),
        }
    };
    assert_eq!(delivered, transfer("user-AAA111", "user-BBB222"));
    assert!(bob_progress.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(*bob_progress.first().expect("at least one tick") > 0);
    assert_eq!(bob_progress.iter().filter(|p| **p == 100).count(), 1);

    let mut alice_progress = Vec::new();
    while alice_progress.last() != Some(&100u8) {
        match recv(&mut alice).await {
            ServerMessage::FileProgress {
                progress,
                sender_id,
                ..
            } => {
                assert!(sender_id.is_none(), "sender copy must omit senderId");
                alice_progress.push(progress);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
    assert_eq!(bob_progress, alice_progress);
}

#[tokio::test]
async fn request_to_unregistered_receiver_is_rejected() {
    let url = start_server().await;
    let mut alice = connect(&url).await;
    register(&mut alice, "user-AAA111").await;

    send(&mut alice, &connection_request("user-AAA111", "user-ZZZ999")).await;

    match recv(&mut alice).await {
        ServerMessage::ConnectionRejected { reason } => {
            assert_eq!(reason, "Receiver not available");
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_response_produces_no_second_verdict() {
    let url = start_server().await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    register(&mut alice, "user-AAA111").await;
    register(&mut bob, "user-BBB222").await;

    send(&mut alice, &connection_request("user-AAA111", "user-BBB222")).await;
    let request_id = match recv(&mut bob).await {
        ServerMessage::ConnectionRequest { request_id, .. } => request_id,
        other => panic!("unexpected message: {other:?}"),
    };

    let response = ClientMessage::ConnectionResponse {
        request_id,
        sender_id: "user-AAA111".into(),
        receiver_id: "user-BBB222".into(),
        accepted: true,
    };
    send(&mut bob, &response).await;
    send(&mut bob, &response).await;

    assert!(matches!(
        recv(&mut alice).await,
        ServerMessage::ConnectionAccepted { .. }
    ));

    // Force a known next message: if the duplicate had produced a second
    // verdict, it would arrive before this rejection.
    send(&mut alice, &connection_request("user-AAA111", "user-ZZZ999")).await;
    assert!(matches!(
        recv(&mut alice).await,
        ServerMessage::ConnectionRejected { .. }
    ));
}

#[tokio::test]
async fn response_after_sender_disconnect_is_absorbed() {
    let url = start_server().await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    register(&mut alice, "user-AAA111").await;
    register(&mut bob, "user-BBB222").await;

    send(&mut alice, &connection_request("user-AAA111", "user-BBB222")).await;
    let request_id = match recv(&mut bob).await {
        ServerMessage::ConnectionRequest { request_id, .. } => request_id,
        other => panic!("unexpected message: {other:?}"),
    };

    // The sender goes away while the request is still pending.
    alice.close(None).await.expect("close");
    sleep(Duration::from_millis(50)).await;

    // Bob's late answer resolves the request but the verdict has nowhere
    // to go; the server must carry on untroubled.
    send(
        &mut bob,
        &ClientMessage::ConnectionResponse {
            request_id,
            sender_id: "user-AAA111".into(),
            receiver_id: "user-BBB222".into(),
            accepted: true,
        },
    )
    .await;

    // A second answer for the same token is stale on top of that.
    send(
        &mut bob,
        &ClientMessage::ConnectionResponse {
            request_id,
            sender_id: "user-AAA111".into(),
            receiver_id: "user-BBB222".into(),
            accepted: false,
        },
    )
    .await;

    // Server is still healthy: Bob can run a full request cycle.
    send(&mut bob, &connection_request("user-BBB222", "user-ZZZ999")).await;
    assert!(matches!(
        recv(&mut bob).await,
        ServerMessage::ConnectionRejected { .. }
    ));
}

#[tokio::test]
async fn stale_response_with_unknown_token_is_ignored() {
    let url = start_server().await;
    let mut bob = connect(&url).await;
    register(&mut bob, "user-BBB222").await;

    send(
        &mut bob,
        &ClientMessage::ConnectionResponse {
            request_id: Uuid::new_v4(),
            sender_id: "user-AAA111".into(),
            receiver_id: "user-BBB222".into(),
            accepted: true,
        },
    )
    .await;

    // Liveness probe: the channel still works.
    send(&mut bob, &connection_request("user-BBB222", "user-ZZZ999")).await;
    assert!(matches!(
        recv(&mut bob).await,
        ServerMessage::ConnectionRejected { .. }
    ));
}

#[tokio::test]
async fn rebinding_moves_delivery_to_the_newest_channel() {
    let url = start_server().await;
    let mut first = connect(&url).await;
    let mut second = connect(&url).await;
    let mut carol = connect(&url).await;

    register(&mut first, "user-BBB222").await;
    register(&mut second, "user-BBB222").await;
    register(&mut carol, "user-CCC333").await;

    // Last writer wins: the request lands on the second channel.
    send(&mut carol, &connection_request("user-CCC333", "user-BBB222")).await;
    assert!(matches!(
        recv(&mut second).await,
        ServerMessage::ConnectionRequest { .. }
    ));

    // The displaced channel closing must not evict the fresh binding.
    first.close(None).await.expect("close");
    sleep(Duration::from_millis(50)).await;

    send(&mut carol, &connection_request("user-CCC333", "user-BBB222")).await;
    assert!(matches!(
        recv(&mut second).await,
        ServerMessage::ConnectionRequest { .. }
    ));
}

#[tokio::test]
async fn malformed_frames_leave_the_channel_open() {
    let url = start_server().await;
    let mut alice = connect(&url).await;
    register(&mut alice, "user-AAA111").await;

    alice
        .send(Message::Text("this is not json".into()))
        .await
        .expect("send garbage");
    alice
        .send(Message::Text(r#"{"type":"mystery"}"#.into()))
        .await
        .expect("send unknown type");

    // The same channel still serves real traffic afterwards.
    send(&mut alice, &connection_request("user-AAA111", "user-ZZZ999")).await;
    assert!(matches!(
        recv(&mut alice).await,
        ServerMessage::ConnectionRejected { .. }
    ));
}

#[tokio::test]
async fn concurrent_transfers_run_independent_sequences() {
    let url = start_server().await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    register(&mut alice, "user-AAA111").await;
    register(&mut bob, "user-BBB222").await;

    let mut first = transfer("user-AAA111", "user-BBB222");
    first.file_index = 0;
    first.total_files = 2;
    let mut second = first.clone();
    second.file_index = 1;
    second.file_name = "notes.txt".into();

    send(&mut alice, &ClientMessage::File(first)).await;
    send(&mut alice, &ClientMessage::File(second)).await;

    // Progress must be monotonic per transfer; interleaving across the two
    // sequences carries no ordering guarantee.
    let mut last_progress = [0u8; 2];
    let mut descriptors = 0;
    while descriptors < 2 {
        match recv(&mut bob).await {
            ServerMessage::FileProgress {
                file_index,
                progress,
                ..
            } => {
                let slot = &mut last_progress[file_index as usize];
                assert!(progress >= *slot, "progress regressed for {file_index}");
                *slot = progress;
            }
            ServerMessage::File { transfer, progress } => {
                assert_eq!(progress, 100);
                assert_eq!(last_progress[transfer.file_index as usize], 100);
                descriptors += 1;
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
