//! Socket.IO client against an in-process relay stand-in

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use room_audio_streamer::{
    audio::EncodedChunk,
    config::SessionConfig,
    error::NetworkError,
    network::{
        sender::send_chunk,
        socketio::{Packet, PacketKind},
        AudioChunkHandler, EventEmitter, SocketClient,
    },
    session::SessionContext,
};

const OPEN: &str = r#"0{"sid":"engine-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text,
            Some(Ok(_)) => continue,
            other => panic!("expected a text frame, got {:?}", other),
        }
    }
}

/// Engine.IO message frame → Socket.IO packet
fn socket_packet(frame: &str) -> Packet {
    let payload = frame.strip_prefix('4').expect("engine.io message frame");
    Packet::decode(payload).unwrap()
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

#[tokio::test]
async fn test_join_stream_and_receive() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        ws.send(Message::text(OPEN)).await.unwrap();
        assert_eq!(next_text(&mut ws).await, "40");
        ws.send(Message::text(r#"40{"sid":"socket-sid"}"#)).await.unwrap();

        // join-room carries an ack id
        let join = socket_packet(&next_text(&mut ws).await);
        assert_eq!(join.kind, PacketKind::Event);
        let (name, arg) = join.event_parts().unwrap();
        assert_eq!(name, "join-room");
        assert_eq!(arg, &json!({"room": "lobby", "name": "tester"}));
        let id = join.id.expect("join-room should request an ack");
        ws.send(Message::text(format!(r#"43{}[{{"ok":true}}]"#, id)))
            .await
            .unwrap();

        // Fire-and-forget audio
        let audio = socket_packet(&next_text(&mut ws).await);
        assert_eq!(audio.id, None);
        let (name, arg) = audio.event_parts().unwrap();
        assert_eq!(name, "audio-chunk");
        assert_eq!(
            arg,
            &json!({"room": "lobby", "data": "AQACAA==", "sample_rate": 16000, "channels": 1})
        );

        // Heartbeat
        ws.send(Message::text("2")).await.unwrap();
        assert_eq!(next_text(&mut ws).await, "3");

        // Relay forwards a peer's chunk, then one with nothing in it
        ws.send(Message::text(
            r#"42["audio-chunk",{"sender":"peer-1","data":"AwAEAA=="}]"#,
        ))
        .await
        .unwrap();
        ws.send(Message::text(r#"42["audio-chunk",{"sender":"peer-1","data":""}]"#))
            .await
            .unwrap();

        // Client leaves the namespace on disconnect
        assert_eq!(next_text(&mut ws).await, "41");
    });

    let ctx = SessionContext::shared(SessionConfig {
        server_url: url.clone(),
        room: "lobby".into(),
        name: "tester".into(),
        ..SessionConfig::default()
    });
    let handler = AudioChunkHandler::new(ctx.clone());
    let client = SocketClient::builder(url)
        .on("audio-chunk", move |payload| {
            handler.handle(payload);
        })
        .build()
        .unwrap();

    client.connect().await.unwrap();
    assert!(client.is_connected());

    let (ack_tx, ack_rx) = tokio::sync::oneshot::channel::<Value>();
    client
        .emit_with_ack(
            "join-room",
            json!({"room": "lobby", "name": "tester"}),
            move |ack| {
                let _ = ack_tx.send(ack);
            },
        )
        .unwrap();
    let ack = tokio::time::timeout(Duration::from_secs(5), ack_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ack, json!([{"ok": true}]));

    let chunk = EncodedChunk {
        data: "AQACAA==".into(),
        samples: 2,
    };
    send_chunk(&ctx, &client, chunk).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while ctx.playback_queue().len() < 1 || ctx.stats().empty_payloads < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(ctx.playback_queue().try_pop().unwrap().samples, vec![3, 4]);
    assert!(ctx.playback_queue().is_empty());

    client.disconnect().await;
    assert!(!client.is_connected());
    server.await.unwrap();

    // Emitting after disconnect is a transient error, not a panic
    assert!(matches!(
        client.emit("audio-chunk", json!({})),
        Err(NetworkError::NotConnected)
    ));
}

#[tokio::test]
async fn test_connect_error_is_reported() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::text(OPEN)).await.unwrap();
        assert_eq!(next_text(&mut ws).await, "40");
        ws.send(Message::text(r#"44{"message":"room closed"}"#))
            .await
            .unwrap();
    });

    let client = SocketClient::builder(url).build().unwrap();
    match client.connect().await {
        Err(NetworkError::ConnectRefused(reason)) => assert_eq!(reason, "room closed"),
        other => panic!("expected a refused connect, got {:?}", other),
    }
    assert!(!client.is_connected());
    server.await.unwrap();
}

#[tokio::test]
async fn test_unreachable_server() {
    // Bind then drop to get a port with nothing listening
    let (listener, url) = bind().await;
    drop(listener);

    let client = SocketClient::builder(url).build().unwrap();
    assert!(client.connect().await.is_err());
    assert!(matches!(
        client.emit("audio-chunk", json!({})),
        Err(NetworkError::NotConnected)
    ));
}
