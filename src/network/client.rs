//! Socket.IO client over the Engine.IO WebSocket transport
//!
//! One tokio task owns the WebSocket: it answers heartbeats, dispatches
//! inbound events to registered handlers and writes outbound frames queued by
//! [`SocketClient::emit`]. Emitting never blocks, so it is safe to call from
//! plain OS threads.

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use url::Url;

use crate::error::NetworkError;
use crate::network::engineio::{EnginePacket, Handshake, PROTOCOL_VERSION};
use crate::network::socketio::{Packet, PacketKind, ROOT_NAMESPACE};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handler for an inbound event; receives the event's first argument
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handler for connect/disconnect notifications
pub type LifecycleHandler = Arc<dyn Fn() + Send + Sync>;

type AckHandler = Box<dyn FnOnce(Value) + Send + Sync>;

/// Frames waiting for the connection task
const OUTBOUND_BUFFER: usize = 256;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Fire-and-forget event emission
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: &str, payload: Value) -> Result<(), NetworkError>;
}

/// Build the Engine.IO WebSocket endpoint for a relay server URL
pub fn engine_url(server: &str) -> Result<Url, NetworkError> {
    let mut url =
        Url::parse(server).map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", server, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(NetworkError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                other, server
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| NetworkError::InvalidUrl(server.to_string()))?;
    url.set_path("/socket.io/");
    url.set_query(Some(&format!(
        "EIO={}&transport=websocket",
        PROTOCOL_VERSION
    )));
    Ok(url)
}

enum Outbound {
    Frame(String),
    Close,
}

enum FrameAction {
    Continue,
    Reply(String),
    Close,
}

/// Builder collecting handlers before the client exists
pub struct ClientBuilder {
    server: String,
    handlers: HashMap<String, EventHandler>,
    on_connect: Vec<LifecycleHandler>,
    on_disconnect: Vec<LifecycleHandler>,
}

impl ClientBuilder {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            handlers: HashMap::new(),
            on_connect: Vec::new(),
            on_disconnect: Vec::new(),
        }
    }

    /// Register the handler for an inbound event
    pub fn on<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.handlers.insert(event.into(), Arc::new(handler));
        self
    }

    pub fn on_connect<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_connect.push(Arc::new(handler));
        self
    }

    pub fn on_disconnect<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_disconnect.push(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<SocketClient, NetworkError> {
        let url = engine_url(&self.server)?;
        Ok(SocketClient {
            inner: Arc::new(ClientInner {
                url,
                namespace: ROOT_NAMESPACE.to_string(),
                handlers: self.handlers,
                on_connect: self.on_connect,
                on_disconnect: self.on_disconnect,
                outbound: Mutex::new(None),
                connected: AtomicBool::new(false),
                acks: DashMap::new(),
                next_ack_id: AtomicU64::new(0),
                task: Mutex::new(None),
            }),
        })
    }
}

/// Cloneable handle to one Socket.IO connection
#[derive(Clone)]
pub struct SocketClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    url: Url,
    namespace: String,
    handlers: HashMap<String, EventHandler>,
    on_connect: Vec<LifecycleHandler>,
    on_disconnect: Vec<LifecycleHandler>,
    /// Present only while connected
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
    connected: AtomicBool,
    acks: DashMap<u64, AckHandler>,
    next_ack_id: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SocketClient {
    pub fn builder(server: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(server)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Open the WebSocket, join the namespace and start the connection task
    pub async fn connect(&self) -> Result<(), NetworkError> {
        if self.is_connected() {
            return Ok(());
        }

        let inner = self.inner.clone();
        let (ws, handshake) = tokio::time::timeout(HANDSHAKE_TIMEOUT, inner.handshake())
            .await
            .map_err(|_| NetworkError::Timeout)??;

        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        *inner.outbound.lock() = Some(tx);
        inner.connected.store(true, Ordering::SeqCst);

        tracing::debug!(
            sid = %handshake.sid,
            ping_interval = handshake.ping_interval,
            ping_timeout = handshake.ping_timeout,
            "Engine.IO session opened"
        );
        for handler in &inner.on_connect {
            handler();
        }

        let handle = tokio::spawn(inner.clone().run(ws, rx, handshake));
        *inner.task.lock() = Some(handle);
        Ok(())
    }

    /// Emit an event and invoke `callback` with the server's acknowledgement.
    ///
    /// A server that never acknowledges simply leaves the callback pending
    /// until disconnect.
    pub fn emit_with_ack<F>(&self, event: &str, payload: Value, callback: F) -> Result<(), NetworkError>
    where
        F: FnOnce(Value) + Send + Sync + 'static,
    {
        let id = self.inner.next_ack_id.fetch_add(1, Ordering::Relaxed);
        self.inner.acks.insert(id, Box::new(callback));

        let packet = Packet::event(&self.inner.namespace, event, payload, Some(id));
        self.inner.send_packet(&packet).map_err(|e| {
            self.inner.acks.remove(&id);
            e
        })
    }

    /// Best-effort disconnect: leave the namespace, close the socket and wait
    /// briefly for the connection task.
    pub async fn disconnect(&self) {
        let tx = self.inner.outbound.lock().take();
        if let Some(tx) = tx {
            let leave = EnginePacket::Message(Packet::disconnect(&self.inner.namespace).encode());
            let _ = tx.try_send(Outbound::Frame(leave.encode()));
            let _ = tx.try_send(Outbound::Close);
        }

        let task = self.inner.task.lock().take();
        if let Some(mut task) = task {
            if tokio::time::timeout(DISCONNECT_TIMEOUT, &mut task).await.is_err() {
                tracing::debug!("Connection task did not stop in time, aborting");
                task.abort();
            }
        }

        self.inner.mark_disconnected();
    }
}

impl EventEmitter for SocketClient {
    fn emit(&self, event: &str, payload: Value) -> Result<(), NetworkError> {
        let packet = Packet::event(&self.inner.namespace, event, payload, None);
        self.inner.send_packet(&packet)
    }
}

impl ClientInner {
    async fn handshake(&self) -> Result<(WsStream, Handshake), NetworkError> {
        let (mut ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        let handshake = match next_engine_packet(&mut ws).await? {
            EnginePacket::Open(handshake) => handshake,
            other => {
                return Err(NetworkError::InvalidPacket(format!(
                    "expected engine.io open packet, got {:?}",
                    other
                )))
            }
        };

        let join = EnginePacket::Message(Packet::connect(&self.namespace).encode());
        ws.send(Message::text(join.encode())).await?;

        loop {
            match next_engine_packet(&mut ws).await? {
                EnginePacket::Ping(data) => {
                    ws.send(Message::text(EnginePacket::Pong(data).encode()))
                        .await?;
                }
                EnginePacket::Message(text) => {
                    let packet = Packet::decode(&text)?;
                    if packet.namespace != self.namespace {
                        continue;
                    }
                    match packet.kind {
                        PacketKind::Connect => return Ok((ws, handshake)),
                        PacketKind::ConnectError => {
                            let reason = packet
                                .data
                                .as_ref()
                                .and_then(|d| d.get("message"))
                                .and_then(Value::as_str)
                                .unwrap_or("no reason given")
                                .to_string();
                            return Err(NetworkError::ConnectRefused(reason));
                        }
                        _ => continue,
                    }
                }
                EnginePacket::Close => {
                    return Err(NetworkError::ConnectionFailed(
                        "server closed the session during handshake".into(),
                    ))
                }
                _ => {}
            }
        }
    }

    async fn run(self: Arc<Self>, ws: WsStream, mut rx: mpsc::Receiver<Outbound>, handshake: Handshake) {
        let (mut write, mut read) = ws.split();
        let deadline = handshake.heartbeat_deadline();
        let heartbeat = tokio::time::sleep(deadline);
        tokio::pin!(heartbeat);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat.as_mut().reset(tokio::time::Instant::now() + deadline);
                            match self.handle_frame(&text) {
                                FrameAction::Continue => {}
                                FrameAction::Reply(frame) => {
                                    if let Err(e) = write.send(Message::text(frame)).await {
                                        tracing::warn!("WebSocket write failed: {}", e);
                                        break;
                                    }
                                }
                                FrameAction::Close => {
                                    tracing::info!("Server closed the session");
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!("Server closed connection: {:?}", frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!("WebSocket read failed: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
                cmd = rx.recv() => {
                    match cmd {
                        Some(Outbound::Frame(frame)) => {
                            if let Err(e) = write.send(Message::text(frame)).await {
                                tracing::warn!("WebSocket write failed: {}", e);
                                break;
                            }
                        }
                        Some(Outbound::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
                _ = &mut heartbeat => {
                    tracing::warn!("No heartbeat from server within {:?}, dropping connection", deadline);
                    break;
                }
            }
        }

        let _ = write.close().await;
        self.mark_disconnected();
    }

    fn handle_frame(&self, frame: &str) -> FrameAction {
        let packet = match EnginePacket::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!("Ignoring malformed engine.io frame: {}", e);
                return FrameAction::Continue;
            }
        };

        match packet {
            EnginePacket::Ping(data) => FrameAction::Reply(EnginePacket::Pong(data).encode()),
            EnginePacket::Close => FrameAction::Close,
            EnginePacket::Message(payload) => self.handle_packet(&payload),
            EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {
                FrameAction::Continue
            }
        }
    }

    fn handle_packet(&self, payload: &str) -> FrameAction {
        let packet = match Packet::decode(payload) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!("Ignoring socket.io packet: {}", e);
                return FrameAction::Continue;
            }
        };
        if packet.namespace != self.namespace {
            return FrameAction::Continue;
        }

        match packet.kind {
            PacketKind::Event => {
                if let Some((name, arg)) = packet.event_parts() {
                    let handler = self.handlers.get(name);
                    match handler {
                        Some(handler) => handler(arg),
                        None => tracing::trace!(event = name, "No handler registered"),
                    }
                }
                match packet.id {
                    Some(id) => {
                        let ack = Packet::ack(&self.namespace, id, Vec::new());
                        FrameAction::Reply(EnginePacket::Message(ack.encode()).encode())
                    }
                    None => FrameAction::Continue,
                }
            }
            PacketKind::Ack => {
                if let Some(id) = packet.id {
                    match self.acks.remove(&id) {
                        Some((_, callback)) => callback(packet.data.unwrap_or(Value::Null)),
                        None => tracing::debug!(id, "Acknowledgement for unknown id"),
                    }
                }
                FrameAction::Continue
            }
            PacketKind::Disconnect => FrameAction::Close,
            PacketKind::Connect
            | PacketKind::ConnectError
            | PacketKind::BinaryEvent
            | PacketKind::BinaryAck => FrameAction::Continue,
        }
    }

    fn send_packet(&self, packet: &Packet) -> Result<(), NetworkError> {
        let frame = EnginePacket::Message(packet.encode()).encode();
        let guard = self.outbound.lock();
        let tx = guard.as_ref().ok_or(NetworkError::NotConnected)?;
        tx.try_send(Outbound::Frame(frame)).map_err(|e| match e {
            TrySendError::Full(_) => NetworkError::SendFailed("outbound buffer full".into()),
            TrySendError::Closed(_) => NetworkError::NotConnected,
        })
    }

    fn mark_disconnected(&self) {
        self.outbound.lock().take();
        self.acks.clear();
        if self.connected.swap(false, Ordering::SeqCst) {
            for handler in &self.on_disconnect {
                handler();
            }
        }
    }
}

async fn next_engine_packet(ws: &mut WsStream) -> Result<EnginePacket, NetworkError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return EnginePacket::decode(&text),
            Some(Ok(Message::Close(_))) | None => {
                return Err(NetworkError::ConnectionFailed(
                    "connection closed during handshake".into(),
                ))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn client() -> SocketClient {
        SocketClient::builder("http://localhost:3000").build().unwrap()
    }

    #[test]
    fn test_engine_url() {
        assert_eq!(
            engine_url("http://localhost:3000").unwrap().as_str(),
            "ws://localhost:3000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            engine_url("https://relay.example.com").unwrap().as_str(),
            "wss://relay.example.com/socket.io/?EIO=4&transport=websocket"
        );
        assert!(matches!(
            engine_url("ftp://example.com"),
            Err(NetworkError::InvalidUrl(_))
        ));
        assert!(engine_url("not a url").is_err());
    }

    #[test]
    fn test_emit_while_disconnected_fails_fast() {
        let client = client();
        assert!(!client.is_connected());
        assert!(matches!(
            client.emit("audio-chunk", json!({})),
            Err(NetworkError::NotConnected)
        ));
        assert!(client.emit_with_ack("join-room", json!({}), |_| {}).is_err());
        assert!(client.inner.acks.is_empty());
    }

    #[test]
    fn test_ping_is_answered_with_pong() {
        let client = client();
        match client.inner.handle_frame("2") {
            FrameAction::Reply(frame) => assert_eq!(frame, "3"),
            _ => panic!("expected pong"),
        }
    }

    #[test]
    fn test_event_dispatch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let client = SocketClient::builder("http://localhost:3000")
            .on("audio-chunk", move |payload| {
                assert_eq!(payload["data"], "AQA=");
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let action = client
            .inner
            .handle_frame(r#"42["audio-chunk",{"sender":"x","data":"AQA="}]"#);
        assert!(matches!(action, FrameAction::Continue));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Other namespaces and unknown events are ignored
        client.inner.handle_frame(r#"42/other,["audio-chunk",{"data":"AQA="}]"#);
        client.inner.handle_frame(r#"42["something-else",{}]"#);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_requesting_ack_gets_empty_ack() {
        let client = client();
        match client.inner.handle_frame(r#"425["server-ping"]"#) {
            FrameAction::Reply(frame) => assert_eq!(frame, "435[]"),
            _ => panic!("expected ack reply"),
        }
    }

    #[test]
    fn test_ack_invokes_pending_callback() {
        let client = client();
        let got = Arc::new(Mutex::new(None::<Value>));
        let slot = got.clone();
        client
            .inner
            .acks
            .insert(0, Box::new(move |value: Value| *slot.lock() = Some(value)));

        client.inner.handle_frame(r#"430[{"ok":true}]"#);
        assert_eq!(*got.lock(), Some(json!([{"ok": true}])));
        assert!(client.inner.acks.is_empty());
    }

    #[test]
    fn test_server_close_and_garbage() {
        let client = client();
        assert!(matches!(client.inner.handle_frame("1"), FrameAction::Close));
        assert!(matches!(client.inner.handle_frame("41"), FrameAction::Close));
        assert!(matches!(client.inner.handle_frame("x"), FrameAction::Continue));
        assert!(matches!(client.inner.handle_frame("4zzz"), FrameAction::Continue));
    }
}
