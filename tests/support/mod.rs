// One-time arena server bootstrap shared by integration tests.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Base URL published once the background server has bound its port.
static SERVER_URL: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();

// Start the server on first use and return its base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // The server gets its own thread and runtime so it outlives each `#[tokio::test]`.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("http://{}", addr));
                arena_server::run(listener).await.expect("server failed");
            });
        });
        wait_until_accepting(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

fn wait_until_accepting(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };
    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("server did not become ready in time");
}

pub async fn connect() -> Socket {
    let base_url = ensure_server();
    let ws_url = format!("{}/ws", base_url.replacen("http://", "ws://", 1));
    let (socket, _) = connect_async(ws_url).await.expect("websocket connect");
    socket
}

pub async fn send_json(socket: &mut Socket, value: Value) {
    socket
        .send(Message::text(value.to_string()))
        .await
        .expect("send message");
}

// Next JSON text frame, skipping control frames.
pub async fn recv_json(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("message in time")
            .expect("socket open")
            .expect("frame");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("json message");
        }
    }
}

// Reads until a message of the given type arrives.
pub async fn recv_type(socket: &mut Socket, message_type: &str) -> Value {
    for _ in 0..200 {
        let msg = recv_json(socket).await;
        if msg["type"] == message_type {
            return msg;
        }
    }
    panic!("no {message_type} message received");
}

// Reads until the server's close frame arrives and returns its code.
pub async fn recv_close_code(socket: &mut Socket) -> u16 {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("close in time")
            .expect("socket open")
            .expect("frame");
        if let Message::Close(close) = frame {
            return close.map(|c| u16::from(c.code)).expect("close frame with code");
        }
    }
}
