//! Shared helpers for the integration tests.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use wiregate_core::Config;
use wiregate_crypto::{KeyStore, MIN_RSA_KEY_BITS};
use wiregate_gateway::Gateway;

/// Client side of a test WebSocket.
pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a gateway with the built-in handlers on an ephemeral loopback port.
pub async fn spawn_gateway(config: Config) -> (Arc<Gateway>, SocketAddr) {
    let keys = Arc::new(KeyStore::initialize(MIN_RSA_KEY_BITS).unwrap());
    let gateway = Arc::new(Gateway::with_builtin_handlers(config, keys, "app").unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::clone(&gateway);
    tokio::spawn(async move { server.serve(listener).await });

    (gateway, addr)
}

/// Open a WebSocket to the gateway's socket path with an optional query.
pub async fn connect(addr: SocketAddr, query: &str) -> Client {
    let url = format!("ws://{}/socket{}", addr, query);
    let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    client
}

/// Send a JSON frame.
pub async fn send(client: &mut Client, frame: Value) {
    client.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Next text frame as raw text, failing after five seconds.
pub async fn next_text(client: &mut Client) -> String {
    let deadline = Duration::from_secs(5);
    loop {
        let msg = tokio::time::timeout(deadline, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return text;
        }
    }
}

/// Next text frame parsed as JSON.
pub async fn next_json(client: &mut Client) -> Value {
    serde_json::from_str(&next_text(client).await).unwrap()
}
