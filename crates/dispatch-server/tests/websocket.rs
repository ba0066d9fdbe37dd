// crates/dispatch-server/tests/websocket.rs
//
// Drives a real listener over WebSocket with a scripted generator.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispatch_core::error::Result;
use dispatch_core::{Generator, VideoJob};
use dispatch_server::config::{BackendConfig, Config};
use dispatch_server::server;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct ScriptedGenerator;

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate_caption(&self, title: &str, _description: &str) -> Result<String> {
        Ok(format!("caption of {}", title))
    }

    async fn generate_thumbnail(&self, title: &str, _description: &str) -> Result<String> {
        Ok(format!("thumb://{}", title))
    }

    async fn search_video(
        &self,
        query: &str,
        search_count: u32,
        _attempt_count: u32,
    ) -> Result<Option<Value>> {
        let delay = 3u64.saturating_sub(search_count as u64) * 20;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(Some(json!({ "title": query })))
    }

    async fn generate_video(&self, job: &VideoJob) -> Result<String> {
        Ok(format!("video://{}", job.video_id))
    }
}

async fn start_server(max_clients: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = Config {
        bind_addr: addr.ip().to_string(),
        port: addr.port(),
        max_clients,
        endpoint_urls: vec!["http://endpoint-1".into(), "http://endpoint-2".into()],
        acquire_timeout: Duration::from_secs(1),
        max_message_bytes: 1 << 20,
        backend: BackendConfig::default(),
    };
    tokio::spawn(server::serve(listener, config, Arc::new(ScriptedGenerator)));
    format!("ws://{}/ws", addr)
}

async fn connect(url: &str) -> Ws {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut Ws, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn recv(ws: &mut Ws) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn heartbeat_round_trip() {
    let url = start_server(8).await;
    let mut ws = connect(&url).await;

    send(&mut ws, json!({"action": "heartbeat", "requestId": "hb-1"})).await;
    assert_eq!(
        recv(&mut ws).await,
        json!({"action": "heartbeat", "requestId": "hb-1", "success": true})
    );
}

#[tokio::test]
async fn searches_come_back_in_submission_order() {
    let url = start_server(8).await;
    let mut ws = connect(&url).await;

    for n in 0..4 {
        send(
            &mut ws,
            json!({"action": "search", "requestId": n, "query": format!("q{}", n), "searchCount": n}),
        )
        .await;
    }
    for n in 0..4 {
        let frame = recv(&mut ws).await;
        assert_eq!(frame["action"], "search");
        assert_eq!(frame["requestId"], n);
        assert_eq!(frame["result"]["title"], format!("q{}", n));
    }
}

#[tokio::test]
async fn chat_posts_reach_other_members() {
    let url = start_server(8).await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;

    for ws in [&mut a, &mut b] {
        send(ws, json!({"action": "join_chat", "requestId": "j", "videoId": "room"})).await;
        let joined = recv(ws).await;
        assert_eq!(joined["success"], true);
        assert_eq!(joined["messages"], json!([]));
    }

    send(
        &mut a,
        json!({"action": "chat_message", "requestId": "p", "videoId": "room", "content": "hello"}),
    )
    .await;

    let own = recv(&mut a).await;
    assert_eq!(own["requestId"], "p");
    assert_eq!(own["message"]["username"], "Anonymous");

    let broadcast = recv(&mut b).await;
    assert_eq!(broadcast["action"], "chat_message");
    assert_eq!(broadcast["broadcast"], true);
    assert_eq!(broadcast["videoId"], "room");
    assert_eq!(broadcast["content"], "hello");
}

#[tokio::test]
async fn bad_frames_get_errors_and_the_connection_survives() {
    let url = start_server(8).await;
    let mut ws = connect(&url).await;

    ws.send(Message::Text("{not json".into())).await.unwrap();
    let frame = recv(&mut ws).await;
    assert_eq!(frame["action"], "unknown");
    assert_eq!(frame["success"], false);
    assert!(frame["error"]
        .as_str()
        .unwrap()
        .starts_with("Error processing message: "));

    ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    let frame = recv(&mut ws).await;
    assert_eq!(
        frame["error"],
        "Error processing message: binary frames are not supported"
    );

    send(&mut ws, json!({"action": "fly", "requestId": 9})).await;
    let frame = recv(&mut ws).await;
    assert_eq!(
        frame,
        json!({"action": "fly", "requestId": 9, "success": false, "error": "Unknown action: fly"})
    );

    send(
        &mut ws,
        json!({"action": "generate_caption", "requestId": "c", "params": {"title": "t", "description": "d"}}),
    )
    .await;
    assert_eq!(recv(&mut ws).await["caption"], "caption of t");
}

#[tokio::test]
async fn generate_video_returns_the_clip() {
    let url = start_server(8).await;
    let mut ws = connect(&url).await;

    send(
        &mut ws,
        json!({
            "action": "generate_video",
            "requestId": "v",
            "title": "park",
            "description": "squirrels",
            "video_prompt_prefix": "webcam",
            "options": {"video_id": "clip-1"},
        }),
    )
    .await;

    let frame = recv(&mut ws).await;
    assert_eq!(frame["success"], true);
    assert_eq!(frame["video"], "video://clip-1");
}

#[tokio::test]
async fn connections_beyond_max_clients_are_refused() {
    let url = start_server(1).await;
    let mut first = connect(&url).await;

    assert!(connect_async(&url).await.is_err());

    // The first connection is unaffected.
    send(&mut first, json!({"action": "heartbeat", "requestId": 1})).await;
    assert_eq!(recv(&mut first).await["success"], true);
}
