use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::*;

type EventSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect_events(node: &Node) -> Result<EventSocket> {
    let (ws, _) = connect_async(format!("ws://{}/api/events", node.addr)).await?;
    Ok(ws)
}

/// Next text frame, parsed. Control frames are skipped.
async fn next_event(ws: &mut EventSocket) -> Result<Value> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .context("no event within 5s")?
            .context("event channel closed")??;
        if msg.is_text() {
            return Ok(serde_json::from_str(msg.to_text()?)?);
        }
    }
}

fn device_ids(list: &Value) -> Vec<&str> {
    list.as_array()
        .map(|peers| peers.iter().filter_map(|p| p["device_id"].as_str()).collect())
        .unwrap_or_default()
}

/// Attach, deltas, explicit resync and loss, all over a real socket.
#[tokio::test]
async fn test_event_channel_presence_flow() -> Result<()> {
    let alice = Node::spawn("alice").await?;
    let bob = Node::spawn("bob").await?;
    let carol = Node::spawn("carol").await?;
    alice.introduce(&bob);

    let mut ws = connect_events(&alice).await?;

    let hello = next_event(&mut ws).await?;
    assert_eq!(hello["event"], "connected");
    assert_eq!(hello["data"]["device_id"], "alice-id");

    let list = next_event(&mut ws).await?;
    assert_eq!(list["event"], "devices_list");
    assert_eq!(device_ids(&list["data"]), vec!["bob-id"]);

    alice.introduce(&carol);
    let discovered = next_event(&mut ws).await?;
    assert_eq!(discovered["event"], "device_discovered");
    assert_eq!(discovered["data"]["device_id"], "carol-id");
    assert_eq!(discovered["data"]["port"], carol.addr.port());

    // Unknown text is ignored; the request that follows still gets answered.
    ws.send(Message::text("hello there")).await?;
    ws.send(Message::text(r#"{"event":"request_devices"}"#)).await?;
    let fresh = next_event(&mut ws).await?;
    assert_eq!(fresh["event"], "devices_list");
    assert_eq!(device_ids(&fresh["data"]), vec!["bob-id", "carol-id"]);

    alice.state.presence.remove(carol.id());
    let lost = next_event(&mut ws).await?;
    assert_eq!(lost["event"], "device_lost");
    assert_eq!(lost["data"]["device_id"], "carol-id");

    ws.close(None).await?;
    Ok(())
}

/// Sends started on a node show up as transfer_progress on its channel.
#[tokio::test]
async fn test_event_channel_carries_transfer_progress() -> Result<()> {
    let alice = Node::spawn("alice").await?;
    let bob = Node::spawn("bob").await?;
    alice.introduce(&bob);

    let mut ws = connect_events(&alice).await?;
    assert_eq!(next_event(&mut ws).await?["event"], "connected");
    assert_eq!(next_event(&mut ws).await?["event"], "devices_list");

    let src = tempfile::tempdir()?;
    let path = src.path().join("note.txt");
    std::fs::write(&path, b"see you at noon")?;
    let resp = reqwest::Client::new()
        .post(alice.url("/send"))
        .json(&serde_json::json!({ "device_id": bob.id(), "path": path }))
        .send()
        .await?;
    assert_eq!(resp.status(), 202);

    let mut states = Vec::new();
    let last = loop {
        let event = next_event(&mut ws).await?;
        assert_eq!(event["event"], "transfer_progress", "{event}");
        let state = event["data"]["state"].as_str().unwrap_or_default().to_string();
        states.push(state.clone());
        if state == "completed" || state == "failed" {
            break event;
        }
    };

    assert_eq!(states.first().map(String::as_str), Some("pending"));
    assert_eq!(last["data"]["state"], "completed", "{last}");
    assert_eq!(last["data"]["remote_filename"], "note.txt");
    assert_eq!(last["data"]["progress"], 1.0);
    Ok(())
}
