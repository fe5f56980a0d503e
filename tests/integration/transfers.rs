use serde_json::json;

use crate::*;

async fn send(from: &Node, device_id: &str, path: &std::path::Path) -> Result<reqwest::Response> {
    Ok(reqwest::Client::new()
        .post(from.url("/send"))
        .json(&json!({ "device_id": device_id, "path": path }))
        .send()
        .await?)
}

/// Node A pushes a file to node B; B's catalog holds an identical copy.
#[tokio::test]
async fn test_send_between_nodes() -> Result<()> {
    let alice = Node::spawn("alice").await?;
    let bob = Node::spawn("bob").await?;
    alice.introduce(&bob);

    let src = tempfile::tempdir()?;
    let path = src.path().join("holiday.jpg");
    let body: Vec<u8> = (0..1_500_000u32).map(|i| (i * 7 % 256) as u8).collect();
    std::fs::write(&path, &body)?;

    let resp = send(&alice, bob.id(), &path).await?;
    assert_eq!(resp.status(), 202);
    let started: serde_json::Value = resp.json().await?;
    assert_eq!(started["state"], "pending");
    assert_eq!(started["total_bytes"], body.len() as u64);

    let id = started["id"].as_str().context("transfer id")?.to_string();
    let done = wait_for_transfer(&alice, &id).await?;
    assert_eq!(done["state"], "completed", "{done}");
    assert_eq!(done["progress"], 1.0);
    assert_eq!(done["bytes_sent"], body.len() as u64);
    assert_eq!(done["remote_filename"], "holiday.jpg");

    assert_eq!(bob.received_names(), vec!["holiday.jpg"]);
    let copy = reqwest::get(bob.url("/download/holiday.jpg")).await?.bytes().await?;
    assert_eq!(copy.as_ref(), body.as_slice());

    let listed = get_json(&alice.url("/transfers")).await?;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    Ok(())
}

/// Sending the same name twice keeps both copies on the receiver.
#[tokio::test]
async fn test_repeat_send_is_renamed_on_receiver() -> Result<()> {
    let alice = Node::spawn("alice").await?;
    let bob = Node::spawn("bob").await?;
    alice.introduce(&bob);

    let src = tempfile::tempdir()?;
    let path = src.path().join("report.pdf");
    std::fs::write(&path, b"quarterly numbers")?;

    let mut remote = Vec::new();
    for _ in 0..2 {
        let started: serde_json::Value = send(&alice, bob.id(), &path).await?.json().await?;
        let done = wait_for_transfer(&alice, started["id"].as_str().unwrap_or_default()).await?;
        assert_eq!(done["state"], "completed");
        remote.push(done["remote_filename"].as_str().unwrap_or_default().to_string());
    }

    assert_eq!(remote, vec!["report.pdf", "report_1.pdf"]);
    assert_eq!(bob.received_names(), vec!["report.pdf", "report_1.pdf"]);
    Ok(())
}

#[tokio::test]
async fn test_zero_byte_send_completes_at_full_progress() -> Result<()> {
    let alice = Node::spawn("alice").await?;
    let bob = Node::spawn("bob").await?;
    alice.introduce(&bob);

    let src = tempfile::tempdir()?;
    let path = src.path().join("empty.log");
    std::fs::write(&path, b"")?;

    let started: serde_json::Value = send(&alice, bob.id(), &path).await?.json().await?;
    assert_eq!(started["progress"], 1.0);

    let done = wait_for_transfer(&alice, started["id"].as_str().unwrap_or_default()).await?;
    assert_eq!(done["state"], "completed");
    assert_eq!(done["progress"], 1.0);

    let files = get_json(&bob.url("/files")).await?;
    assert_eq!(files[0]["filename"], "empty.log");
    assert_eq!(files[0]["size"], 0);
    Ok(())
}

#[tokio::test]
async fn test_unknown_peer_and_bad_path_are_rejected() -> Result<()> {
    let alice = Node::spawn("alice").await?;
    let bob = Node::spawn("bob").await?;
    alice.introduce(&bob);

    let src = tempfile::tempdir()?;
    let path = src.path().join("a.txt");
    std::fs::write(&path, b"a")?;

    let resp = send(&alice, "nobody", &path).await?;
    assert_eq!(resp.status(), 404);

    let resp = send(&alice, bob.id(), &src.path().join("missing.txt")).await?;
    assert_eq!(resp.status(), 400);

    let resp = send(&alice, bob.id(), src.path()).await?;
    assert_eq!(resp.status(), 400);

    let listed = get_json(&alice.url("/transfers")).await?;
    assert_eq!(listed.as_array().map(Vec::len), Some(0));
    Ok(())
}

/// A peer whose API port is closed fails the session with a network error.
#[tokio::test]
async fn test_unreachable_peer_fails_transfer() -> Result<()> {
    let alice = Node::spawn("alice").await?;

    let closed = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = closed.local_addr()?;
    drop(closed);
    alice.state.presence.upsert(Peer {
        device_id: "ghost-id".into(),
        device_name: "ghost".into(),
        ip: addr.ip(),
        port: addr.port(),
        last_seen: SystemTime::now(),
    });

    let src = tempfile::tempdir()?;
    let path = src.path().join("a.txt");
    std::fs::write(&path, b"hello")?;

    let started: serde_json::Value = send(&alice, "ghost-id", &path).await?.json().await?;
    let done = wait_for_transfer(&alice, started["id"].as_str().unwrap_or_default()).await?;
    assert_eq!(done["state"], "failed");
    assert!(done["error"].as_str().unwrap_or_default().starts_with("cannot reach"), "{done}");

    let status = get_json(&alice.url("/status")).await?;
    assert_eq!(status["active_transfers"], 0);
    Ok(())
}

/// Aborting a send marks it failed and the receiver keeps nothing.
#[tokio::test]
async fn test_abort_leaves_nothing_on_receiver() -> Result<()> {
    let alice = Node::spawn("alice").await?;
    let bob = Node::spawn("bob").await?;
    alice.introduce(&bob);

    let src = tempfile::tempdir()?;
    let path = src.path().join("huge.iso");
    std::fs::File::create(&path)?.set_len(512 * 1024 * 1024)?;

    let started: serde_json::Value = send(&alice, bob.id(), &path).await?.json().await?;
    let id = started["id"].as_str().context("transfer id")?.to_string();

    let resp = reqwest::Client::new()
        .delete(alice.url(&format!("/transfers/{id}")))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    let aborted: serde_json::Value = resp.json().await?;
    assert_eq!(aborted["state"], "failed");
    assert_eq!(aborted["error"], "transfer aborted");

    // Aborting again is a conflict; the state does not change.
    let resp = reqwest::Client::new()
        .delete(alice.url(&format!("/transfers/{id}")))
        .send()
        .await?;
    assert_eq!(resp.status(), 409);
    assert_eq!(wait_for_transfer(&alice, &id).await?["state"], "failed");

    assert!(eventually(|| bob.staging_count() == 0).await, "partial upload left on receiver");
    assert!(bob.received_names().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_abort_unknown_transfer_is_not_found() -> Result<()> {
    let alice = Node::spawn("alice").await?;
    let resp = reqwest::Client::new()
        .delete(alice.url("/transfers/deadbeef"))
        .send()
        .await?;
    assert_eq!(resp.status(), 404);

    let resp = reqwest::get(alice.url("/transfers/deadbeef")).await?;
    assert_eq!(resp.status(), 404);
    Ok(())
}
