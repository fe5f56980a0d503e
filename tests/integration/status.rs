use crate::*;

#[tokio::test]
async fn test_health_and_device_info() -> Result<()> {
    let node = Node::spawn("alice").await?;

    let health = get_json(&node.url("/health")).await?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["service"], "LinkBeam");

    let info = get_json(&node.url("/device/info")).await?;
    assert_eq!(info["device_id"], "alice-id");
    assert_eq!(info["device_name"], "alice");
    assert_eq!(info["port"], node.addr.port());
    assert!(info["ip"].as_str().is_some_and(|ip| !ip.is_empty()));
    Ok(())
}

/// /devices mirrors the presence store, sorted by name.
#[tokio::test]
async fn test_devices_reflect_presence_store() -> Result<()> {
    let alice = Node::spawn("alice").await?;
    let bob = Node::spawn("bob").await?;
    let carol = Node::spawn("carol").await?;

    assert_eq!(get_json(&alice.url("/devices")).await?, serde_json::json!([]));

    alice.introduce(&carol);
    alice.introduce(&bob);
    let devices = get_json(&alice.url("/devices")).await?;
    let names: Vec<&str> = devices
        .as_array()
        .context("devices is an array")?
        .iter()
        .filter_map(|d| d["device_name"].as_str())
        .collect();
    assert_eq!(names, vec!["bob", "carol"]);
    assert_eq!(devices[0]["port"], bob.addr.port());

    alice.state.presence.remove(bob.id());
    let devices = get_json(&alice.url("/devices")).await?;
    assert_eq!(devices.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_status_counts() -> Result<()> {
    let alice = Node::spawn("alice").await?;
    let bob = Node::spawn("bob").await?;
    alice.introduce(&bob);
    upload(&alice, "a.txt", b"a".to_vec()).await?;
    upload(&alice, "b.txt", b"b".to_vec()).await?;

    let status = get_json(&alice.url("/status")).await?;
    assert_eq!(status["device_id"], "alice-id");
    assert_eq!(status["peers"], 1);
    assert_eq!(status["files"], 2);
    assert_eq!(status["active_transfers"], 0);
    assert_eq!(status["malformed_announcements"], 0);
    Ok(())
}
