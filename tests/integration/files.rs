use std::time::{SystemTime, UNIX_EPOCH};

use crate::*;

/// Upload a file, see it listed with size and timestamp, download it back.
#[tokio::test]
async fn test_upload_list_download() -> Result<()> {
    let node = Node::spawn("bob").await?;
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let before = SystemTime::now()
        .duration_since(UNIX_EPOCH)?
        .as_secs_f64();

    let resp = upload(&node, "report.pdf", body.clone()).await?;
    assert_eq!(resp.status(), 200);
    let receipt: serde_json::Value = resp.json().await?;
    assert_eq!(receipt["success"], true);
    assert_eq!(receipt["filename"], "report.pdf");
    assert_eq!(receipt["size"], body.len() as u64);

    let files = get_json(&node.url("/files")).await?;
    let files = files.as_array().context("files is an array")?;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["filename"], "report.pdf");
    assert_eq!(files[0]["size"], body.len() as u64);
    // Filesystem timestamps come from a coarse clock.
    assert!(files[0]["modified"].as_f64().unwrap_or(0.0) + 1.0 >= before);

    let resp = reqwest::get(node.url("/download/report.pdf")).await?;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/pdf");
    assert_eq!(resp.headers()["content-length"], body.len().to_string().as_str());
    assert!(resp.headers()["content-disposition"]
        .to_str()?
        .starts_with("attachment"));
    assert_eq!(resp.bytes().await?.as_ref(), body.as_slice());

    assert_eq!(node.staging_count(), 0);
    Ok(())
}

/// Two uploads of the same name keep both files.
#[tokio::test]
async fn test_same_name_is_never_overwritten() -> Result<()> {
    let node = Node::spawn("bob").await?;

    let first: serde_json::Value = upload(&node, "report.pdf", b"first".to_vec()).await?.json().await?;
    let second: serde_json::Value = upload(&node, "report.pdf", b"second".to_vec()).await?.json().await?;

    assert_eq!(first["filename"], "report.pdf");
    assert_eq!(second["filename"], "report_1.pdf");
    assert_eq!(node.received_names(), vec!["report.pdf", "report_1.pdf"]);

    let a = reqwest::get(node.url("/download/report.pdf")).await?.bytes().await?;
    let b = reqwest::get(node.url("/download/report_1.pdf")).await?.bytes().await?;
    assert_eq!(a.as_ref(), b"first");
    assert_eq!(b.as_ref(), b"second");
    Ok(())
}

/// Concurrent uploads of one name land on distinct names.
#[tokio::test]
async fn test_concurrent_uploads_get_distinct_names() -> Result<()> {
    let node = Node::spawn("bob").await?;

    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let url = node.url("/upload");
        tasks.push(tokio::spawn(async move {
            let part = reqwest::multipart::Part::bytes(vec![i; 10_000]).file_name("photo.jpg");
            let form = reqwest::multipart::Form::new().part("file", part);
            let resp = reqwest::Client::new().post(url).multipart(form).send().await?;
            let receipt: serde_json::Value = resp.json().await?;
            anyhow::Ok(receipt["filename"].as_str().unwrap_or_default().to_string())
        }));
    }

    let mut names = Vec::new();
    for t in tasks {
        names.push(t.await??);
    }
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 8);
    assert_eq!(node.received_names().len(), 8);
    Ok(())
}

/// Upload names are reduced to a safe last path component.
#[tokio::test]
async fn test_upload_name_is_sanitised() -> Result<()> {
    let node = Node::spawn("bob").await?;

    let receipt: serde_json::Value = upload(&node, "../../etc/passwd", b"x".to_vec()).await?.json().await?;
    assert_eq!(receipt["filename"], "passwd");

    let receipt: serde_json::Value = upload(&node, ".hidden file", b"y".to_vec()).await?.json().await?;
    assert_eq!(receipt["filename"], "hidden_file");

    assert_eq!(node.received_names(), vec!["hidden_file", "passwd"]);
    Ok(())
}

#[tokio::test]
async fn test_empty_upload_is_stored() -> Result<()> {
    let node = Node::spawn("bob").await?;
    let receipt: serde_json::Value = upload(&node, "empty.txt", Vec::new()).await?.json().await?;
    assert_eq!(receipt["size"], 0);

    let resp = reqwest::get(node.url("/download/empty.txt")).await?;
    assert_eq!(resp.status(), 200);
    assert!(resp.bytes().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_download_missing_is_not_found() -> Result<()> {
    let node = Node::spawn("bob").await?;
    std::fs::write(node.dir.path().join(".incoming").join("x.part"), b"partial")?;

    for path in ["/download/missing.txt", "/download/.incoming", "/download/..%2Fsecret"] {
        let resp = reqwest::get(node.url(path)).await?;
        assert_eq!(resp.status(), 404, "{path}");
    }
    Ok(())
}

#[tokio::test]
async fn test_upload_without_file_field_is_rejected() -> Result<()> {
    let node = Node::spawn("bob").await?;
    let form = reqwest::multipart::Form::new().text("note", "no file here");
    let resp = reqwest::Client::new()
        .post(node.url("/upload"))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(resp.status(), 400);
    assert!(node.received_names().is_empty());
    Ok(())
}

/// A client that disconnects mid-body leaves nothing behind.
#[tokio::test]
async fn test_dropped_upload_is_discarded() -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let node = Node::spawn("bob").await?;
    let mut sock = tokio::net::TcpStream::connect(node.addr).await?;

    let head = "--XBOUNDARY\r\n\
        Content-Disposition: form-data; name=\"file\"; filename=\"movie.mkv\"\r\n\
        Content-Type: application/octet-stream\r\n\r\n";
    let request = format!(
        "POST /api/upload HTTP/1.1\r\n\
         Host: {}\r\n\
         Content-Type: multipart/form-data; boundary=XBOUNDARY\r\n\
         Content-Length: 10000000\r\n\r\n{}",
        node.addr, head
    );
    sock.write_all(request.as_bytes()).await?;
    sock.write_all(&vec![0u8; 100_000]).await?;
    sock.flush().await?;

    assert!(eventually(|| node.staging_count() == 1).await, "upload never started");
    drop(sock);

    assert!(eventually(|| node.staging_count() == 0).await, "partial file left behind");
    assert!(node.received_names().is_empty());
    let files = get_json(&node.url("/files")).await?;
    assert_eq!(files.as_array().map(Vec::len), Some(0));
    Ok(())
}
