//! Outbound transfers: send, list, abort.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::http::{base_url, delete_json, get_json, post_json_body};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Serialize)]
struct SendRequest<'a> {
    device_id: &'a str,
    path: String,
}

#[derive(Deserialize)]
struct TransferStatus {
    id: String,
    device_id: String,
    filename: String,
    bytes_sent: u64,
    total_bytes: u64,
    progress: f64,
    state: String,
    remote_filename: Option<String>,
    error: Option<String>,
}

impl TransferStatus {
    fn is_terminal(&self) -> bool {
        self.state == "completed" || self.state == "failed"
    }
}

pub async fn cmd_send(port: u16, path: &str, device_id: &str) -> Result<()> {
    // The daemon opens the file itself, so hand it an absolute path.
    let abs = std::fs::canonicalize(path).with_context(|| format!("cannot read {}", path))?;
    let req = SendRequest {
        device_id,
        path: abs.to_string_lossy().into_owned(),
    };
    let started: TransferStatus =
        post_json_body(&format!("{}/send", base_url(port)), &req).await?;
    println!("→ Sending {} to {} (transfer {})", started.filename, device_id, started.id);

    let url = format!("{}/transfers/{}", base_url(port), started.id);
    let status = loop {
        let status: TransferStatus = get_json(&url).await?;
        print!(
            "\r  {:>5.1}%  {}/{} bytes",
            status.progress * 100.0,
            status.bytes_sent,
            status.total_bytes
        );
        std::io::stdout().flush().ok();
        if status.is_terminal() {
            println!();
            break status;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    match status.state.as_str() {
        "completed" => {
            println!(
                "✓ Stored on peer as {}",
                status.remote_filename.as_deref().unwrap_or(&status.filename)
            );
            Ok(())
        }
        _ => anyhow::bail!(
            "transfer failed: {}",
            status.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

pub async fn cmd_transfers(port: u16) -> Result<()> {
    let transfers: Vec<TransferStatus> =
        get_json(&format!("{}/transfers", base_url(port))).await?;

    if transfers.is_empty() {
        println!("No transfers.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Transfers ({})", transfers.len());
    println!("═══════════════════════════════════════");
    for t in &transfers {
        println!("  ┌─ {} → {}", t.id, t.device_id);
        println!("  │  file     : {}", t.filename);
        println!("  │  progress : {:.1}% ({}/{} bytes)", t.progress * 100.0, t.bytes_sent, t.total_bytes);
        match &t.error {
            Some(err) => println!("  └─ state    : {} ({})", t.state, err),
            None => println!("  └─ state    : {}", t.state),
        }
    }

    Ok(())
}

pub async fn cmd_abort(port: u16, id: &str) -> Result<()> {
    let status: TransferStatus =
        delete_json(&format!("{}/transfers/{}", base_url(port), id)).await?;
    println!("✓ Transfer {} aborted at {} bytes", status.id, status.bytes_sent);
    Ok(())
}
