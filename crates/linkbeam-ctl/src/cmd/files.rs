//! Received files: listing and download.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use super::http::{base_url, check, get_json};

#[derive(Deserialize)]
struct StoredFile {
    filename: String,
    size: u64,
    modified: f64,
}

pub async fn cmd_files(port: u16) -> Result<()> {
    let files: Vec<StoredFile> = get_json(&format!("{}/files", base_url(port))).await?;

    if files.is_empty() {
        println!("No received files.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Received Files ({})", files.len());
    println!("═══════════════════════════════════════");
    for f in &files {
        println!(
            "  {:<40} {:>12} bytes   modified {:.0}",
            f.filename, f.size, f.modified
        );
    }

    Ok(())
}

pub async fn cmd_download(port: u16, filename: &str, out: Option<&str>) -> Result<()> {
    let url = format!("{}/download/{}", base_url(port), filename);
    let resp = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to connect to linkbeamd at {}", url))?;
    let mut resp = check(resp).await?;

    let out = out.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(filename));
    let mut file = tokio::fs::File::create(&out)
        .await
        .with_context(|| format!("failed to create {}", out.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await.context("download interrupted")? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    println!("✓ Downloaded {} ({} bytes) to {}", filename, written, out.display());
    Ok(())
}
