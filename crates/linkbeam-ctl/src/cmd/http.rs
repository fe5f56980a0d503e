//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

fn connect_error(url: &str) -> String {
    format!("failed to connect to linkbeamd at {}, is it running?", url)
}

/// Fail on non-2xx with the daemon's error text.
pub async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("daemon returned {}: {}", status, body)
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    let resp = reqwest::get(url).await.with_context(|| connect_error(url))?;
    check(resp)
        .await?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn post_json_body<T, R>(url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: for<'de> Deserialize<'de>,
{
    let resp = reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| connect_error(url))?;
    check(resp)
        .await?
        .json::<R>()
        .await
        .context("failed to parse response")
}

pub async fn delete_json<R: for<'de> Deserialize<'de>>(url: &str) -> Result<R> {
    let resp = reqwest::Client::new()
        .delete(url)
        .send()
        .await
        .with_context(|| connect_error(url))?;
    check(resp)
        .await?
        .json::<R>()
        .await
        .context("failed to parse response")
}
