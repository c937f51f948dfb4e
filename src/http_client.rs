use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value;

const REQUEST_TIMEOUT_SECS: u64 = 60;
const USER_AGENT_VALUE: &str = "cfb-spreads/0.1";

static CLIENT: OnceCell<Client> = OnceCell::new();

pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

/// GETs `url` with `query` and bearer auth and decodes the JSON body.
/// Non-2xx responses become errors carrying a trimmed body snippet.
pub fn get_json(url: &str, query: &[(&str, String)], bearer: &str) -> Result<Value> {
    let client = http_client()?;
    let resp = client
        .get(url)
        .query(query)
        .bearer_auth(bearer)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .header(ACCEPT, "application/json")
        .send()
        .with_context(|| format!("request {url}"))?;
    let status = resp.status();
    let body = resp
        .text()
        .with_context(|| format!("failed reading body from {url}"))?;
    if !status.is_success() {
        return Err(anyhow!("http {} from {}: {}", status, url, snippet(&body)));
    }
    serde_json::from_str(&body).with_context(|| format!("invalid json from {url}"))
}

fn snippet(body: &str) -> String {
    body.trim()
        .replace(['\n', '\r'], " ")
        .chars()
        .take(220)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::snippet;

    #[test]
    fn snippet_is_single_line_and_bounded() {
        let body = format!("  line one\nline two\r\n{}", "x".repeat(500));
        let s = snippet(&body);
        assert!(!s.contains('\n'));
        assert_eq!(s.chars().count(), 220);
        assert!(s.starts_with("line one line two"));
    }
}
