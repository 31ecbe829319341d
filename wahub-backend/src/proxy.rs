//! Connectivity check for user-supplied proxies

use serde::Serialize;
use std::time::{Duration, Instant};

const PROXY_TEST_TIMEOUT_SECS: u64 = 10;
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

#[derive(Debug, Clone, Serialize)]
pub struct ProxyTestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Accept `http`, `https` and `socks5` proxy URLs that name a host
pub fn validate_proxy_url(raw: &str) -> Result<url::Url, String> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| format!("Invalid proxy URL: {}", e))?;
    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(format!(
            "Unsupported proxy scheme '{}', use http, https or socks5",
            parsed.scheme()
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err("Proxy URL must include a host".to_string());
    }
    Ok(parsed)
}

/// Fetch `target_url` through the proxy and report the exit IP
pub async fn test_proxy(proxy_url: &url::Url, target_url: &str) -> ProxyTestResult {
    let started = Instant::now();
    let outcome = fetch_through(proxy_url, target_url).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(ip) => ProxyTestResult {
            success: true,
            ip,
            latency_ms,
            error: None,
        },
        Err(e) => {
            log::info!("[PROXY] Test through {} failed: {}", redact(proxy_url), e);
            ProxyTestResult {
                success: false,
                ip: None,
                latency_ms,
                error: Some(e),
            }
        }
    }
}

async fn fetch_through(proxy_url: &url::Url, target_url: &str) -> Result<Option<String>, String> {
    let proxy = reqwest::Proxy::all(proxy_url.as_str()).map_err(|e| e.to_string())?;
    let client = reqwest::Client::builder()
        .proxy(proxy)
        .timeout(Duration::from_secs(PROXY_TEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| e.to_string())?;

    let response = client.get(target_url).send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("Test target answered HTTP {}", status.as_u16()));
    }

    let body = response.text().await.map_err(|e| e.to_string())?;
    Ok(extract_ip(&body))
}

/// ipify-style `{"ip": "..."}` or a bare address
fn extract_ip(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        return value
            .get("ip")
            .or_else(|| value.get("origin"))
            .and_then(|v| v.as_str())
            .map(String::from);
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() <= 45 && trimmed.parse::<std::net::IpAddr>().is_ok() {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// Proxy URL without credentials, for logs
pub fn redact(proxy_url: &url::Url) -> String {
    let mut redacted = proxy_url.clone();
    if redacted.password().is_some() {
        let _ = redacted.set_password(Some("***"));
    }
    redacted.to_string()
}
