//! Audit trail for write operations. Client addresses and browsers are
//! reduced before they reach the log.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{header, request::Parts, HeaderMap};
use tracing::Level;

pub const SECURITY_TARGET: &str = "fakedaily::security";

/// IPv4 loses its last octet, IPv6 everything after the fourth group.
pub fn anonymize_ip(address: &str) -> String {
    let address = address.trim();
    if address.is_empty() || address == "unknown" {
        return "unknown".to_string();
    }
    let octets: Vec<&str> = address.split('.').collect();
    if octets.len() == 4 {
        return format!("{}.{}.{}.0", octets[0], octets[1], octets[2]);
    }
    if address.contains(':') {
        let groups: Vec<&str> = address.split(':').take(4).collect();
        return format!("{}::0", groups.join(":"));
    }
    "anonymized".to_string()
}

/// Browser family only; version and platform details are dropped.
pub fn simplify_user_agent(user_agent: &str) -> &'static str {
    let ua = user_agent.trim().to_lowercase();
    if ua.is_empty() || ua == "unknown" {
        return "unknown";
    }
    let edge = ua.contains("edg");
    let chrome = ua.contains("chrome");
    if ua.contains("firefox") {
        "Firefox"
    } else if chrome && !edge {
        "Chrome"
    } else if edge {
        "Edge"
    } else if ua.contains("safari") {
        "Safari"
    } else if ua.contains("opera") || ua.contains("opr") {
        "Opera"
    } else if ua.contains("bot") || ua.contains("crawler") {
        "Bot"
    } else {
        "Other"
    }
}

/// Already-reduced description of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub address: String,
    pub browser: &'static str,
}

impl ClientInfo {
    /// First `X-Forwarded-For` hop wins over the socket peer.
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string);
        let raw = forwarded.or_else(|| peer.map(|p| p.ip().to_string()));
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        Self {
            address: anonymize_ip(raw.as_deref().unwrap_or_default()),
            browser: simplify_user_agent(user_agent),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_parts(&parts.headers, peer))
    }
}

pub fn log_security_event(level: Level, client: &ClientInfo, message: &str) {
    let address = client.address.as_str();
    let browser = client.browser;
    match level {
        Level::ERROR => tracing::error!(target: SECURITY_TARGET, client = address, browser, "{message}"),
        Level::WARN => tracing::warn!(target: SECURITY_TARGET, client = address, browser, "{message}"),
        _ => tracing::info!(target: SECURITY_TARGET, client = address, browser, "{message}"),
    }
}
