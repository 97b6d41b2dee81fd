//! Plain HTTP endpoints served next to the WebSocket channel

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::hub::HubStats;

/// Service name reported by `GET /`
pub const SERVICE_NAME: &str = "PeerFlow Signaling Server";

/// Whether the peeked request head asks for a WebSocket upgrade
pub fn is_websocket_upgrade(head: &[u8]) -> bool {
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    head.lines().any(|line| {
        line.split_once(':')
            .map(|(name, value)| name.trim() == "upgrade" && value.trim() == "websocket")
            .unwrap_or(false)
    })
}

/// Route a request line to a status and JSON body
pub fn route(request: &str, stats: HubStats, ws_path: &str) -> (&'static str, String) {
    let mut parts = request
        .lines()
        .next()
        .unwrap_or_default()
        .split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts
        .next()
        .map(|p| p.split('?').next().unwrap_or(p))
        .unwrap_or("/");

    if method != "GET" {
        return ("405 Method Not Allowed", json!({"error": "method not allowed"}).to_string());
    }

    match path {
        "/" => (
            "200 OK",
            json!({
                "message": SERVICE_NAME,
                "status": "running",
                "endpoints": {
                    "websocket": ws_path,
                    "health_check": "/health",
                },
                "stats": {
                    "active_peers": stats.peers,
                    "active_connections": stats.connections,
                },
            })
            .to_string(),
        ),
        "/health" => (
            "200 OK",
            json!({
                "status": "ok",
                "peers": stats.peers,
                "connections": stats.connections,
            })
            .to_string(),
        ),
        p if p == ws_path => (
            "426 Upgrade Required",
            json!({"error": "upgrade required"}).to_string(),
        ),
        _ => ("404 Not Found", json!({"error": "not found"}).to_string()),
    }
}

/// Answer one HTTP request and close
pub async fn handle_http_request(
    stream: &mut TcpStream,
    stats: HubStats,
    ws_path: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let (status, body) = route(&request, stats, ws_path);

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
