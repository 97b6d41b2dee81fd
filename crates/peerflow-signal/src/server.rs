//! WebSocket signal server implementation

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use peerflow_core::{Config, SignalConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::{debug, info, warn};

use crate::connections::{Outbound, OutboundQueue};
use crate::http::{handle_http_request, is_websocket_upgrade};
use crate::hub::SignalHub;
use crate::session::{Flow, SignalingSession};
use crate::sweeper::spawn_sweeper;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Bytes peeked to classify a request as HTTP or WebSocket
const HEAD_PEEK_BYTES: usize = 2048;

/// Peek attempts while waiting for a complete request head
const HEAD_PEEK_ATTEMPTS: usize = 5;

/// Signal server state
pub struct SignalServer {
    hub: Arc<SignalHub>,
    config: Arc<Config>,
    listener: TcpListener,
}

impl SignalServer {
    /// Bind the configured address
    pub async fn bind(config: Config) -> Result<Self, std::io::Error> {
        let addr = SocketAddr::new(config.signal.bind, config.signal.port);
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            hub: Arc::new(SignalHub::new(&config)),
            config: Arc::new(config),
            listener,
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Shared state, for monitoring and tests
    pub fn hub(&self) -> Arc<SignalHub> {
        self.hub.clone()
    }

    /// Start the sweeper and accept connections forever
    pub async fn serve(self) -> Result<(), std::io::Error> {
        info!("Signal server listening on {}", self.local_addr()?);

        let _sweeper = spawn_sweeper(self.hub.clone(), self.config.signal.sweep_interval());

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            let hub = self.hub.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, hub, config).await {
                    debug!("Connection error from {}: {:?}", peer_addr, e);
                }
            });
        }
    }
}

/// Handle a single connection (HTTP or WebSocket)
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    hub: Arc<SignalHub>,
    config: Arc<Config>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut head = [0u8; HEAD_PEEK_BYTES];
    let n = peek_head(&stream, &mut head).await?;
    if n == 0 {
        return Ok(());
    }

    if !is_websocket_upgrade(&head[..n]) {
        return handle_http_request(&mut stream, hub.stats(), &config.signal.ws_path).await;
    }

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.network.max_frame_bytes);

    let signal = &config.signal;
    let ws_stream = accept_hdr_async_with_config(
        stream,
        |req: &Request, resp: Response| check_handshake(signal, peer_addr, req, resp),
        Some(ws_config),
    )
    .await?;
    let (ws_sender, mut ws_receiver) = ws_stream.split();

    let (handle, queue) = hub.open_channel();
    let writer = tokio::spawn(run_writer(ws_sender, queue));
    let mut session = SignalingSession::new(hub.clone(), handle.clone());
    debug!("Channel {} opened from {}", handle.id(), peer_addr);

    loop {
        tokio::select! {
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if session.handle_text(&text) == Flow::Stop {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!("WebSocket error: {:?}", e);
                    break;
                }
            },
            _ = handle.closed() => {
                debug!("Channel {} closed by server", handle.id());
                break;
            }
        }
    }

    let channel_id = handle.id();
    session.finish();
    drop(handle);
    let _ = writer.await;

    debug!("Connection closed: channel {} from {}", channel_id, peer_addr);
    Ok(())
}

/// Peek until the request head is complete, the buffer fills or the
/// attempts run out
async fn peek_head(stream: &TcpStream, buf: &mut [u8]) -> Result<usize, std::io::Error> {
    let mut n = 0;
    for _ in 0..HEAD_PEEK_ATTEMPTS {
        n = stream.peek(buf).await?;
        if n == 0 || n == buf.len() || buf[..n].windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(n)
}

/// Validate path and origin during the upgrade
fn check_handshake(
    config: &SignalConfig,
    peer_addr: SocketAddr,
    req: &Request,
    resp: Response,
) -> Result<Response, ErrorResponse> {
    if req.uri().path() != config.ws_path {
        return Err(error_response(StatusCode::NOT_FOUND, "not found"));
    }

    let origin = req
        .headers()
        .get("origin")
        .and_then(|value| value.to_str().ok());
    if !config.origin_allowed(origin) {
        warn!(
            "Rejected connection from {} with unauthorized origin: {:?}",
            peer_addr, origin
        );
        return Err(error_response(StatusCode::FORBIDDEN, "origin not allowed"));
    }

    info!("WebSocket connection accepted from {:?}", origin.unwrap_or("unknown"));
    Ok(resp)
}

fn error_response(status: StatusCode, message: &str) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(message.to_string()));
    *resp.status_mut() = status;
    resp
}

/// Drain a channel's queue into its socket
async fn run_writer(mut sink: WsSink, mut queue: OutboundQueue) {
    while let Some(frame) = queue.next().await {
        match frame {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!("Send failed: {:?}", e);
                    break;
                }
            }
            Outbound::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
    let _ = sink.close().await;
}
