//! WebSocket control channel for the gateway provider variant.
//!
//! The gateway exposes the realtime control channel over WebSocket instead of
//! a data channel. Outbound events go through an mpsc queue into the sink
//! half; a spawned task pumps the stream half, parses text frames as JSON and
//! forwards them to the orchestrator's event receiver. Closing is idempotent
//! and driven by a cancellation token.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ControlChannel;
use crate::errors::{SessionError, SessionResult};

const WS_CHANNEL_CAPACITY: usize = 256;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Control channel over WebSocket.
pub struct WsControlChannel {
    outbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl WsControlChannel {
    /// Connect to `url` and start the pump task. Returns the channel and the
    /// receiver on which parsed server events arrive; the receiver yields
    /// `None` once the socket closes for any reason.
    pub async fn connect(
        url: &str,
        bearer: Option<&str>,
    ) -> SessionResult<(Self, mpsc::Receiver<Value>)> {
        let uri: http::Uri = url
            .parse()
            .map_err(|e| SessionError::InvalidConfiguration(format!("bad channel url: {}", e)))?;
        let host = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_default();

        let mut request = http::Request::builder()
            .uri(uri)
            .header("Sec-WebSocket-Key", tungstenite::handshake::client::generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        let request = request
            .body(())
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SessionError::Protocol(format!("channel connect failed: {}", e)))?;
        info!(url, "Control channel connected");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<Message>(WS_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<Value>(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }

                    Some(msg) = outbound_rx.recv() => {
                        if let Err(e) = ws_sink.send(msg).await {
                            error!("Control channel send failed: {}", e);
                            break;
                        }
                    }

                    msg = ws_stream.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<Value>(&text) {
                                    Ok(event) => {
                                        if event_tx.send(event).await.is_err() {
                                            debug!("Event receiver dropped, closing channel");
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        warn!("Unparseable server frame: {} - {}", e, text);
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    error!("Failed to send pong: {}", e);
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) => {
                                info!("Control channel closed by server");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!("Control channel error: {}", e);
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            // Dropping event_tx makes the orchestrator observe channel close.
        });

        Ok((Self { outbound, cancel }, event_rx))
    }
}

#[async_trait]
impl ControlChannel for WsControlChannel {
    async fn send(&self, event: Value) -> SessionResult<()> {
        let json = serde_json::to_string(&event)
            .map_err(|e| SessionError::Protocol(format!("event serialize failed: {}", e)))?;
        self.outbound
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    async fn close(&self) {
        self.cancel.cancel();
    }
}
