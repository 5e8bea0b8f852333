//! WebSocket client for driving streaming sessions in tests.
//!
//! Wraps a `tokio-tungstenite` connection and decodes server text frames
//! into [`OutboundMessage`]s. Every receive has a timeout so a hung
//! session fails the test instead of stalling it.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use voice_protocol::{decode_outbound, OutboundMessage};

/// Default time to wait for one server frame.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// What the server sent next.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A decoded JSON message.
    Message(OutboundMessage),
    /// A close frame, with code and reason when present.
    Closed(Option<(u16, String)>),
    /// The stream ended without a close frame.
    Ended,
}

/// Test client for `/ws/products`.
pub struct TestStreamClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestStreamClient {
    /// Connect to a streaming endpoint.
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", url, e))?;
        Ok(Self { socket })
    }

    /// Send one binary audio chunk.
    pub async fn send_audio(&mut self, bytes: &[u8]) -> Result<(), anyhow::Error> {
        self.socket.send(Message::Binary(bytes.to_vec())).await?;
        Ok(())
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.socket.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send a normal-closure close frame.
    pub async fn close(&mut self) -> Result<(), anyhow::Error> {
        self.socket
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "client done".into(),
            })))
            .await?;
        Ok(())
    }

    /// Next server event, skipping ping/pong.
    pub async fn next_event(&mut self) -> Result<ServerEvent, anyhow::Error> {
        self.next_event_within(RECEIVE_TIMEOUT).await
    }

    /// Next server event, waiting at most `timeout`.
    pub async fn next_event_within(
        &mut self,
        timeout: Duration,
    ) -> Result<ServerEvent, anyhow::Error> {
        loop {
            let next = tokio::time::timeout(timeout, self.socket.next())
                .await
                .map_err(|_| anyhow::anyhow!("No server frame within {:?}", timeout))?;

            let message = match next {
                None => return Ok(ServerEvent::Ended),
                Some(Err(e)) => return Err(anyhow::anyhow!("Read failed: {}", e)),
                Some(Ok(message)) => message,
            };

            match message {
                Message::Text(text) => {
                    let decoded = decode_outbound(&text)
                        .map_err(|e| anyhow::anyhow!("Undecodable server message {}: {}", text, e))?;
                    return Ok(ServerEvent::Message(decoded));
                }
                Message::Close(frame) => {
                    return Ok(ServerEvent::Closed(
                        frame.map(|f| (u16::from(f.code), f.reason.into_owned())),
                    ));
                }
                Message::Binary(bytes) => {
                    return Err(anyhow::anyhow!(
                        "Unexpected binary frame of {} bytes from server",
                        bytes.len()
                    ));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    /// Next decoded message; fails on close or end of stream.
    pub async fn next_message(&mut self) -> Result<OutboundMessage, anyhow::Error> {
        match self.next_event().await? {
            ServerEvent::Message(message) => Ok(message),
            other => Err(anyhow::anyhow!("Expected a message, got {:?}", other)),
        }
    }

    /// Read until the server closes, returning the messages seen before
    /// the close and the close code.
    pub async fn drain_until_close(
        &mut self,
    ) -> Result<(Vec<OutboundMessage>, Option<u16>), anyhow::Error> {
        let mut messages = Vec::new();
        loop {
            match self.next_event().await? {
                ServerEvent::Message(message) => messages.push(message),
                ServerEvent::Closed(frame) => return Ok((messages, frame.map(|(code, _)| code))),
                ServerEvent::Ended => return Ok((messages, None)),
            }
        }
    }
}
