//! Transport seam between a session and its remote viewer
//!
//! The session only needs to push opaque payloads; the websocket (or whatever
//! carries them) lives outside this crate.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::error::TransportError;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// Hands payloads to an in-process receiver
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.tx.send(payload).map_err(|_| TransportError::Closed)
    }
}

/// Logs each payload at trace level and discards it
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        tracing::trace!(payload = %String::from_utf8_lossy(&payload), "snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport_delivers() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.send(b"hello".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_channel_transport_reports_closed() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        let err = transport.send(vec![1]).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
