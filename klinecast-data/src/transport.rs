//! WebSocket transport seam.
//!
//! [`Session`](crate::session::Session) performs all of its I/O through the [`Transport`]
//! trait so the full connection lifecycle is exercisable against an in-memory double; the
//! production implementation is a thin wrapper over `tokio-tungstenite`.

use crate::error::DataError;
use async_trait::async_trait;
use futures::{Sink, Stream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

/// Convenient re-export of the underlying WebSocket message type.
pub type WsMessage = tokio_tungstenite::tungstenite::Message;

/// Convenient re-export of the underlying WebSocket error type.
pub type WsError = tokio_tungstenite::tungstenite::Error;

/// Combined frame-level read/write half of one WebSocket connection.
pub trait WsIo:
    Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Send + Unpin
{
}

impl<T> WsIo for T where
    T: Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Send + Unpin
{
}

/// Factory for physical WebSocket connections.
#[async_trait]
pub trait Transport: Clone + Send + Sync + 'static {
    type Io: WsIo;

    async fn connect(&self, url: &Url) -> Result<Self::Io, DataError>;
}

/// Production [`Transport`] over `tokio-tungstenite` with rustls.
#[derive(Copy, Clone, Debug, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    type Io = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    async fn connect(&self, url: &Url) -> Result<Self::Io, DataError> {
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|error| DataError::Transport(error.to_string()))?;

        Ok(stream)
    }
}
