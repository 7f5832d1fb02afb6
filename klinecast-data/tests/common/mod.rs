//! In-memory connection double used to exercise the full session lifecycle without a
//! network: the test plays the exchange, pushing frames to the client and inspecting what
//! the client sent.

// Each integration-test binary uses its own subset of these helpers
#![allow(dead_code)]

use async_trait::async_trait;
use futures::{Sink, Stream};
use klinecast_data::{
    error::DataError,
    transport::{Transport, WsError, WsMessage},
};
use std::{
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use url::Url;

#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    connects: u32,
    refuse: bool,
    server: Option<ServerSide>,
}

struct ServerSide {
    to_client: Option<mpsc::UnboundedSender<Result<WsMessage, WsError>>>,
    from_client: mpsc::UnboundedReceiver<WsMessage>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total connection attempts observed, successful or refused.
    pub fn connects(&self) -> u32 {
        self.state.lock().expect("mock state poisoned").connects
    }

    /// Make every subsequent connection attempt fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().expect("mock state poisoned").refuse = refuse;
    }

    /// Push a text frame to the client on the most recent connection.
    pub fn push(&self, text: &str) {
        let state = self.state.lock().expect("mock state poisoned");
        let sender = state
            .server
            .as_ref()
            .and_then(|server| server.to_client.as_ref())
            .expect("no live connection to push to");
        sender
            .send(Ok(WsMessage::text(text)))
            .expect("client receiver dropped");
    }

    /// Sever the most recent connection server-side; the client observes end-of-stream.
    pub fn disconnect(&self) {
        let mut state = self.state.lock().expect("mock state poisoned");
        if let Some(server) = state.server.as_mut() {
            server.to_client = None;
        }
    }

    /// Drain and return the text frames the client has sent on the most recent connection.
    pub fn sent_messages(&self) -> Vec<String> {
        let mut state = self.state.lock().expect("mock state poisoned");
        let mut sent = Vec::new();
        if let Some(server) = state.server.as_mut() {
            while let Ok(message) = server.from_client.try_recv() {
                if let WsMessage::Text(text) = message {
                    sent.push(text.as_str().to_string());
                }
            }
        }
        sent
    }

    /// Whether the client closed or dropped its side of the most recent connection.
    pub fn client_closed(&self) -> bool {
        self.state
            .lock()
            .expect("mock state poisoned")
            .server
            .as_ref()
            .is_some_and(|server| server.closed.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Io = MockIo;

    async fn connect(&self, _url: &Url) -> Result<Self::Io, DataError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.connects += 1;
        if state.refuse {
            return Err(DataError::Transport("connection refused".to_string()));
        }

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        state.server = Some(ServerSide {
            to_client: Some(to_client),
            from_client,
            closed: Arc::clone(&closed),
        });

        Ok(MockIo {
            incoming,
            outgoing,
            closed,
        })
    }
}

pub struct MockIo {
    incoming: mpsc::UnboundedReceiver<Result<WsMessage, WsError>>,
    outgoing: mpsc::UnboundedSender<WsMessage>,
    closed: Arc<AtomicBool>,
}

impl Stream for MockIo {
    type Item = Result<WsMessage, WsError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.incoming.poll_recv(cx)
    }
}

impl Sink<WsMessage> for MockIo {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsMessage) -> Result<(), Self::Error> {
        self.outgoing
            .send(item)
            .map_err(|_| WsError::ConnectionClosed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.closed.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

impl Drop for MockIo {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Binance-style subscribe acknowledgement.
pub fn binance_confirm() -> &'static str {
    r#"{"result": null, "id": 1}"#
}

/// Binance-style kline frame for a 1m bucket starting at `time` unix seconds.
pub fn binance_kline(
    time: i64,
    open: &str,
    high: &str,
    low: &str,
    close: &str,
    volume: &str,
    closed: bool,
) -> String {
    format!(
        r#"{{"e": "kline", "E": {event_time}, "s": "BTCUSDT", "k": {{"t": {open_ms}, "T": {close_ms}, "s": "BTCUSDT", "i": "1m", "o": "{open}", "c": "{close}", "h": "{high}", "l": "{low}", "v": "{volume}", "x": {closed}}}}}"#,
        event_time = time * 1_000 + 500,
        open_ms = time * 1_000,
        close_ms = (time + 60) * 1_000 - 1,
    )
}

/// Poll `condition` under the paused clock, nudging virtual time forward until it holds.
pub async fn wait_for(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..100_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
