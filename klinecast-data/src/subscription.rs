use crate::{event::StreamEvent, resample::SubMinuteSpan, session::SessionState};
use crate::exchange::ExchangeId;
use futures::Stream;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;

/// Market segment a [`SubscriptionKey`] targets. Many venues route spot and futures to
/// distinct endpoints and symbol spellings.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Spot,
    Futures,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Futures => "futures",
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Candle resolution of a [`SubscriptionKey`].
///
/// Sub-minute resolutions (`1s`, `5s`, `15s`) are synthesised locally from a `1m` wire stream
/// since no supported exchange streams them natively - see [`crate::resample`].
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize,
)]
pub enum Interval {
    #[serde(rename = "1s")]
    S1,
    #[serde(rename = "5s")]
    S5,
    #[serde(rename = "15s")]
    S15,
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::S1 => "1s",
            Interval::S5 => "5s",
            Interval::S15 => "15s",
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
        }
    }

    /// Bucket width in seconds.
    pub fn as_secs(&self) -> i64 {
        match self {
            Interval::S1 => 1,
            Interval::S5 => 5,
            Interval::S15 => 15,
            Interval::M1 => 60,
            Interval::M5 => 300,
            Interval::M15 => 900,
            Interval::M30 => 1_800,
            Interval::H1 => 3_600,
            Interval::H4 => 14_400,
            Interval::D1 => 86_400,
        }
    }

    /// The interval actually subscribed on the wire. Sub-minute intervals ride a `1m` stream.
    pub fn wire_interval(&self) -> Interval {
        match self.sub_minute_span() {
            Some(_) => Interval::M1,
            None => *self,
        }
    }

    /// The synthetic span for sub-minute intervals, `None` for natively streamed ones.
    pub fn sub_minute_span(&self) -> Option<SubMinuteSpan> {
        match self {
            Interval::S1 => Some(SubMinuteSpan::S1),
            Interval::S5 => Some(SubMinuteSpan::S5),
            Interval::S15 => Some(SubMinuteSpan::S15),
            _ => None,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unique identity of a logical kline subscription.
///
/// `symbol` is canonical (concatenated upper-case base and quote, eg/ `BTCUSDT`); wire
/// spellings are derived per exchange by [`crate::symbol`].
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub struct SubscriptionKey {
    pub exchange: ExchangeId,
    pub symbol: SmolStr,
    pub interval: Interval,
    pub market: MarketType,
}

impl SubscriptionKey {
    pub fn new(
        exchange: ExchangeId,
        symbol: impl AsRef<str>,
        interval: Interval,
        market: MarketType,
    ) -> Self {
        Self {
            exchange,
            symbol: SmolStr::new(symbol.as_ref().to_uppercase()),
            interval,
            market,
        }
    }

    /// Identity of the physical wire stream backing this key. Sub-minute siblings collapse
    /// onto the same `1m` stream.
    pub(crate) fn physical(&self) -> PhysicalKey {
        PhysicalKey {
            exchange: self.exchange,
            symbol: self.symbol.clone(),
            market: self.market,
            wire_interval: self.interval.wire_interval(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.exchange, self.market, self.symbol, self.interval
        )
    }
}

/// Identity of one physical WebSocket stream owned by a
/// [`Session`](crate::session::Session).
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub(crate) struct PhysicalKey {
    pub exchange: ExchangeId,
    pub symbol: SmolStr,
    pub market: MarketType,
    pub wire_interval: Interval,
}

/// Handle to one logical kline subscription.
///
/// Yields [`StreamEvent`]s via [`Subscription::next`] (or the [`Stream`] impl) and exposes the
/// backing session's connection state. Dropping the handle releases its logical reference;
/// the physical stream is torn down once the last sibling is gone.
pub struct Subscription {
    key: SubscriptionKey,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    state: watch::Receiver<SessionState>,
    releaser: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(
        key: SubscriptionKey,
        events: mpsc::UnboundedReceiver<StreamEvent>,
        state: watch::Receiver<SessionState>,
        releaser: Box<dyn FnOnce() + Send>,
    ) -> Self {
        Self {
            key,
            events,
            state,
            releaser: Some(releaser),
        }
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Receive the next event, or `None` once the backing session is gone.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Non-blocking receive.
    pub fn try_next(&mut self) -> Option<StreamEvent> {
        self.events.try_recv().ok()
    }

    /// Current connection state of the backing session.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Stream of connection state changes (latest-value semantics).
    pub fn state_stream(&self) -> WatchStream<SessionState> {
        WatchStream::new(self.state.clone())
    }

    /// Explicitly release this subscription. Equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.releaser.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl Stream for Subscription {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("state", &*self.state.borrow())
            .finish()
    }
}
