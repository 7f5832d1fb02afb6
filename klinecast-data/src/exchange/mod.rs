use crate::{
    error::DataError,
    event::Candle,
    subscription::{Interval, MarketType},
    transport::WsMessage,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use url::Url;

/// Serde helpers for tolerant wire-field decoding.
pub(crate) mod de;

/// [`Binance`](binance::Binance) protocol translator.
pub mod binance;

/// [`Bitget`](bitget::Bitget) protocol translator.
pub mod bitget;

/// [`Bybit`](bybit::Bybit) protocol translator.
pub mod bybit;

/// [`Gate`](gate::Gate) protocol translator.
pub mod gate;

/// [`Mexc`](mexc::Mexc) protocol translator.
pub mod mexc;

/// [`Okx`](okx::Okx) protocol translator.
pub mod okx;

/// Unique identifier for a supported exchange.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    Binance,
    Bitget,
    Bybit,
    Gate,
    Mexc,
    Okx,
}

impl ExchangeId {
    pub const ALL: [ExchangeId; 6] = [
        ExchangeId::Binance,
        ExchangeId::Bitget,
        ExchangeId::Bybit,
        ExchangeId::Gate,
        ExchangeId::Mexc,
        ExchangeId::Okx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
            ExchangeId::Bitget => "bitget",
            ExchangeId::Bybit => "bybit",
            ExchangeId::Gate => "gate",
            ExchangeId::Mexc => "mexc",
            ExchangeId::Okx => "okx",
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lookup the static [`ProtocolTranslator`] for an exchange.
pub fn translator(exchange: ExchangeId) -> &'static dyn ProtocolTranslator {
    match exchange {
        ExchangeId::Binance => &binance::Binance,
        ExchangeId::Bitget => &bitget::Bitget,
        ExchangeId::Bybit => &bybit::Bybit,
        ExchangeId::Gate => &gate::Gate,
        ExchangeId::Mexc => &mexc::Mexc,
        ExchangeId::Okx => &okx::Okx,
    }
}

/// Classified result of decoding one raw WebSocket frame.
///
/// Always a tagged variant, never a raw passthrough, so the owning
/// [`Session`](crate::session::Session) reacts uniformly regardless of exchange.
#[derive(Clone, PartialEq, Debug)]
pub enum Decoded {
    /// The exchange acknowledged the subscription request.
    SubscriptionConfirmed,
    /// The exchange explicitly refused the subscription request.
    SubscriptionFailed(String),
    /// Application-level pong (or equivalent) answering our keepalive.
    KeepAliveResponse,
    /// One or more normalised candle updates, in wire order.
    Candles(Vec<Candle>),
    /// Anything else: housekeeping frames, unknown topics, undecodable payloads.
    Unrecognized,
}

/// Application-level keepalive an exchange requires to hold the connection open.
///
/// Exchanges that rely on transport-level ping/pong alone define none.
pub struct KeepAlive {
    pub period: Duration,
    pub message: fn() -> WsMessage,
}

/// Exchange-specific protocol knowledge: connection URLs, subscription envelope encoding,
/// keepalive requirements, and raw-frame decoding.
///
/// Translators are pure message factories and parsers; all I/O and lifecycle state lives in
/// the owning [`Session`](crate::session::Session).
pub trait ProtocolTranslator: Send + Sync {
    fn id(&self) -> ExchangeId;

    /// WebSocket endpoint, possibly varying by market type.
    fn url(&self, market: MarketType) -> Result<Url, DataError>;

    /// Encode the subscribe request for one wire symbol and natively streamed interval.
    fn subscribe_message(
        &self,
        wire_symbol: &str,
        interval: Interval,
        market: MarketType,
    ) -> Result<WsMessage, DataError>;

    /// Encode the unsubscribe counterpart of [`Self::subscribe_message`].
    fn unsubscribe_message(
        &self,
        wire_symbol: &str,
        interval: Interval,
        market: MarketType,
    ) -> Result<WsMessage, DataError>;

    /// Classify one raw frame. Undecodable input maps to [`Decoded::Unrecognized`],
    /// never an error: the connection stays healthy across unknown messages.
    fn decode(&self, message: &WsMessage, market: MarketType) -> Decoded;

    /// Application-level keepalive requirement, if any.
    fn keep_alive(&self, market: MarketType) -> Option<KeepAlive> {
        let _ = market;
        None
    }
}

/// Current unix time in seconds, for envelopes that carry a client timestamp.
pub(crate) fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}
