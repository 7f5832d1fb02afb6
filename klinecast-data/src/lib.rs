//! # Klinecast-Data
//! High performance & normalised WebSocket kline ingestion for leading cryptocurrency
//! exchanges - batteries included.
//!
//! Every exchange spells its symbols, subscription handshakes, keepalives and candle
//! payloads differently, and none streams candles finer than one minute. Klinecast hides
//! all of it behind a single subscribe/unsubscribe surface and one canonical event stream:
//!
//! - **[`symbol`]**: pure, self-inverse canonical-to-wire symbol mapping per exchange.
//! - **[`exchange`]**: one [`ProtocolTranslator`](exchange::ProtocolTranslator) per venue
//!   (Binance, OKX, Bybit, Gate, Bitget, MEXC) encoding URLs, envelopes, keepalive cadence
//!   and frame decoding. Translators perform no I/O.
//! - **[`session`]**: the connection lifecycle state machine, written once -
//!   connect, await confirmation, stream, reconnect with linear backoff, abandon at the
//!   ceiling - with every timer owned by the session and cancelled on transition.
//! - **[`resample`]**: deterministic synthesis of 1s/5s/15s candles from 1-minute data.
//! - **[`registry`]**: [`KlineStreams`], the aggregation root de-duplicating subscriptions
//!   and fanning one physical stream out to its logical consumers.
//!
//! ## Example
//! ```rust,no_run
//! use klinecast_data::{
//!     ExchangeId, Interval, KlineStreams, MarketType, StreamEvent, SubscriptionKey,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let streams = KlineStreams::new();
//!
//!     let mut subscription = streams
//!         .subscribe(SubscriptionKey::new(
//!             ExchangeId::Binance,
//!             "BTCUSDT",
//!             Interval::S15,
//!             MarketType::Futures,
//!         ))
//!         .expect("supported symbol");
//!
//!     while let Some(event) = subscription.next().await {
//!         match event {
//!             StreamEvent::Candle { key, candle } => println!("{key}: {candle:?}"),
//!             StreamEvent::Abandoned { key, reason } => {
//!                 eprintln!("{key} abandoned: {reason}");
//!                 break;
//!             }
//!         }
//!     }
//! }
//! ```

/// All errors generated in `klinecast-data`.
pub mod error;

/// Canonical candle and stream event models.
pub mod event;

/// Exchange identifiers and per-venue protocol translators.
pub mod exchange;

/// [`KlineStreams`] aggregation root and its [`StreamConfig`] tunables.
pub mod registry;

/// Deterministic sub-minute candle synthesis.
pub mod resample;

/// Connection session lifecycle state machine.
pub mod session;

/// Subscription keys, intervals, market types, and the consumer-facing handle.
pub mod subscription;

/// Pure canonical-to-wire symbol mapping.
pub mod symbol;

/// WebSocket transport seam.
pub mod transport;

pub use error::DataError;
pub use event::{Candle, StreamEvent};
pub use exchange::ExchangeId;
pub use registry::{KlineStreams, StreamConfig};
pub use resample::SubMinuteSpan;
pub use session::SessionState;
pub use subscription::{Interval, MarketType, Subscription, SubscriptionKey};
