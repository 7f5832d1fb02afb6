use super::{Decoded, ExchangeId, KeepAlive, ProtocolTranslator, de, unix_now_secs};
use crate::{
    error::DataError,
    event::Candle,
    subscription::{Interval, MarketType},
    transport::WsMessage,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

/// [`Gate`] spot server base url.
///
/// See docs: <https://www.gate.io/docs/developers/apiv4/ws/en/>
pub const BASE_URL_GATE_SPOT: &str = "wss://api.gateio.ws/ws/v4/";

/// [`Gate`] USDT perpetual server base url.
///
/// See docs: <https://www.gate.io/docs/developers/futures/ws/en/>
pub const BASE_URL_GATE_FUTURES: &str = "wss://fx-ws.gateio.ws/v4/ws/usdt";

/// [`Gate`] keepalive period.
///
/// See docs: <https://www.gate.io/docs/developers/apiv4/ws/en/#application-ping-pong>
pub const PING_INTERVAL_GATE: Duration = Duration::from_secs(15);

/// [`Gate`] exchange.
///
/// Spot and futures share one envelope family (`time`/`channel`/`event`/`payload`); only the
/// channel prefix and the shape of candle results differ.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Gate;

impl Gate {
    fn wire_interval(interval: Interval) -> Result<&'static str, DataError> {
        match interval {
            Interval::M1 => Ok("1m"),
            Interval::M5 => Ok("5m"),
            Interval::M15 => Ok("15m"),
            Interval::M30 => Ok("30m"),
            Interval::H1 => Ok("1h"),
            Interval::H4 => Ok("4h"),
            Interval::D1 => Ok("1d"),
            other => Err(DataError::UnsupportedInterval {
                exchange: ExchangeId::Gate,
                interval: other,
            }),
        }
    }

    fn candle_channel(market: MarketType) -> &'static str {
        match market {
            MarketType::Spot => "spot.candlesticks",
            MarketType::Futures => "futures.candlesticks",
        }
    }

    fn request(
        event: &str,
        wire_symbol: &str,
        interval: Interval,
        market: MarketType,
    ) -> Result<WsMessage, DataError> {
        Ok(WsMessage::text(
            json!({
                "time": unix_now_secs(),
                "channel": Self::candle_channel(market),
                "event": event,
                "payload": [Self::wire_interval(interval)?, wire_symbol],
            })
            .to_string(),
        ))
    }
}

impl ProtocolTranslator for Gate {
    fn id(&self) -> ExchangeId {
        ExchangeId::Gate
    }

    fn url(&self, market: MarketType) -> Result<Url, DataError> {
        let base = match market {
            MarketType::Spot => BASE_URL_GATE_SPOT,
            MarketType::Futures => BASE_URL_GATE_FUTURES,
        };
        Url::parse(base).map_err(DataError::from)
    }

    fn subscribe_message(
        &self,
        wire_symbol: &str,
        interval: Interval,
        market: MarketType,
    ) -> Result<WsMessage, DataError> {
        Self::request("subscribe", wire_symbol, interval, market)
    }

    fn unsubscribe_message(
        &self,
        wire_symbol: &str,
        interval: Interval,
        market: MarketType,
    ) -> Result<WsMessage, DataError> {
        Self::request("unsubscribe", wire_symbol, interval, market)
    }

    fn decode(&self, message: &WsMessage, _market: MarketType) -> Decoded {
        let WsMessage::Text(text) = message else {
            return Decoded::Unrecognized;
        };

        let Ok(message) = serde_json::from_str::<GateMessage>(text.as_str()) else {
            return Decoded::Unrecognized;
        };

        if message.channel.ends_with(".pong") {
            return Decoded::KeepAliveResponse;
        }

        match message.event.as_str() {
            "subscribe" => match message.error {
                Some(error) => Decoded::SubscriptionFailed(format!(
                    "code {}: {}",
                    error.code, error.message
                )),
                None => Decoded::SubscriptionConfirmed,
            },
            "update" if message.channel.ends_with(".candlesticks") => {
                let candles: Vec<Candle> = match message.result {
                    Some(GateResult::One(candle)) => vec![candle.into()],
                    Some(GateResult::Many(candles)) => {
                        candles.into_iter().map(Candle::from).collect()
                    }
                    Some(GateResult::Other(_)) | None => vec![],
                };
                if candles.is_empty() {
                    Decoded::Unrecognized
                } else {
                    Decoded::Candles(candles)
                }
            }
            _ => Decoded::Unrecognized,
        }
    }

    fn keep_alive(&self, market: MarketType) -> Option<KeepAlive> {
        let message: fn() -> WsMessage = match market {
            MarketType::Spot => || {
                WsMessage::text(
                    json!({"time": unix_now_secs(), "channel": "spot.ping"}).to_string(),
                )
            },
            MarketType::Futures => || {
                WsMessage::text(
                    json!({"time": unix_now_secs(), "channel": "futures.ping"}).to_string(),
                )
            },
        };

        Some(KeepAlive {
            period: PING_INTERVAL_GATE,
            message,
        })
    }
}

/// ### Raw Payload Examples
/// See docs: <https://www.gate.io/docs/developers/apiv4/ws/en/#candlesticks-channel>
/// ```json
/// {
///     "time": 1606292600,
///     "channel": "spot.candlesticks",
///     "event": "update",
///     "result": {
///         "t": "1606292580", "v": "2362.32035", "c": "19128.1", "h": "19128.1",
///         "l": "19128.1", "o": "19128.1", "n": "1m_BTC_USDT", "w": false
///     }
/// }
/// ```
#[derive(Clone, Debug, Deserialize)]
struct GateMessage {
    channel: String,
    #[serde(default)]
    event: String,
    error: Option<GateError>,
    result: Option<GateResult>,
}

#[derive(Clone, Debug, Deserialize)]
struct GateError {
    code: i64,
    message: String,
}

/// Spot pushes a single candle object; futures pushes an array of them. Status objects on
/// acknowledgements fall through to `Other`.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum GateResult {
    Many(Vec<GateCandle>),
    One(GateCandle),
    Other(serde_json::Value),
}

#[derive(Clone, Debug, Deserialize)]
struct GateCandle {
    /// Bucket open time in epoch seconds (string on spot, number on futures).
    #[serde(deserialize_with = "de::flexible_i64")]
    t: i64,
    #[serde(deserialize_with = "de::flexible_decimal")]
    o: Decimal,
    #[serde(deserialize_with = "de::flexible_decimal")]
    h: Decimal,
    #[serde(deserialize_with = "de::flexible_decimal")]
    l: Decimal,
    #[serde(deserialize_with = "de::flexible_decimal")]
    c: Decimal,
    #[serde(deserialize_with = "de::flexible_decimal")]
    v: Decimal,
    /// Window-close marker, only present on spot.
    w: Option<bool>,
}

impl From<GateCandle> for Candle {
    fn from(candle: GateCandle) -> Self {
        Candle {
            time: candle.t,
            open: candle.o,
            high: candle.h,
            low: candle.l,
            close: candle.c,
            volume: candle.v,
            closed: candle.w.unwrap_or(false),
        }
    }
}
