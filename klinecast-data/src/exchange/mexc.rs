use super::{Decoded, ExchangeId, KeepAlive, ProtocolTranslator, de};
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

/// [`Mexc`] spot server base url.
///
/// See docs: <https://mexcdevelop.github.io/apidocs/spot_v3_en/#websocket-market-streams>
pub const BASE_URL_MEXC_SPOT: &str = "wss://wbs.mexc.com/ws";

/// [`Mexc`] futures server base url.
///
/// See docs: <https://mexcdevelop.github.io/apidocs/contract_v1_en/#websocket-api>
pub const BASE_URL_MEXC_FUTURES: &str = "wss://contract.mexc.com/edge";

/// [`Mexc`] keepalive period, identical on both markets though the envelopes differ.
pub const PING_INTERVAL_MEXC: Duration = Duration::from_secs(20);

/// [`Mexc`] exchange.
///
/// Spot and futures are effectively two protocols behind one brand: distinct endpoints,
/// symbol spellings, envelopes and payload shapes. Spot klines carry no close flag, so spot
/// updates are emitted with `closed: false` only.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Mexc;

impl Mexc {
    /// Interval token shared by both markets, eg/ `Min1`, `Hour4`, `Day1`.
    fn wire_interval(interval: Interval) -> Result<&'static str, DataError> {
        match interval {
            Interval::M1 => Ok("Min1"),
            Interval::M5 => Ok("Min5"),
            Interval::M15 => Ok("Min15"),
            Interval::M30 => Ok("Min30"),
            Interval::H1 => Ok("Min60"),
            Interval::H4 => Ok("Hour4"),
            Interval::D1 => Ok("Day1"),
            other => Err(DataError::UnsupportedInterval {
                exchange: ExchangeId::Mexc,
                interval: other,
            }),
        }
    }

    /// Spot stream name of the form `spot@public.kline.v3.api@BTCUSDT@Min1`.
    fn spot_stream(wire_symbol: &str, interval: Interval) -> Result<String, DataError> {
        Ok(format!(
            "spot@public.kline.v3.api@{wire_symbol}@{}",
            Self::wire_interval(interval)?
        ))
    }

    fn request(
        &self,
        subscribe: bool,
        wire_symbol: &str,
        interval: Interval,
        market: MarketType,
    ) -> Result<WsMessage, DataError> {
        let message = match market {
            MarketType::Spot => json!({
                "method": if subscribe { "SUBSCRIPTION" } else { "UNSUBSCRIPTION" },
                "params": [Self::spot_stream(wire_symbol, interval)?],
            }),
            MarketType::Futures => json!({
                "method": if subscribe { "sub.kline" } else { "unsub.kline" },
                "param": {
                    "symbol": wire_symbol,
                    "interval": Self::wire_interval(interval)?,
                },
            }),
        };

        Ok(WsMessage::text(message.to_string()))
    }

    fn decode_spot(text: &str) -> Decoded {
        match serde_json::from_str::<MexcSpotMessage>(text) {
            Ok(MexcSpotMessage::Kline(push)) => Decoded::Candles(vec![push.d.k.into()]),
            Ok(MexcSpotMessage::Ack(ack)) => {
                if ack.msg == "PONG" {
                    Decoded::KeepAliveResponse
                } else if ack.code == 0 && ack.msg.contains("kline") {
                    Decoded::SubscriptionConfirmed
                } else if ack.code != 0 {
                    Decoded::SubscriptionFailed(format!("code {}: {}", ack.code, ack.msg))
                } else {
                    Decoded::Unrecognized
                }
            }
            Err(_) => Decoded::Unrecognized,
        }
    }

    fn decode_futures(text: &str) -> Decoded {
        let Ok(message) = serde_json::from_str::<MexcFuturesMessage>(text) else {
            return Decoded::Unrecognized;
        };

        match message.channel.as_str() {
            "pong" => Decoded::KeepAliveResponse,
            "rs.sub.kline" => {
                if message.data.as_str() == Some("success") {
                    Decoded::SubscriptionConfirmed
                } else {
                    Decoded::SubscriptionFailed(message.data.to_string())
                }
            }
            "rs.error" => Decoded::SubscriptionFailed(message.data.to_string()),
            "push.kline" => {
                match serde_json::from_value::<MexcFuturesKline>(message.data) {
                    Ok(kline) => Decoded::Candles(vec![kline.into()]),
                    Err(_) => Decoded::Unrecognized,
                }
            }
            _ => Decoded::Unrecognized,
        }
    }
}

impl ProtocolTranslator for Mexc {
    fn id(&self) -> ExchangeId {
        ExchangeId::Mexc
    }

    fn url(&self, market: MarketType) -> Result<Url, DataError> {
        let base = match market {
            MarketType::Spot => BASE_URL_MEXC_SPOT,
            MarketType::Futures => BASE_URL_MEXC_FUTURES,
        };
        Url::parse(base).map_err(DataError::from)
    }

    fn subscribe_message(
        &self,
        wire_symbol: &str,
        interval: Interval,
        market: MarketType,
    ) -> Result<WsMessage, DataError> {
        self.request(true, wire_symbol, interval, market)
    }

    fn unsubscribe_message(
        &self,
        wire_symbol: &str,
        interval: Interval,
        market: MarketType,
    ) -> Result<WsMessage, DataError> {
        self.request(false, wire_symbol, interval, market)
    }

    fn decode(&self, message: &WsMessage, market: MarketType) -> Decoded {
        let WsMessage::Text(text) = message else {
            return Decoded::Unrecognized;
        };

        match market {
            MarketType::Spot => Self::decode_spot(text.as_str()),
            MarketType::Futures => Self::decode_futures(text.as_str()),
        }
    }

    fn keep_alive(&self, market: MarketType) -> Option<KeepAlive> {
        let message: fn() -> WsMessage = match market {
            MarketType::Spot => || WsMessage::text(json!({"method": "PING"}).to_string()),
            MarketType::Futures => || WsMessage::text(json!({"method": "ping"}).to_string()),
        };

        Some(KeepAlive {
            period: PING_INTERVAL_MEXC,
            message,
        })
    }
}

/// Messages received on a [`Mexc`] spot kline stream.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum MexcSpotMessage {
    Kline(MexcSpotPush),
    Ack(MexcSpotAck),
}

/// Acknowledgement envelope, also used for `PONG` replies.
#[derive(Clone, Debug, Deserialize)]
struct MexcSpotAck {
    #[allow(dead_code)]
    id: i64,
    code: i64,
    msg: String,
}

/// ### Raw Payload Examples
/// See docs: <https://mexcdevelop.github.io/apidocs/spot_v3_en/#k-line-streams>
/// ```json
/// {
///     "d": {
///         "e": "spot@public.kline.v3.api",
///         "k": {
///             "t": 1737719820, "o": "98654.32", "c": "98666.98", "h": "98670.00",
///             "l": "98650.01", "v": "1.837", "a": "181236.55", "T": 1737719880, "i": "Min1"
///         }
///     },
///     "c": "spot@public.kline.v3.api@BTCUSDT@Min1",
///     "t": 1737719821432
/// }
/// ```
#[derive(Clone, Debug, Deserialize)]
struct MexcSpotPush {
    d: MexcSpotData,
    #[allow(dead_code)]
    c: String,
}

#[derive(Clone, Debug, Deserialize)]
struct MexcSpotData {
    k: MexcSpotKline,
}

#[derive(Clone, Debug, Deserialize)]
struct MexcSpotKline {
    /// Bucket open time in epoch seconds.
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
}

impl From<MexcSpotKline> for Candle {
    fn from(kline: MexcSpotKline) -> Self {
        Candle {
            time: kline.t,
            open: kline.o,
            high: kline.h,
            low: kline.l,
            close: kline.c,
            volume: kline.v,
            closed: false,
        }
    }
}

/// Channel-tagged futures envelope, eg/ `{"channel": "push.kline", "data": {..}, "ts": ..}`.
#[derive(Clone, Debug, Deserialize)]
struct MexcFuturesMessage {
    channel: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// ### Raw Payload Examples
/// See docs: <https://mexcdevelop.github.io/apidocs/contract_v1_en/#k-line>
/// ```json
/// {
///     "channel": "push.kline",
///     "data": {
///         "a": 233.74, "c": 6885.0, "h": 6910.5, "l": 6885.0, "o": 6894.5,
///         "q": 1611754, "symbol": "BTC_USDT", "interval": "Min1", "t": 1587442800
///     },
///     "ts": 1587442022003
/// }
/// ```
#[derive(Clone, Debug, Deserialize)]
struct MexcFuturesKline {
    /// Bucket open time in epoch seconds.
    t: i64,
    #[serde(deserialize_with = "de::flexible_decimal")]
    o: Decimal,
    #[serde(deserialize_with = "de::flexible_decimal")]
    h: Decimal,
    #[serde(deserialize_with = "de::flexible_decimal")]
    l: Decimal,
    #[serde(deserialize_with = "de::flexible_decimal")]
    c: Decimal,
    /// Contract volume.
    #[serde(deserialize_with = "de::flexible_decimal")]
    q: Decimal,
}

impl From<MexcFuturesKline> for Candle {
    fn from(kline: MexcFuturesKline) -> Self {
        Candle {
            time: kline.t,
            open: kline.o,
            high: kline.h,
            low: kline.l,
            close: kline.c,
            volume: kline.q,
            closed: false,
        }
    }
}
