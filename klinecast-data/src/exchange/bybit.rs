use super::{Decoded, ExchangeId, KeepAlive, ProtocolTranslator};
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

/// [`Bybit`] spot server base url.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/ws/connect>
pub const BASE_URL_BYBIT_SPOT: &str = "wss://stream.bybit.com/v5/public/spot";

/// [`Bybit`] USDT perpetual server base url.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/ws/connect>
pub const BASE_URL_BYBIT_FUTURES: &str = "wss://stream.bybit.com/v5/public/linear";

/// [`Bybit`] keepalive period. The docs recommend an application ping every 20 seconds.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/ws/connect#how-to-send-the-heartbeat-packet>
pub const PING_INTERVAL_BYBIT: Duration = Duration::from_secs(20);

/// [`Bybit`] exchange.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/websocket/public/kline>
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Bybit;

impl Bybit {
    /// Interval token used inside the kline topic, minutes as bare numbers.
    fn wire_interval(interval: Interval) -> Result<&'static str, DataError> {
        match interval {
            Interval::M1 => Ok("1"),
            Interval::M5 => Ok("5"),
            Interval::M15 => Ok("15"),
            Interval::M30 => Ok("30"),
            Interval::H1 => Ok("60"),
            Interval::H4 => Ok("240"),
            Interval::D1 => Ok("D"),
            other => Err(DataError::UnsupportedInterval {
                exchange: ExchangeId::Bybit,
                interval: other,
            }),
        }
    }

    /// Topic of the form `kline.1.BTCUSDT`.
    fn topic(wire_symbol: &str, interval: Interval) -> Result<String, DataError> {
        Ok(format!("kline.{}.{}", Self::wire_interval(interval)?, wire_symbol))
    }

    fn request(op: &str, topic: String) -> WsMessage {
        WsMessage::text(
            json!({
                "op": op,
                "args": [topic],
            })
            .to_string(),
        )
    }
}

impl ProtocolTranslator for Bybit {
    fn id(&self) -> ExchangeId {
        ExchangeId::Bybit
    }

    fn url(&self, market: MarketType) -> Result<Url, DataError> {
        let base = match market {
            MarketType::Spot => BASE_URL_BYBIT_SPOT,
            MarketType::Futures => BASE_URL_BYBIT_FUTURES,
        };
        Url::parse(base).map_err(DataError::from)
    }

    fn subscribe_message(
        &self,
        wire_symbol: &str,
        interval: Interval,
        _market: MarketType,
    ) -> Result<WsMessage, DataError> {
        Ok(Self::request("subscribe", Self::topic(wire_symbol, interval)?))
    }

    fn unsubscribe_message(
        &self,
        wire_symbol: &str,
        interval: Interval,
        _market: MarketType,
    ) -> Result<WsMessage, DataError> {
        Ok(Self::request("unsubscribe", Self::topic(wire_symbol, interval)?))
    }

    fn decode(&self, message: &WsMessage, _market: MarketType) -> Decoded {
        let WsMessage::Text(text) = message else {
            return Decoded::Unrecognized;
        };

        match serde_json::from_str::<BybitMessage>(text.as_str()) {
            Ok(BybitMessage::Kline(message)) => Decoded::Candles(
                message
                    .data
                    .into_iter()
                    .map(Candle::from)
                    .collect(),
            ),
            Ok(BybitMessage::Response(response)) => {
                let is_pong = response.op.as_deref() == Some("pong")
                    || response.ret_msg.as_deref() == Some("pong");
                if is_pong {
                    Decoded::KeepAliveResponse
                } else if response.op.as_deref() == Some("subscribe") {
                    if response.success {
                        Decoded::SubscriptionConfirmed
                    } else {
                        Decoded::SubscriptionFailed(
                            response.ret_msg.unwrap_or_else(|| "subscribe refused".to_string()),
                        )
                    }
                } else {
                    Decoded::Unrecognized
                }
            }
            Err(_) => Decoded::Unrecognized,
        }
    }

    fn keep_alive(&self, _market: MarketType) -> Option<KeepAlive> {
        Some(KeepAlive {
            period: PING_INTERVAL_BYBIT,
            message: || WsMessage::text(json!({"op": "ping"}).to_string()),
        })
    }
}

/// Messages received on a [`Bybit`] kline stream.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum BybitMessage {
    Kline(BybitKlineMessage),
    Response(BybitResponse),
}

/// Operation acknowledgement or heartbeat reply.
///
/// `{"success": true, "ret_msg": "pong", "conn_id": "..", "op": "ping"}` answers our ping;
/// `{"success": true, "op": "subscribe", ..}` confirms a subscription.
#[derive(Clone, Debug, Deserialize)]
struct BybitResponse {
    success: bool,
    ret_msg: Option<String>,
    op: Option<String>,
}

/// ### Raw Payload Examples
/// See docs: <https://bybit-exchange.github.io/docs/v5/websocket/public/kline>
/// ```json
/// {
///     "topic": "kline.1.BTCUSDT",
///     "type": "snapshot",
///     "ts": 1672324988882,
///     "data": [{
///         "start": 1672324800000,
///         "end": 1672324859999,
///         "interval": "1",
///         "open": "16649.5",
///         "close": "16677.0",
///         "high": "16677.0",
///         "low": "16608.0",
///         "volume": "2.081",
///         "turnover": "34666.4",
///         "confirm": false,
///         "timestamp": 1672324988882
///     }]
/// }
/// ```
#[derive(Clone, Debug, Deserialize)]
struct BybitKlineMessage {
    #[allow(dead_code)]
    topic: String,
    data: Vec<BybitKline>,
}

#[derive(Clone, Debug, Deserialize)]
struct BybitKline {
    /// Bucket open time in epoch milliseconds.
    start: i64,
    #[serde(with = "rust_decimal::serde::str")]
    open: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    close: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    volume: Decimal,
    confirm: bool,
}

impl From<BybitKline> for Candle {
    fn from(kline: BybitKline) -> Self {
        Candle {
            time: kline.start / 1_000,
            open: kline.open,
            high: kline.high,
            low: kline.low,
            close: kline.close,
            volume: kline.volume,
            closed: kline.confirm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bybit_decode() {
        struct TestCase {
            input: &'static str,
            expected: Decoded,
        }

        let tests = vec![
            TestCase {
                // TC0: subscribe acknowledgement
                input: r#"{"success": true, "ret_msg": "", "conn_id": "c1", "op": "subscribe"}"#,
                expected: Decoded::SubscriptionConfirmed,
            },
            TestCase {
                // TC1: explicit rejection
                input: r#"{"success": false, "ret_msg": "Invalid topic", "conn_id": "c1", "op": "subscribe"}"#,
                expected: Decoded::SubscriptionFailed("Invalid topic".to_string()),
            },
            TestCase {
                // TC2: heartbeat reply
                input: r#"{"success": true, "ret_msg": "pong", "conn_id": "c1", "op": "ping"}"#,
                expected: Decoded::KeepAliveResponse,
            },
            TestCase {
                // TC3: open-bucket kline update
                input: r#"{
                    "topic": "kline.1.BTCUSDT",
                    "type": "snapshot",
                    "ts": 1672324988882,
                    "data": [{
                        "start": 1672324800000,
                        "end": 1672324859999,
                        "interval": "1",
                        "open": "16649.5",
                        "close": "16677.0",
                        "high": "16677.0",
                        "low": "16608.0",
                        "volume": "2.081",
                        "turnover": "34666.4",
                        "confirm": false,
                        "timestamp": 1672324988882
                    }]
                }"#,
                expected: Decoded::Candles(vec![Candle::new(
                    1672324800,
                    dec!(16649.5),
                    dec!(16677.0),
                    dec!(16608.0),
                    dec!(16677.0),
                    dec!(2.081),
                    false,
                )]),
            },
            TestCase {
                // TC4: binary frame
                input: "",
                expected: Decoded::Unrecognized,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Bybit.decode(&WsMessage::text(test.input), MarketType::Futures);
            assert_eq!(actual, test.expected, "TC{index} failed");
        }
    }

    #[test]
    fn test_bybit_subscribe_message() {
        let message = Bybit
            .subscribe_message("BTCUSDT", Interval::M1, MarketType::Spot)
            .expect("supported interval");
        let WsMessage::Text(text) = message else {
            panic!("expected text frame");
        };

        let value: serde_json::Value = serde_json::from_str(text.as_str()).expect("valid json");
        assert_eq!(value["op"], "subscribe");
        assert_eq!(value["args"][0], "kline.1.BTCUSDT");
    }

    #[test]
    fn test_bybit_url_by_market() {
        assert!(
            Bybit
                .url(MarketType::Spot)
                .expect("valid url")
                .as_str()
                .ends_with("/spot")
        );
        assert!(
            Bybit
                .url(MarketType::Futures)
                .expect("valid url")
                .as_str()
                .ends_with("/linear")
        );
    }
}
