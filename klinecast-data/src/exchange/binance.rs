use super::{Decoded, ExchangeId, ProtocolTranslator};
use crate::{
    error::DataError,
    event::Candle,
    subscription::{Interval, MarketType},
    transport::WsMessage,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

/// [`Binance`] spot server base url.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams>
pub const BASE_URL_BINANCE_SPOT: &str = "wss://stream.binance.com:9443/ws";

/// [`Binance`] USD-margined futures server base url.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams>
pub const BASE_URL_BINANCE_FUTURES: &str = "wss://fstream.binance.com/ws";

/// [`Binance`] exchange.
///
/// Requires no application-level keepalive: the server pings and the transport layer pongs.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Binance;

impl Binance {
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
                exchange: ExchangeId::Binance,
                interval: other,
            }),
        }
    }

    /// Stream name of the form `btcusdt@kline_1m`.
    fn stream_name(wire_symbol: &str, interval: Interval) -> Result<String, DataError> {
        Ok(format!(
            "{}@kline_{}",
            wire_symbol.to_lowercase(),
            Self::wire_interval(interval)?
        ))
    }

    fn request(method: &str, stream: String) -> WsMessage {
        WsMessage::text(
            json!({
                "method": method,
                "params": [stream],
                "id": 1,
            })
            .to_string(),
        )
    }
}

impl ProtocolTranslator for Binance {
    fn id(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    fn url(&self, market: MarketType) -> Result<Url, DataError> {
        let base = match market {
            MarketType::Spot => BASE_URL_BINANCE_SPOT,
            MarketType::Futures => BASE_URL_BINANCE_FUTURES,
        };
        Url::parse(base).map_err(DataError::from)
    }

    fn subscribe_message(
        &self,
        wire_symbol: &str,
        interval: Interval,
        _market: MarketType,
    ) -> Result<WsMessage, DataError> {
        Ok(Self::request("SUBSCRIBE", Self::stream_name(wire_symbol, interval)?))
    }

    fn unsubscribe_message(
        &self,
        wire_symbol: &str,
        interval: Interval,
        _market: MarketType,
    ) -> Result<WsMessage, DataError> {
        Ok(Self::request("UNSUBSCRIBE", Self::stream_name(wire_symbol, interval)?))
    }

    fn decode(&self, message: &WsMessage, _market: MarketType) -> Decoded {
        let WsMessage::Text(text) = message else {
            return Decoded::Unrecognized;
        };

        match serde_json::from_str::<BinanceMessage>(text.as_str()) {
            Ok(BinanceMessage::Kline(event)) => Decoded::Candles(vec![event.kline.into()]),
            Ok(BinanceMessage::Error(response)) => Decoded::SubscriptionFailed(format!(
                "code {}: {}",
                response.error.code, response.error.msg
            )),
            Ok(BinanceMessage::Ack(_)) => Decoded::SubscriptionConfirmed,
            Err(_) => Decoded::Unrecognized,
        }
    }
}

/// Messages received on a [`Binance`] kline stream.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum BinanceMessage {
    Kline(BinanceKlineEvent),
    Error(BinanceErrorResponse),
    Ack(BinanceAck),
}

/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams#klinecandlestick-streams>
/// ```json
/// {
///     "e": "kline",
///     "E": 1672515782136,
///     "s": "BTCUSDT",
///     "k": {
///         "t": 1672515780000,
///         "T": 1672515839999,
///         "s": "BTCUSDT",
///         "i": "1m",
///         "o": "16568.10",
///         "c": "16573.42",
///         "h": "16574.00",
///         "l": "16567.90",
///         "v": "12.081",
///         "x": false
///     }
/// }
/// ```
#[derive(Clone, Debug, Deserialize, Serialize)]
struct BinanceKlineEvent {
    #[serde(rename = "e")]
    #[allow(dead_code)]
    event_type: String,
    #[serde(rename = "s")]
    #[allow(dead_code)]
    symbol: String,
    #[serde(rename = "k")]
    kline: BinanceKline,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct BinanceKline {
    /// Bucket open time in epoch milliseconds.
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "o", with = "rust_decimal::serde::str")]
    open: Decimal,
    #[serde(rename = "h", with = "rust_decimal::serde::str")]
    high: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    low: Decimal,
    #[serde(rename = "c", with = "rust_decimal::serde::str")]
    close: Decimal,
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    volume: Decimal,
    #[serde(rename = "x")]
    is_closed: bool,
}

impl From<BinanceKline> for Candle {
    fn from(kline: BinanceKline) -> Self {
        Candle {
            time: kline.open_time / 1_000,
            open: kline.open,
            high: kline.high,
            low: kline.low,
            close: kline.close,
            volume: kline.volume,
            closed: kline.is_closed,
        }
    }
}

/// Acknowledgement of a `SUBSCRIBE`/`UNSUBSCRIBE` request, eg/ `{"result": null, "id": 1}`.
#[derive(Clone, Debug, Deserialize)]
struct BinanceAck {
    #[allow(dead_code)]
    id: u64,
    #[allow(dead_code)]
    result: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize)]
struct BinanceErrorResponse {
    error: BinanceError,
}

#[derive(Clone, Debug, Deserialize)]
struct BinanceError {
    code: i64,
    msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_binance_decode() {
        struct TestCase {
            input: &'static str,
            expected: Decoded,
        }

        let tests = vec![
            TestCase {
                // TC0: subscribe acknowledgement
                input: r#"{"result": null, "id": 1}"#,
                expected: Decoded::SubscriptionConfirmed,
            },
            TestCase {
                // TC1: explicit rejection
                input: r#"{"error": {"code": 2, "msg": "Invalid request"}, "id": 1}"#,
                expected: Decoded::SubscriptionFailed("code 2: Invalid request".to_string()),
            },
            TestCase {
                // TC2: open-bucket kline update
                input: r#"{
                    "e": "kline",
                    "E": 1672515782136,
                    "s": "BTCUSDT",
                    "k": {
                        "t": 1672515780000,
                        "T": 1672515839999,
                        "s": "BTCUSDT",
                        "i": "1m",
                        "f": 100,
                        "L": 200,
                        "o": "16568.10",
                        "c": "16573.42",
                        "h": "16574.00",
                        "l": "16567.90",
                        "v": "12.081",
                        "n": 85,
                        "x": false,
                        "q": "200213.45",
                        "V": "6.02",
                        "Q": "99765.12",
                        "B": "0"
                    }
                }"#,
                expected: Decoded::Candles(vec![Candle::new(
                    1672515780,
                    dec!(16568.10),
                    dec!(16574.00),
                    dec!(16567.90),
                    dec!(16573.42),
                    dec!(12.081),
                    false,
                )]),
            },
            TestCase {
                // TC3: unrelated frame
                input: r#"{"stream": "btcusdt@depth", "data": {}}"#,
                expected: Decoded::Unrecognized,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Binance.decode(&WsMessage::text(test.input), MarketType::Futures);
            assert_eq!(actual, test.expected, "TC{index} failed");
        }
    }

    #[test]
    fn test_binance_subscribe_message() {
        let message = Binance
            .subscribe_message("BTCUSDT", Interval::M1, MarketType::Futures)
            .expect("supported interval");
        let WsMessage::Text(text) = message else {
            panic!("expected text frame");
        };

        let value: serde_json::Value = serde_json::from_str(text.as_str()).expect("valid json");
        assert_eq!(value["method"], "SUBSCRIBE");
        assert_eq!(value["params"][0], "btcusdt@kline_1m");
    }

    #[test]
    fn test_binance_url_by_market() {
        assert!(
            Binance
                .url(MarketType::Spot)
                .expect("valid url")
                .as_str()
                .contains("stream.binance.com")
        );
        assert!(
            Binance
                .url(MarketType::Futures)
                .expect("valid url")
                .as_str()
                .contains("fstream.binance.com")
        );
    }

    #[test]
    fn test_binance_rejects_sub_minute_wire_interval() {
        assert!(matches!(
            Binance.subscribe_message("BTCUSDT", Interval::S15, MarketType::Spot),
            Err(DataError::UnsupportedInterval { .. })
        ));
    }
}
