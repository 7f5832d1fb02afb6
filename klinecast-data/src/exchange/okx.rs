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
use std::{str::FromStr, time::Duration};
use url::Url;

/// [`Okx`] server base url. Candlestick channels are served by the `business` endpoint for
/// both spot and swap instruments.
///
/// See docs: <https://www.okx.com/docs-v5/en/#overview-api-resources-and-support>
pub const BASE_URL_OKX: &str = "wss://ws.okx.com:8443/ws/v5/business";

/// [`Okx`] keepalive period. The server drops connections idle for 30 seconds.
///
/// See docs: <https://www.okx.com/docs-v5/en/#overview-websocket-connect>
pub const PING_INTERVAL_OKX: Duration = Duration::from_secs(29);

/// [`Okx`] exchange.
///
/// See docs: <https://www.okx.com/docs-v5/en/#websocket-api>
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Okx;

impl Okx {
    /// Candle channel name, eg/ `candle1m`. Hour and day spans use upper-case suffixes.
    fn channel(interval: Interval) -> Result<&'static str, DataError> {
        match interval {
            Interval::M1 => Ok("candle1m"),
            Interval::M5 => Ok("candle5m"),
            Interval::M15 => Ok("candle15m"),
            Interval::M30 => Ok("candle30m"),
            Interval::H1 => Ok("candle1H"),
            Interval::H4 => Ok("candle4H"),
            Interval::D1 => Ok("candle1D"),
            other => Err(DataError::UnsupportedInterval {
                exchange: ExchangeId::Okx,
                interval: other,
            }),
        }
    }

    fn request(op: &str, wire_symbol: &str, interval: Interval) -> Result<WsMessage, DataError> {
        Ok(WsMessage::text(
            json!({
                "op": op,
                "args": [{
                    "channel": Self::channel(interval)?,
                    "instId": wire_symbol,
                }],
            })
            .to_string(),
        ))
    }
}

impl ProtocolTranslator for Okx {
    fn id(&self) -> ExchangeId {
        ExchangeId::Okx
    }

    fn url(&self, _market: MarketType) -> Result<Url, DataError> {
        Url::parse(BASE_URL_OKX).map_err(DataError::from)
    }

    fn subscribe_message(
        &self,
        wire_symbol: &str,
        interval: Interval,
        _market: MarketType,
    ) -> Result<WsMessage, DataError> {
        Self::request("subscribe", wire_symbol, interval)
    }

    fn unsubscribe_message(
        &self,
        wire_symbol: &str,
        interval: Interval,
        _market: MarketType,
    ) -> Result<WsMessage, DataError> {
        Self::request("unsubscribe", wire_symbol, interval)
    }

    fn decode(&self, message: &WsMessage, _market: MarketType) -> Decoded {
        let WsMessage::Text(text) = message else {
            return Decoded::Unrecognized;
        };

        if text.as_str() == "pong" {
            return Decoded::KeepAliveResponse;
        }

        match serde_json::from_str::<OkxMessage>(text.as_str()) {
            Ok(OkxMessage::Data(message)) => {
                let candles: Vec<Candle> = message
                    .data
                    .iter()
                    .filter_map(|row| row.to_candle())
                    .collect();
                if candles.is_empty() {
                    Decoded::Unrecognized
                } else {
                    Decoded::Candles(candles)
                }
            }
            Ok(OkxMessage::Event(event)) => match event.event.as_str() {
                "subscribe" => Decoded::SubscriptionConfirmed,
                "error" => Decoded::SubscriptionFailed(format!(
                    "code {}: {}",
                    event.code.unwrap_or_default(),
                    event.msg.unwrap_or_default()
                )),
                _ => Decoded::Unrecognized,
            },
            Err(_) => Decoded::Unrecognized,
        }
    }

    fn keep_alive(&self, _market: MarketType) -> Option<KeepAlive> {
        Some(KeepAlive {
            period: PING_INTERVAL_OKX,
            message: || WsMessage::text("ping"),
        })
    }
}

/// Messages received on an [`Okx`] candle stream.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum OkxMessage {
    Data(OkxCandleMessage),
    Event(OkxEvent),
}

/// Subscription lifecycle event, eg/ `{"event": "subscribe", "arg": {...}, "connId": ".."}`.
#[derive(Clone, Debug, Deserialize)]
struct OkxEvent {
    event: String,
    code: Option<String>,
    msg: Option<String>,
}

/// ### Raw Payload Examples
/// See docs: <https://www.okx.com/docs-v5/en/#websocket-api-public-channel-candlesticks-channel>
/// ```json
/// {
///     "arg": {"channel": "candle1m", "instId": "BTC-USDT"},
///     "data": [
///         ["1672515780000", "16568.1", "16574.0", "16567.9", "16573.4", "12.081", "200213.4", "200213.4", "0"]
///     ]
/// }
/// ```
#[derive(Clone, Debug, Deserialize)]
struct OkxCandleMessage {
    #[allow(dead_code)]
    arg: OkxArg,
    data: Vec<OkxCandleRow>,
}

#[derive(Clone, Debug, Deserialize)]
struct OkxArg {
    #[allow(dead_code)]
    channel: String,
    #[serde(rename = "instId")]
    #[allow(dead_code)]
    inst_id: String,
}

/// One candle row: `[ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]`, all strings,
/// timestamp in epoch milliseconds, `confirm` of `"1"` marking a closed bucket.
#[derive(Clone, Debug, Deserialize)]
struct OkxCandleRow(Vec<String>);

impl OkxCandleRow {
    fn to_candle(&self) -> Option<Candle> {
        let [ts, open, high, low, close, volume, ..] = self.0.as_slice() else {
            return None;
        };
        let confirm = self.0.get(8).is_some_and(|flag| flag == "1");

        Some(Candle {
            time: ts.parse::<i64>().ok()? / 1_000,
            open: Decimal::from_str(open).ok()?,
            high: Decimal::from_str(high).ok()?,
            low: Decimal::from_str(low).ok()?,
            close: Decimal::from_str(close).ok()?,
            volume: Decimal::from_str(volume).ok()?,
            closed: confirm,
        })
    }
}
