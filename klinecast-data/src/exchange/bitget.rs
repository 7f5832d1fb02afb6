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

/// [`Bitget`] v2 public server base url, shared by spot and futures; the market is selected
/// per subscription via `instType`.
///
/// See docs: <https://www.bitget.com/api-doc/common/websocket-intro>
pub const BASE_URL_BITGET: &str = "wss://ws.bitget.com/v2/ws/public";

/// [`Bitget`] keepalive period. The server closes connections without a ping for 30 seconds.
///
/// See docs: <https://www.bitget.com/api-doc/common/websocket-intro>
pub const PING_INTERVAL_BITGET: Duration = Duration::from_secs(25);

/// [`Bitget`] exchange.
///
/// Candle rows carry no close-confirmation flag, so updates are emitted with
/// `closed: false` only.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Bitget;

impl Bitget {
    fn wire_channel(interval: Interval) -> Result<&'static str, DataError> {
        match interval {
            Interval::M1 => Ok("candle1m"),
            Interval::M5 => Ok("candle5m"),
            Interval::M15 => Ok("candle15m"),
            Interval::M30 => Ok("candle30m"),
            Interval::H1 => Ok("candle1H"),
            Interval::H4 => Ok("candle4H"),
            Interval::D1 => Ok("candle1D"),
            other => Err(DataError::UnsupportedInterval {
                exchange: ExchangeId::Bitget,
                interval: other,
            }),
        }
    }

    fn inst_type(market: MarketType) -> &'static str {
        match market {
            MarketType::Spot => "SPOT",
            MarketType::Futures => "USDT-FUTURES",
        }
    }

    fn request(
        op: &str,
        wire_symbol: &str,
        interval: Interval,
        market: MarketType,
    ) -> Result<WsMessage, DataError> {
        Ok(WsMessage::text(
            json!({
                "op": op,
                "args": [{
                    "instType": Self::inst_type(market),
                    "channel": Self::wire_channel(interval)?,
                    "instId": wire_symbol,
                }],
            })
            .to_string(),
        ))
    }
}

impl ProtocolTranslator for Bitget {
    fn id(&self) -> ExchangeId {
        ExchangeId::Bitget
    }

    fn url(&self, _market: MarketType) -> Result<Url, DataError> {
        Url::parse(BASE_URL_BITGET).map_err(DataError::from)
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

        if text.as_str() == "pong" {
            return Decoded::KeepAliveResponse;
        }

        match serde_json::from_str::<BitgetMessage>(text.as_str()) {
            Ok(BitgetMessage::Data(message)) => {
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
            Ok(BitgetMessage::Event(event)) => match event.event.as_str() {
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
            period: PING_INTERVAL_BITGET,
            message: || WsMessage::text("ping"),
        })
    }
}

/// Messages received on a [`Bitget`] candle stream.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum BitgetMessage {
    Data(BitgetCandleMessage),
    Event(BitgetEvent),
}

#[derive(Clone, Debug, Deserialize)]
struct BitgetEvent {
    event: String,
    code: Option<i64>,
    msg: Option<String>,
}

/// ### Raw Payload Examples
/// See docs: <https://www.bitget.com/api-doc/spot/websocket/public/Candlesticks-Channel>
/// ```json
/// {
///     "action": "update",
///     "arg": {"instType": "SPOT", "channel": "candle1m", "instId": "BTCUSDT"},
///     "data": [["1695685500000", "27000.5", "27010.0", "26990.1", "27005.2", "0.75", "20250.0", "20250.0"]],
///     "ts": 1695685520183
/// }
/// ```
#[derive(Clone, Debug, Deserialize)]
struct BitgetCandleMessage {
    #[allow(dead_code)]
    action: String,
    #[allow(dead_code)]
    arg: BitgetArg,
    data: Vec<BitgetCandleRow>,
}

#[derive(Clone, Debug, Deserialize)]
struct BitgetArg {
    #[serde(rename = "instType")]
    #[allow(dead_code)]
    inst_type: String,
    #[allow(dead_code)]
    channel: String,
    #[serde(rename = "instId")]
    #[allow(dead_code)]
    inst_id: String,
}

/// One candle row: `[ts, o, h, l, c, baseVol, ..]`, timestamp in epoch milliseconds.
#[derive(Clone, Debug, Deserialize)]
struct BitgetCandleRow(Vec<String>);

impl BitgetCandleRow {
    fn to_candle(&self) -> Option<Candle> {
        let [ts, open, high, low, close, volume, ..] = self.0.as_slice() else {
            return None;
        };

        Some(Candle {
            time: ts.parse::<i64>().ok()? / 1_000,
            open: Decimal::from_str(open).ok()?,
            high: Decimal::from_str(high).ok()?,
            low: Decimal::from_str(low).ok()?,
            close: Decimal::from_str(close).ok()?,
            volume: Decimal::from_str(volume).ok()?,
            closed: false,
        })
    }
}
