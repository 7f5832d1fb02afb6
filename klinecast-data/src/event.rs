use crate::{error::DataError, subscription::SubscriptionKey};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normalised candlestick for one fixed time bucket.
///
/// `time` is the unix-second bucket start, aligned to the candle's interval. Open buckets are
/// emitted repeatedly with `closed: false` and finalised by at most one `closed: true` update;
/// some venues never confirm closure.
#[derive(Clone, Eq, PartialEq, Debug, Constructor, Deserialize, Serialize)]
pub struct Candle {
    pub time: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    pub closed: bool,
}

impl Candle {
    /// Check the OHLC ordering and volume invariants.
    ///
    /// Exchange feeds occasionally produce torn rows mid-bucket; anything failing this check is
    /// dropped at the decode boundary rather than propagated to consumers or the resampler.
    pub fn validate(&self) -> Result<(), DataError> {
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);

        if self.low > body_low || body_high > self.high {
            return Err(DataError::InvalidCandle(format!(
                "ohlc out of order: o={} h={} l={} c={}",
                self.open, self.high, self.low, self.close
            )));
        }

        if self.volume < Decimal::ZERO {
            return Err(DataError::InvalidCandle(format!(
                "negative volume: {}",
                self.volume
            )));
        }

        Ok(())
    }
}

/// Event delivered on every [`Subscription`](crate::subscription::Subscription) stream.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub enum StreamEvent {
    /// Normalised candle update for the subscribed key.
    Candle {
        key: SubscriptionKey,
        candle: Candle,
    },
    /// Terminal notification: the backing session exceeded its reconnect ceiling and will not
    /// be retried. No further events follow.
    Abandoned { key: SubscriptionKey, reason: DataError },
}
