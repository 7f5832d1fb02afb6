use crate::{exchange::ExchangeId, subscription::Interval};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;
use thiserror::Error;

/// All errors generated in `klinecast-data`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error)]
pub enum DataError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("subscription rejected by exchange: {0}")]
    SubscriptionRejected(String),

    #[error("subscription confirmation timed out after {0:?}")]
    ConfirmationTimeout(Duration),

    #[error("reconnect ceiling of {ceiling} consecutive attempts exceeded")]
    ReconnectCeilingExceeded { ceiling: u32 },

    #[error("unsupported symbol for {exchange}: {symbol}")]
    UnsupportedSymbol {
        exchange: ExchangeId,
        symbol: SmolStr,
    },

    #[error("unsupported interval for {exchange}: {interval}")]
    UnsupportedInterval {
        exchange: ExchangeId,
        interval: Interval,
    },

    #[error("invalid candle: {0}")]
    InvalidCandle(String),

    #[error("failed to parse url: {0}")]
    UrlParse(String),
}

impl DataError {
    /// Determine if an error can be recovered from by re-initialising the connection.
    ///
    /// Recoverable errors drive a [`Session`](crate::session) into `Reconnecting`; everything
    /// else is either terminal or handled locally without touching the connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DataError::Transport(_)
                | DataError::ConfirmationTimeout(_)
                | DataError::SubscriptionRejected(_)
        )
    }
}

impl From<url::ParseError> for DataError {
    fn from(error: url::ParseError) -> Self {
        Self::UrlParse(error.to_string())
    }
}
