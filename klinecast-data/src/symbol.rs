//! Pure canonical-to-wire symbol mapping for every supported exchange.
//!
//! Canonical symbols are concatenated upper-case base and quote assets (eg/ `BTCUSDT`).
//! Each exchange applies a simple string transform on top; [`to_wire`] and [`from_wire`]
//! are self-inverse for every supported symbol. Nothing here performs I/O or holds state.

use crate::{error::DataError, exchange::ExchangeId, subscription::MarketType};
use smol_str::{SmolStr, format_smolstr};

/// Quote assets recognised when splitting a canonical symbol, longest spellings first so
/// eg/ `BTCTUSD` resolves to `TUSD` rather than `USD`.
const QUOTE_ASSETS: &[&str] = &[
    "FDUSD", "USDT", "USDC", "TUSD", "BUSD", "DAI", "BTC", "ETH", "BNB", "EUR", "USD",
];

/// Split a canonical symbol into `(base, quote)` using the known quote-asset table.
fn split_canonical(symbol: &str) -> Option<(&str, &str)> {
    QUOTE_ASSETS.iter().find_map(|quote| {
        symbol
            .strip_suffix(quote)
            .filter(|base| !base.is_empty())
            .map(|base| (base, *quote))
    })
}

/// Translate a canonical symbol into the given exchange's wire spelling.
///
/// Returns [`DataError::UnsupportedSymbol`] when the symbol cannot be split into a known
/// base/quote pair, rather than ever emitting a malformed subscription.
pub fn to_wire(
    exchange: ExchangeId,
    market: MarketType,
    symbol: &str,
) -> Result<SmolStr, DataError> {
    let canonical = symbol.to_uppercase();
    let (base, quote) = split_canonical(&canonical).ok_or_else(|| DataError::UnsupportedSymbol {
        exchange,
        symbol: SmolStr::new(&canonical),
    })?;

    Ok(match (exchange, market) {
        (ExchangeId::Binance | ExchangeId::Bybit | ExchangeId::Bitget, _) => SmolStr::new(&canonical),
        (ExchangeId::Okx, MarketType::Spot) => format_smolstr!("{base}-{quote}"),
        (ExchangeId::Okx, MarketType::Futures) => format_smolstr!("{base}-{quote}-SWAP"),
        (ExchangeId::Gate, _) => format_smolstr!("{base}_{quote}"),
        (ExchangeId::Mexc, MarketType::Spot) => SmolStr::new(&canonical),
        (ExchangeId::Mexc, MarketType::Futures) => format_smolstr!("{base}_{quote}"),
    })
}

/// Translate an exchange wire spelling back into canonical form.
///
/// Total over every spelling [`to_wire`] can produce, so the pair is self-inverse.
pub fn from_wire(exchange: ExchangeId, wire: &str) -> SmolStr {
    let upper = wire.to_uppercase();
    match exchange {
        ExchangeId::Binance | ExchangeId::Bybit | ExchangeId::Bitget => SmolStr::new(upper),
        ExchangeId::Okx => {
            let spot = upper.strip_suffix("-SWAP").unwrap_or(&upper);
            SmolStr::new(spot.replace('-', ""))
        }
        ExchangeId::Gate | ExchangeId::Mexc => SmolStr::new(upper.replace('_', "")),
    }
}
