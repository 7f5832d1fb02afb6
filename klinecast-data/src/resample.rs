//! Deterministic synthesis of sub-minute candles from 1-minute data.
//!
//! No supported exchange streams 1s/5s/15s klines, so charting at those resolutions requires
//! deriving them locally. [`resample`] splits one 1-minute candle into `60 / span` synthetic
//! candles whose endpoints, range and total volume reproduce the parent exactly. The interior
//! price path is a seeded random walk: a display-fidelity heuristic, not a reconstruction,
//! and fully deterministic so re-resampling identical input yields identical output.

use crate::{error::DataError, event::Candle};
use itertools::Itertools;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use std::fmt;

/// Width of one synthetic sub-minute candle.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SubMinuteSpan {
    S1,
    S5,
    S15,
}

impl SubMinuteSpan {
    pub const fn secs(self) -> i64 {
        match self {
            SubMinuteSpan::S1 => 1,
            SubMinuteSpan::S5 => 5,
            SubMinuteSpan::S15 => 15,
        }
    }

    /// Number of synthetic candles one parent minute yields.
    pub const fn count(self) -> usize {
        (60 / self.secs()) as usize
    }
}

impl fmt::Display for SubMinuteSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.secs())
    }
}

/// Split `parent` into `60 / span` contiguous synthetic candles covering
/// `[parent.time, parent.time + 60)`.
///
/// Guarantees, for any valid parent:
/// - first `open` == parent `open`, last `close` == parent `close`
/// - parent `high`/`low` are each attained by a designated sub-candle
/// - volumes sum exactly to the parent volume
/// - `closed` is true only on the last sub-candle, and only if the parent is closed
/// - every sub-candle satisfies the OHLC ordering invariant
/// - output is a pure function of `(parent, span)`
///
/// An invalid parent is rejected rather than resampled.
pub fn resample(parent: &Candle, span: SubMinuteSpan) -> Result<Vec<Candle>, DataError> {
    parent.validate()?;

    let n = span.count();
    let mut rng = SmallRng::seed_from_u64(walk_seed(parent.time, span));

    let boundaries = walk_boundaries(parent, n, &mut rng);
    let high_at = rng.random_range(0..n);
    let low_at = loop {
        // n >= 4, so a distinct index always exists
        let candidate = rng.random_range(0..n);
        if candidate != high_at {
            break candidate;
        }
    };
    let volumes = split_volume(parent.volume, n);

    let candles = boundaries
        .iter()
        .tuple_windows()
        .enumerate()
        .map(|(index, (&open, &close))| {
            let high = if index == high_at {
                parent.high
            } else {
                open.max(close)
            };
            let low = if index == low_at {
                parent.low
            } else {
                open.min(close)
            };

            Candle {
                time: parent.time + index as i64 * span.secs(),
                open,
                high,
                low,
                close,
                volume: volumes[index],
                closed: parent.closed && index == n - 1,
            }
        })
        .collect();

    Ok(candles)
}

/// Seed mixing the parent bucket start and target span, so identical input reproduces an
/// identical path while neighbouring buckets and spans diverge.
fn walk_seed(time: i64, span: SubMinuteSpan) -> u64 {
    (time as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(span.secs() as u64)
}

/// Generate the `n + 1` boundary prices of the synthetic path.
///
/// Endpoints are the exact parent open/close. Interior boundaries drift linearly between
/// them with seeded noise, clamped strictly inside the parent range (when representable at
/// the parent's price scale) so the designated high/low sub-candles attain the extremes
/// unambiguously.
fn walk_boundaries(parent: &Candle, n: usize, rng: &mut SmallRng) -> Vec<Decimal> {
    let scale = parent
        .open
        .scale()
        .max(parent.high.scale())
        .max(parent.low.scale())
        .max(parent.close.scale());

    let tick = Decimal::new(1, scale);
    let (floor, ceil) = if parent.low + tick <= parent.high - tick {
        (parent.low + tick, parent.high - tick)
    } else {
        (parent.low, parent.high)
    };

    let open = parent.open.to_f64().unwrap_or(0.0);
    let close = parent.close.to_f64().unwrap_or(0.0);
    let range = parent.high.to_f64().unwrap_or(0.0) - parent.low.to_f64().unwrap_or(0.0);

    let mut boundaries = Vec::with_capacity(n + 1);
    boundaries.push(parent.open);
    for step in 1..n {
        let drift = open + (close - open) * step as f64 / n as f64;
        let noise = (rng.random::<f64>() - 0.5) * range * 0.5;
        let price = Decimal::from_f64_retain(drift + noise)
            .unwrap_or(parent.close)
            .round_dp(scale)
            .clamp(floor, ceil);
        boundaries.push(price);
    }
    boundaries.push(parent.close);

    boundaries
}

/// Split `volume` into `n` non-negative slices summing exactly to `volume`.
///
/// Slices are `volume / n` truncated to the parent's scale; the truncation remainder is
/// folded into the final slice.
fn split_volume(volume: Decimal, n: usize) -> Vec<Decimal> {
    let scale = volume.scale();
    let slice = (volume / Decimal::from(n as u64))
        .round_dp_with_strategy(scale, RoundingStrategy::ToZero);

    let mut volumes = vec![slice; n];
    volumes[n - 1] = volume - slice * Decimal::from(n as u64 - 1);
    volumes
}
