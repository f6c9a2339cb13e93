// Indicator library: EMA and the rolling-window statistics used by the cycle classifier
use crate::types::{Candle, EmaPoint};

/// EMA period used for the cycle overlay (EMA15)
pub const EMA_PERIOD: usize = 15;

/// Exponential moving average over candle closes.
///
/// The first point is seeded with the first close (no SMA warm-up), so the
/// output always has the same length and timestamps as the input. Fewer than
/// `period` candles still produce a value per candle.
pub fn compute_ema(candles: &[Candle], period: usize) -> Vec<EmaPoint> {
    let Some(first) = candles.first() else {
        return Vec::new();
    };

    let k = 2.0 / (period as f64 + 1.0);
    let mut prev_ema = first.close;
    let mut points = Vec::with_capacity(candles.len());
    points.push(EmaPoint {
        time: first.time,
        ema: first.close,
    });

    for candle in &candles[1..] {
        let ema = candle.close * k + prev_ema * (1.0 - k);
        points.push(EmaPoint {
            time: candle.time,
            ema,
        });
        prev_ema = ema;
    }

    points
}

/// Largest low-to-later-high gain in the window, as a ratio.
///
/// Every (entry, exit) pair with entry <= exit is checked.
pub fn max_run_up(window: &[Candle]) -> f64 {
    let mut max_run_up = 0.0;
    for (i, entry) in window.iter().enumerate() {
        if entry.low <= 0.0 {
            continue;
        }
        for exit in &window[i..] {
            let run_up = (exit.high - entry.low) / entry.low;
            if run_up > max_run_up {
                max_run_up = run_up;
            }
        }
    }
    max_run_up
}

/// Largest peak-to-trough decline in the window, as a ratio.
///
/// The peak tracks `high`, the trough is each candle's `low`.
pub fn max_drawdown(window: &[Candle]) -> f64 {
    let Some(first) = window.first() else {
        return 0.0;
    };

    let mut peak = first.high;
    let mut max_drawdown = 0.0;
    for candle in window {
        if candle.high > peak {
            peak = candle.high;
        }
        if peak <= 0.0 {
            continue;
        }
        let drawdown = (peak - candle.low) / peak;
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
        }
    }
    max_drawdown
}

/// Mean volume of the last 5 candles over the mean of the last 20.
///
/// Means always divide by 5 and 20; returns 1.0 when the 20-candle mean is zero.
pub fn volume_ratio(candles: &[Candle]) -> f64 {
    let avg_5 = trailing_volume_sum(candles, 5) / 5.0;
    let avg_20 = trailing_volume_sum(candles, 20) / 20.0;
    if avg_20 > 0.0 {
        avg_5 / avg_20
    } else {
        1.0
    }
}

fn trailing_volume_sum(candles: &[Candle], n: usize) -> f64 {
    let start = candles.len().saturating_sub(n);
    candles[start..].iter().map(Candle::volume_or_zero).sum()
}

/// Percent change from the close `lookback` candles before the last one to `current_price`.
///
/// With fewer than `lookback + 1` candles the reference is `current_price`
/// itself and the gain is 0.
pub fn point_gain(candles: &[Candle], current_price: f64, lookback: usize) -> f64 {
    let reference = candles
        .len()
        .checked_sub(lookback + 1)
        .map(|idx| candles[idx].close)
        .filter(|close| *close > 0.0)
        .unwrap_or(current_price);

    if reference <= 0.0 || !reference.is_finite() {
        return 0.0;
    }
    (current_price - reference) / reference * 100.0
}

/// Number of trailing candles that closed strictly above their EMA
pub fn consecutive_days_above(candles: &[Candle], ema: &[EmaPoint]) -> u32 {
    let mut count = 0;
    for (idx, candle) in candles.iter().enumerate().rev() {
        match ema.get(idx) {
            Some(point) if candle.close > point.ema => count += 1,
            _ => break,
        }
    }
    count
}

/// Stretches of closes below the EMA inside a window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EmaBreaks {
    /// Longest run of consecutive closes below the EMA
    pub max_days_below: u32,
    /// Deepest `(ema - close) / ema` seen
    pub max_break_depth: f64,
}

/// Scan `candles` against the aligned `ema` slice for closes below the EMA
pub fn ema_breaks(candles: &[Candle], ema: &[EmaPoint]) -> EmaBreaks {
    let mut breaks = EmaBreaks::default();
    let mut run = 0;

    for (candle, point) in candles.iter().zip(ema) {
        if candle.close < point.ema {
            run += 1;
            breaks.max_days_below = breaks.max_days_below.max(run);
            if point.ema > 0.0 {
                let depth = (point.ema - candle.close) / point.ema;
                if depth > breaks.max_break_depth {
                    breaks.max_break_depth = depth;
                }
            }
        } else {
            run = 0;
        }
    }

    breaks
}

/// Round to 2 decimals for display
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
