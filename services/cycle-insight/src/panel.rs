use serde::{Deserialize, Serialize};

use crate::cycle::{MIN_CANDLES, WINDOW_DAYS};
use crate::indicators::{
    compute_ema, consecutive_days_above, max_drawdown, max_run_up, point_gain, round2,
    volume_ratio, EMA_PERIOD,
};
use crate::types::Candle;

const GAIN_TARGET_PCT: f64 = 20.0;
const HEALTHY_DRAWDOWN_PCT: f64 = 15.0;
const AMPLIFYING_VOLUME_PCT: f64 = 20.0;

/// Dashboard metrics shown next to the cycle verdict
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelMetrics {
    pub ema_distance: f64,
    pub consecutive_above: u32,
    /// Largest low-to-later-high run-up in the last 30 candles, percent
    pub max_gain_30d: f64,
    pub max_drawdown_30d: f64,
    /// 5D over 20D mean volume, as percent change
    pub volume_trend: f64,
    pub change_7d: f64,
    pub gain_target_met: bool,
    pub drawdown_healthy: bool,
    pub volume_amplifying: bool,
}

impl PanelMetrics {
    /// `None` below the minimum history the classifier needs
    pub fn compute(candles: &[Candle], current_price: f64) -> Option<Self> {
        if candles.len() < MIN_CANDLES {
            return None;
        }

        let ema = compute_ema(candles, EMA_PERIOD);
        let last_ema = ema
            .last()
            .map(|p| p.ema)
            .filter(|v| *v != 0.0)
            .or_else(|| candles.last().map(|c| c.close))?;

        let window = &candles[candles.len() - WINDOW_DAYS..];
        let max_gain_30d = max_run_up(window) * 100.0;
        let max_drawdown_30d = max_drawdown(window) * 100.0;
        let volume_trend = (volume_ratio(candles) - 1.0) * 100.0;

        Some(Self {
            ema_distance: round2((current_price - last_ema) / last_ema * 100.0),
            consecutive_above: consecutive_days_above(candles, &ema),
            max_gain_30d: round2(max_gain_30d),
            max_drawdown_30d: round2(max_drawdown_30d),
            volume_trend: round2(volume_trend),
            change_7d: round2(point_gain(candles, current_price, 7)),
            gain_target_met: max_gain_30d >= GAIN_TARGET_PCT,
            drawdown_healthy: max_drawdown_30d <= HEALTHY_DRAWDOWN_PCT,
            volume_amplifying: volume_trend > AMPLIFYING_VOLUME_PCT,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{candle, series};

    #[test]
    fn test_requires_minimum_history() {
        let candles = series(&[100.0; 34]);
        assert!(PanelMetrics::compute(&candles, 100.0).is_none());
    }

    #[test]
    fn test_flat_market() {
        let candles = series(&[100.0; 40]);
        let metrics = PanelMetrics::compute(&candles, 100.0).unwrap();

        assert_eq!(metrics.ema_distance, 0.0);
        assert_eq!(metrics.consecutive_above, 0);
        assert_eq!(metrics.max_gain_30d, 0.0);
        assert_eq!(metrics.max_drawdown_30d, 0.0);
        assert_eq!(metrics.volume_trend, 0.0);
        assert_eq!(metrics.change_7d, 0.0);
        assert!(!metrics.gain_target_met);
        assert!(metrics.drawdown_healthy);
        assert!(!metrics.volume_amplifying);
    }

    #[test]
    fn test_rally_with_volume() {
        // 35 flat days at 100, then 5 days at 130 on double volume
        let mut candles: Vec<Candle> = (0..35).map(|i| candle(i, 100.0, 1000.0)).collect();
        candles.extend((35..40).map(|i| candle(i, 130.0, 2000.0)));

        let metrics = PanelMetrics::compute(&candles, 130.0).unwrap();

        assert_eq!(metrics.max_gain_30d, 30.0);
        assert!(metrics.gain_target_met);
        assert_eq!(metrics.max_drawdown_30d, 0.0);
        // 5D mean 2000 over 20D mean 1250
        assert_eq!(metrics.volume_trend, 60.0);
        assert!(metrics.volume_amplifying);
        assert_eq!(metrics.consecutive_above, 5);
        assert_eq!(metrics.change_7d, 30.0);
        assert!(metrics.ema_distance > 0.0);
    }

    #[test]
    fn test_deep_drawdown_is_flagged() {
        let mut closes = vec![100.0; 20];
        closes.extend([120.0; 5]);
        closes.extend([96.0; 15]);
        let candles = series(&closes);

        let metrics = PanelMetrics::compute(&candles, 96.0).unwrap();
        assert_eq!(metrics.max_drawdown_30d, 20.0);
        assert!(!metrics.drawdown_healthy);
    }
}
