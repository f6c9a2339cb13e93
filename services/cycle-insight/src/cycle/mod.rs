//! Cycle Classifier - 100-day cycle stage labelling
//!
//! Maps the indicator library output for a daily candle series onto one of
//! four lifecycle stages:
//! - Observation: an early breakout above EMA15 that is still being tested
//! - Confirmation: a sustained single-sided rise (30+ days above EMA15)
//! - Warning: a mature run (70+ days) approaching the end of the cycle
//! - Rest: no qualifying run
//!
//! The classifier is a pure function of its inputs. It never fails: short
//! series yield the fixed insufficient-data result.

use serde::{Deserialize, Serialize};

use crate::indicators::{
    compute_ema, consecutive_days_above, ema_breaks, max_drawdown, point_gain, round2,
    volume_ratio, EmaBreaks, EMA_PERIOD,
};
use crate::types::{Candle, MarketStats};

/// Minimum candles needed for a classification
pub const MIN_CANDLES: usize = 35;
/// Trailing window for drawdown and EMA break statistics
pub const WINDOW_DAYS: usize = 30;
/// Volume ratio above which volume counts as expanding
pub const VOLUME_EXPANSION_RATIO: f64 = 1.2;

/// Lifecycle stage of the 100-day pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStage {
    Observation,
    Confirmation,
    Warning,
    Rest,
}

impl CycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStage::Observation => "observation",
            CycleStage::Confirmation => "confirmation",
            CycleStage::Warning => "warning",
            CycleStage::Rest => "rest",
        }
    }
}

/// Boolean qualifiers behind the stage decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleCriteria {
    /// Current price above the latest EMA15
    pub ema_breakout: bool,
    /// No significant break below EMA15 over the trailing window
    pub single_sided_rise: bool,
    /// 5-day volume mean above 1.2x the 20-day mean
    pub volume_expansion: bool,
    /// Trailing closes above EMA15
    pub consecutive_days: u32,
}

impl CycleCriteria {
    /// Count of satisfied qualifiers, 0..=4
    pub fn score(&self) -> u8 {
        [
            self.ema_breakout,
            self.single_sided_rise,
            self.volume_expansion,
            self.consecutive_days > 10,
        ]
        .iter()
        .filter(|met| **met)
        .count() as u8
    }
}

/// Continuous values backing the criteria, rounded to 2 decimals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleMetrics {
    /// Percent distance of the current price from EMA15
    pub ema_distance: f64,
    /// Max drawdown over the trailing window, percent
    pub max_drawdown: f64,
    pub volume_ratio: f64,
    pub gain_7d: f64,
    pub gain_30d: f64,
}

/// Classifier output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleAnalysis {
    pub stage: CycleStage,
    /// Confidence, 0..=100
    pub probability: u8,
    /// Consecutive qualifying days, 0 for `Rest`
    pub days_in_cycle: u32,
    pub criteria: CycleCriteria,
    #[serde(default)]
    pub criteria_score: u8,
    pub metrics: CycleMetrics,
}

impl CycleAnalysis {
    /// Fixed result for series shorter than `MIN_CANDLES`
    pub fn insufficient_data() -> Self {
        Self {
            stage: CycleStage::Rest,
            probability: 0,
            days_in_cycle: 0,
            criteria: CycleCriteria::default(),
            criteria_score: 0,
            metrics: CycleMetrics::default(),
        }
    }
}

/// Single-sided rise tolerance ladder: shorter breaks below EMA15 may be deeper
pub fn is_single_sided_rise(breaks: &EmaBreaks) -> bool {
    let days = breaks.max_days_below;
    let depth = breaks.max_break_depth;

    days <= 3 || (days <= 7 && depth < 0.08) || (days <= 5 && depth < 0.12)
}

/// Stage decision table, first match wins
///
/// Returns (stage, probability, days in cycle).
pub fn decide_stage(
    score: u8,
    consecutive_days: u32,
    gain_30d: f64,
    ema_distance: f64,
) -> (CycleStage, u8, u32) {
    let score = u32::from(score);

    if score >= 3 && consecutive_days >= 70 {
        let bonus = if gain_30d > 50.0 { 20 } else { 0 };
        let probability = (60 + (consecutive_days - 70).saturating_mul(2) + bonus).min(95);
        return (CycleStage::Warning, probability as u8, consecutive_days);
    }

    if score >= 3 && consecutive_days >= 30 {
        let bonus = if gain_30d > 20.0 { 15 } else { 0 };
        let probability = (40 + score * 10 + bonus).min(85);
        return (CycleStage::Confirmation, probability as u8, consecutive_days);
    }

    if score >= 2 && consecutive_days >= 5 {
        let bonus = if ema_distance > 5.0 { 10 } else { 0 };
        let probability = (20 + score * 8 + bonus).min(60);
        return (CycleStage::Observation, probability as u8, consecutive_days);
    }

    let probability = 90i32.saturating_sub(score as i32 * 15).max(70);
    (CycleStage::Rest, probability as u8, 0)
}

/// Classify the current cycle stage from daily candles and the live ticker.
///
/// `stats.current_price` is taken as "now"; the last candle is the most
/// recent completed day.
pub fn analyze_cycle_stage(stats: &MarketStats, candles: &[Candle]) -> CycleAnalysis {
    if candles.len() < MIN_CANDLES {
        return CycleAnalysis::insufficient_data();
    }

    let current_price = stats.current_price;
    let ema = compute_ema(candles, EMA_PERIOD);

    let last_ema = ema
        .last()
        .map(|p| p.ema)
        .filter(|v| *v > 0.0)
        .unwrap_or(candles[candles.len() - 1].close);
    let ema_breakout = current_price > last_ema;
    let ema_distance = if last_ema > 0.0 {
        (current_price - last_ema) / last_ema * 100.0
    } else {
        0.0
    };

    let consecutive_days = consecutive_days_above(candles, &ema);

    let window_start = candles.len() - WINDOW_DAYS;
    let window = &candles[window_start..];
    let drawdown = max_drawdown(window);
    let breaks = ema_breaks(window, &ema[window_start..]);
    let single_sided_rise = is_single_sided_rise(&breaks);

    let vol_ratio = volume_ratio(candles);
    let volume_expansion = vol_ratio > VOLUME_EXPANSION_RATIO;

    let gain_7d = point_gain(candles, current_price, 7);
    let gain_30d = point_gain(candles, current_price, 30);

    let criteria = CycleCriteria {
        ema_breakout,
        single_sided_rise,
        volume_expansion,
        consecutive_days,
    };
    let score = criteria.score();
    let (stage, probability, days_in_cycle) =
        decide_stage(score, consecutive_days, gain_30d, ema_distance);

    CycleAnalysis {
        stage,
        probability,
        days_in_cycle,
        criteria,
        criteria_score: score,
        metrics: CycleMetrics {
            ema_distance: round2(ema_distance),
            max_drawdown: round2(drawdown * 100.0),
            volume_ratio: round2(vol_ratio),
            gain_7d: round2(gain_7d),
            gain_30d: round2(gain_30d),
        },
    }
}
