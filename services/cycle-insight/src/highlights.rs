//! Catalogue of past and predicted 100-day cycles drawn on the price chart.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;

use crate::report::Language;
use crate::types::Candle;

/// Chart data starts at 2023-01-01T00:00:00Z
pub const CHART_START_MS: i64 = 1_672_531_200_000;
/// Each cycle is drawn as two 50-day halves
pub const HALF_CYCLE_DAYS: i64 = 50;

struct CycleEntry {
    start: (i32, u32, u32),
    end: (i32, u32, u32),
    is_prediction: bool,
    en: [&'static str; 3],
    zh: [&'static str; 3],
}

static CYCLES: [CycleEntry; 4] = [
    CycleEntry {
        start: (2023, 10, 14),
        end: (2024, 1, 22),
        is_prediction: false,
        en: ["Cycle 1", "Uniform Distribution", "Balanced gains front & back"],
        zh: ["周期 1", "均匀分布", "前后涨幅相对均衡"],
    },
    CycleEntry {
        start: (2024, 1, 22),
        end: (2024, 4, 29),
        is_prediction: false,
        en: ["Cycle 2", "Fast Start, Slow End", "Front-running effect, overdrafting space"],
        zh: ["周期 2", "前快后慢", "抢跑效应，提前透支空间"],
    },
    CycleEntry {
        start: (2024, 9, 7),
        end: (2024, 12, 16),
        is_prediction: false,
        en: ["Cycle 3", "Slow Start, Fast End", "Accumulation first, acceleration later"],
        zh: ["周期 3", "前慢后快", "前期蓄力，后期加速"],
    },
    CycleEntry {
        start: (2025, 4, 9),
        end: (2025, 7, 18),
        is_prediction: true,
        en: ["Cycle 4", "Fast Start, Slow End", "Late major cycle, mixed speeds"],
        zh: ["周期 4", "前快后慢", "大周期后期，快慢刀交替"],
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightPeriod {
    pub label: &'static str,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub description: &'static str,
    pub characteristics: &'static str,
    pub is_prediction: bool,
}

impl HighlightPeriod {
    /// Whether a candle open time falls inside the period, both ends inclusive
    pub fn contains(&self, time_ms: i64) -> bool {
        time_ms >= day_start_ms(self.start_date) && time_ms <= day_start_ms(self.end_date)
    }

    /// Day 50 of the cycle, where the first half ends
    pub fn midpoint(&self) -> NaiveDate {
        self.start_date + Duration::days(HALF_CYCLE_DAYS)
    }
}

/// A highlighted period as drawn on the chart, split into two shaded halves
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleOverlay {
    #[serde(flatten)]
    pub period: HighlightPeriod,
    pub mid_date: NaiveDate,
}

impl From<HighlightPeriod> for CycleOverlay {
    fn from(period: HighlightPeriod) -> Self {
        Self {
            mid_date: period.midpoint(),
            period,
        }
    }
}

fn day_start_ms(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// All highlighted cycles, oldest first
pub fn highlight_periods(lang: Language) -> Vec<HighlightPeriod> {
    CYCLES
        .iter()
        .filter_map(|entry| {
            let [label, description, characteristics] = match lang {
                Language::En => entry.en,
                Language::Zh => entry.zh,
            };
            Some(HighlightPeriod {
                label,
                start_date: NaiveDate::from_ymd_opt(entry.start.0, entry.start.1, entry.start.2)?,
                end_date: NaiveDate::from_ymd_opt(entry.end.0, entry.end.1, entry.end.2)?,
                description,
                characteristics,
                is_prediction: entry.is_prediction,
            })
        })
        .collect()
}

/// The highlighted cycle a candle belongs to, if any
pub fn period_at(periods: &[HighlightPeriod], time_ms: i64) -> Option<&HighlightPeriod> {
    periods.iter().find(|p| p.contains(time_ms))
}

/// Candles on or after the chart start date
pub fn chart_window(candles: &[Candle]) -> Vec<Candle> {
    candles
        .iter()
        .filter(|c| c.time >= CHART_START_MS)
        .copied()
        .collect()
}
