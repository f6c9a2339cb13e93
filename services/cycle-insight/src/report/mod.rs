//! Report Formatter
//!
//! Renders a `CycleAnalysis` into the fixed, localized text report that is
//! shown whenever no generated narrative is available. Output depends only
//! on the analysis value and the language.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::cycle::{CycleAnalysis, CycleStage};

/// Report language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    #[default]
    Zh,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }

    /// Parse a language tag such as `en`, `en-US` or `zh-CN`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value == "en" || value.starts_with("en-") {
            Some(Language::En)
        } else if value == "zh" || value.starts_with("zh-") {
            Some(Language::Zh)
        } else {
            None
        }
    }

    /// Resolve a `lang` query value; missing or unknown tags give `default`
    pub fn from_query(value: Option<&str>, default: Language) -> Self {
        value.and_then(Self::parse).unwrap_or(default)
    }
}

static EN: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "title" => "BTC 100-Day Cycle Analysis",
    "stage" => "Stage",
    "probability" => "Probability",
    "days_in_cycle" => "Days in cycle",
    "days" => "days",
    "criteria" => "Criteria",
    "ema_breakout" => "Price above EMA15",
    "single_sided_rise" => "Single-sided rise (no deep EMA15 break in 30D)",
    "max_drawdown" => "30D max drawdown",
    "volume_expansion" => "Volume expansion (5D/20D)",
    "consecutive_days" => "Consecutive days above EMA15",
    "gains" => "Recent gains",
    "recommendation" => "Recommendation",
    "stage.observation" => "Observation",
    "stage.confirmation" => "Confirmation",
    "stage.warning" => "Warning",
    "stage.rest" => "Rest",
    "not_configured" => "The AI analyst is not configured. Showing the rule-based report instead.",
    "unavailable" => "AI analysis is temporarily unavailable.",
    "no_content" => "Unable to generate an analysis right now.",
};

static ZH: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "title" => "BTC 100天周期分析",
    "stage" => "当前阶段",
    "probability" => "概率",
    "days_in_cycle" => "周期天数",
    "days" => "天",
    "criteria" => "判断条件",
    "ema_breakout" => "价格位于EMA15上方",
    "single_sided_rise" => "单边上涨（近30天未深度跌破EMA15）",
    "max_drawdown" => "近30天最大回撤",
    "volume_expansion" => "成交量放大（5日/20日）",
    "consecutive_days" => "连续在EMA15上方天数",
    "gains" => "近期涨幅",
    "recommendation" => "操作建议",
    "stage.observation" => "观察期",
    "stage.confirmation" => "确认期",
    "stage.warning" => "预警期",
    "stage.rest" => "休息期",
    "not_configured" => "API密钥未配置，请检查环境变量设置。",
    "unavailable" => "AI 分析服务暂时不可用。",
    "no_content" => "暂时无法生成分析。",
};

/// Look up a message for `lang`; unknown keys render as the key itself
pub fn text(lang: Language, key: &'static str) -> &'static str {
    let table = match lang {
        Language::En => &EN,
        Language::Zh => &ZH,
    };
    table.get(key).copied().unwrap_or(key)
}

/// Localized stage name
pub fn stage_name(stage: CycleStage, lang: Language) -> &'static str {
    let key = match stage {
        CycleStage::Observation => "stage.observation",
        CycleStage::Confirmation => "stage.confirmation",
        CycleStage::Warning => "stage.warning",
        CycleStage::Rest => "stage.rest",
    };
    text(lang, key)
}

/// Action bullets for each stage
pub fn recommendations(stage: CycleStage, lang: Language) -> &'static [&'static str] {
    match (stage, lang) {
        (CycleStage::Observation, Language::En) => &[
            "Early breakout above EMA15; wait for 30+ days of confirmation",
            "Watch for volume to keep expanding",
            "Keep position sizes small while the trend is tested",
        ],
        (CycleStage::Observation, Language::Zh) => &[
            "价格刚突破EMA15，等待30天以上的确认",
            "关注成交量能否持续放大",
            "趋势验证期间保持轻仓",
        ],
        (CycleStage::Confirmation, Language::En) => &[
            "Single-sided rise confirmed; the trend is the main thread",
            "Hold core positions and trail stops along EMA15",
            "Prepare for the 70-100 day warning window",
        ],
        (CycleStage::Confirmation, Language::Zh) => &[
            "单边上涨已确认，顺势为主",
            "持有核心仓位，沿EMA15移动止损",
            "为70-100天预警期做好准备",
        ],
        (CycleStage::Warning, Language::En) => &[
            "The run is entering its late phase; take profits in stages",
            "Avoid chasing new highs with fresh positions",
            "A close below EMA15 likely marks the end of the cycle",
        ],
        (CycleStage::Warning, Language::Zh) => &[
            "行情进入后期，分批止盈",
            "避免追高建立新仓位",
            "跌破EMA15可能意味着周期结束",
        ],
        (CycleStage::Rest, Language::En) => &[
            "No active 100-day cycle; stay patient",
            "Wait for a decisive breakout above EMA15 with rising volume",
        ],
        (CycleStage::Rest, Language::Zh) => &[
            "当前不处于100天周期中，保持耐心",
            "等待放量有效突破EMA15后再做决策",
        ],
    }
}

fn glyph(passed: bool) -> &'static str {
    if passed {
        "✅"
    } else {
        "❌"
    }
}

/// Render the multi-section text report for `analysis`
pub fn format_analysis_report(analysis: &CycleAnalysis, lang: Language) -> String {
    let t = |key| text(lang, key);
    let criteria = &analysis.criteria;
    let metrics = &analysis.metrics;
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "📊 {}", t("title"));
    let _ = writeln!(out, "{}: {}", t("stage"), stage_name(analysis.stage, lang));
    let _ = writeln!(out, "{}: {}%", t("probability"), analysis.probability);
    if analysis.days_in_cycle > 0 {
        let _ = writeln!(
            out,
            "{}: {} {}",
            t("days_in_cycle"),
            analysis.days_in_cycle,
            t("days")
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{} ({}/4):", t("criteria"), criteria.score());
    let _ = writeln!(
        out,
        "{} {}: {:+.2}%",
        glyph(criteria.ema_breakout),
        t("ema_breakout"),
        metrics.ema_distance
    );
    // Pass/fail comes from the EMA15 break ladder; drawdown is context only
    let _ = writeln!(
        out,
        "{} {} | {}: {:.2}%",
        glyph(criteria.single_sided_rise),
        t("single_sided_rise"),
        t("max_drawdown"),
        metrics.max_drawdown
    );
    let _ = writeln!(
        out,
        "{} {}: {:.2}x",
        glyph(criteria.volume_expansion),
        t("volume_expansion"),
        metrics.volume_ratio
    );
    let _ = writeln!(
        out,
        "{} {}: {} {}",
        glyph(criteria.consecutive_days > 10),
        t("consecutive_days"),
        criteria.consecutive_days,
        t("days")
    );

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{}: 7D {:+.2}% | 30D {:+.2}%",
        t("gains"),
        metrics.gain_7d,
        metrics.gain_30d
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "{}:", t("recommendation"));
    for line in recommendations(analysis.stage, lang) {
        let _ = writeln!(out, "• {}", line);
    }

    out
}
