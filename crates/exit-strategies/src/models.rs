use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which strategy produced an exit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitType {
    TrailingStop,
    TimeBased,
    ParabolicSar,
    CompoundCondition,
    HighLowBreak,
}

impl ExitType {
    pub fn name(&self) -> &'static str {
        match self {
            ExitType::TrailingStop => "Trailing Stop",
            ExitType::TimeBased => "Time-Based",
            ExitType::ParabolicSar => "Parabolic SAR",
            ExitType::CompoundCondition => "Compound Condition",
            ExitType::HighLowBreak => "High/Low Break",
        }
    }

    /// Stop-class strategies protect capital directly and win priority ties.
    pub fn is_stop_class(&self) -> bool {
        matches!(self, ExitType::TrailingStop | ExitType::HighLowBreak)
    }
}

/// How a strategy evaluation concluded. A healthy strategy that simply has
/// not fired reports `NoTrigger`; `InsufficientData` is reserved for
/// strategies that could not evaluate at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitOutcome {
    Triggered,
    NoTrigger,
    InsufficientData,
    InvalidPosition,
}

/// Per-strategy evaluation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSignal {
    pub should_exit: bool,
    pub outcome: ExitOutcome,
    pub exit_price: Option<f64>,
    pub reason: String,
    pub exit_type: ExitType,
    pub priority: i32,
    pub metadata: serde_json::Value,
}

impl ExitSignal {
    pub(crate) fn triggered(
        exit_type: ExitType,
        priority: i32,
        exit_price: f64,
        reason: String,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            should_exit: true,
            outcome: ExitOutcome::Triggered,
            exit_price: Some(exit_price),
            reason,
            exit_type,
            priority,
            metadata,
        }
    }

    pub(crate) fn idle(
        exit_type: ExitType,
        priority: i32,
        outcome: ExitOutcome,
        reason: String,
    ) -> Self {
        Self {
            should_exit: false,
            outcome,
            exit_price: None,
            reason,
            exit_type,
            priority,
            metadata: serde_json::Value::Null,
        }
    }
}

/// Closed set of indicators a compound condition may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndicatorId {
    Price,
    Rsi,
    Sma,
    MacdHistogram,
    BollingerUpper,
    BollingerLower,
    Atr,
}

/// One indicator snapshot. Missing values mean the indicator could not be
/// computed for this observation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorValues {
    pub price: Option<f64>,
    pub rsi: Option<f64>,
    pub sma: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub atr: Option<f64>,
}

impl IndicatorValues {
    pub fn get(&self, id: IndicatorId) -> Option<f64> {
        let value = match id {
            IndicatorId::Price => self.price,
            IndicatorId::Rsi => self.rsi,
            IndicatorId::Sma => self.sma,
            IndicatorId::MacdHistogram => self.macd_histogram,
            IndicatorId::BollingerUpper => self.bollinger_upper,
            IndicatorId::BollingerLower => self.bollinger_lower,
            IndicatorId::Atr => self.atr,
        };
        value.filter(|v| v.is_finite())
    }
}

/// Comparison applied between an indicator value and a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    Above,
    Below,
    /// Within 1% of the threshold (or of the current price when the
    /// threshold is 0, used for band touches)
    Touch,
    CrossAbove,
    CrossBelow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitCondition {
    pub indicator: IndicatorId,
    pub threshold: f64,
    pub operator: ConditionOperator,
}

/// Everything the strategies can see about the market at evaluation time.
/// All fields are already resolved; the strategies never fetch anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub current_price: f64,
    pub atr: Option<f64>,
    pub current_sar: Option<f64>,
    pub previous_sar: Option<f64>,
    /// Tracked period extremes for break detection
    pub period_high: Option<f64>,
    pub period_low: Option<f64>,
    pub indicators: IndicatorValues,
    pub previous_indicators: Option<IndicatorValues>,
    pub now: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn new(current_price: f64, now: DateTime<Utc>) -> Self {
        Self {
            current_price,
            atr: None,
            current_sar: None,
            previous_sar: None,
            period_high: None,
            period_low: None,
            indicators: IndicatorValues::default(),
            previous_indicators: None,
            now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingStopConfig {
    pub atr_multiplier: f64,
    pub priority: i32,
}

impl Default for TrailingStopConfig {
    fn default() -> Self {
        Self {
            atr_multiplier: 2.0,
            priority: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeExitConfig {
    pub max_holding_days: i64,
    pub priority: i32,
}

impl Default for TimeExitConfig {
    fn default() -> Self {
        Self {
            max_holding_days: 10,
            priority: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarExitConfig {
    pub priority: i32,
}

impl Default for SarExitConfig {
    fn default() -> Self {
        Self { priority: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundExitConfig {
    pub conditions: Vec<ExitCondition>,
    /// true = AND, false = OR
    pub require_all: bool,
    pub priority: i32,
}

impl Default for CompoundExitConfig {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            require_all: true,
            priority: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighLowBreakConfig {
    pub priority: i32,
}

impl Default for HighLowBreakConfig {
    fn default() -> Self {
        Self { priority: 3 }
    }
}

/// A configured exit strategy. The evaluator runs each variant's predicate
/// against the same position and snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExitStrategyConfig {
    TrailingStop(TrailingStopConfig),
    TimeBased(TimeExitConfig),
    ParabolicSar(SarExitConfig),
    Compound(CompoundExitConfig),
    HighLowBreak(HighLowBreakConfig),
}

impl ExitStrategyConfig {
    pub fn exit_type(&self) -> ExitType {
        match self {
            ExitStrategyConfig::TrailingStop(_) => ExitType::TrailingStop,
            ExitStrategyConfig::TimeBased(_) => ExitType::TimeBased,
            ExitStrategyConfig::ParabolicSar(_) => ExitType::ParabolicSar,
            ExitStrategyConfig::Compound(_) => ExitType::CompoundCondition,
            ExitStrategyConfig::HighLowBreak(_) => ExitType::HighLowBreak,
        }
    }
}
