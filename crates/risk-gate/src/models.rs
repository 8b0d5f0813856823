use serde::{Deserialize, Serialize};
use trading_core::{OrderType, Position, Side};

/// Global risk policy. Every field can be overridden per order via
/// [`RiskOverrides`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// Maximum single-position value as percent of portfolio (default 20%)
    pub max_position_percent: f64,
    /// Minimum reward/risk ratio enforced on take-profits (default 1.5)
    pub min_risk_reward_ratio: f64,
    /// Maximum loss a single trade may risk, percent of portfolio (default 2%)
    pub max_risk_per_trade: f64,
    /// Drawdown from peak that halts new orders (default 20%)
    pub max_drawdown_percent: f64,
    /// Loss since the day's open that halts new orders (default 5%)
    pub daily_loss_limit_percent: f64,
    /// Maximum number of distinct open symbols (default 10)
    pub max_positions: usize,
    /// Consecutive losing trades before halting (default 3)
    pub max_consecutive_losses: usize,
    /// Fractional Kelly multiplier exposed to sizing callers (default 0.25)
    pub kelly_fraction: f64,
    /// Derive a stop loss when the order has none (default true)
    pub enable_auto_stop_loss: bool,
    /// Run the drawdown/daily-loss/streak breakers (default true)
    pub enable_circuit_breaker: bool,
    /// ATR multiple for auto-derived stops (default 2.0)
    pub auto_stop_atr_multiplier: f64,
    /// Percent stop when no ATR is available (default 5%)
    pub auto_stop_fallback_percent: f64,
    /// Minimum spacing between order submissions (default 50ms)
    pub min_order_spacing_ms: u64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            max_position_percent: 20.0,
            min_risk_reward_ratio: 1.5,
            max_risk_per_trade: 2.0,
            max_drawdown_percent: 20.0,
            daily_loss_limit_percent: 5.0,
            max_positions: 10,
            max_consecutive_losses: 3,
            kelly_fraction: 0.25,
            enable_auto_stop_loss: true,
            enable_circuit_breaker: true,
            auto_stop_atr_multiplier: 2.0,
            auto_stop_fallback_percent: 5.0,
            min_order_spacing_ms: 50,
        }
    }
}

/// Per-order overrides. A present field replaces the corresponding policy
/// field for that order only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskOverrides {
    pub max_position_percent: Option<f64>,
    pub min_risk_reward_ratio: Option<f64>,
    pub max_risk_per_trade: Option<f64>,
    pub max_drawdown_percent: Option<f64>,
    pub daily_loss_limit_percent: Option<f64>,
    pub max_positions: Option<usize>,
    pub enable_auto_stop_loss: Option<bool>,
    pub enable_circuit_breaker: Option<bool>,
    pub auto_stop_atr_multiplier: Option<f64>,
    pub auto_stop_fallback_percent: Option<f64>,
}

impl RiskPolicy {
    /// Field-by-field merge: the override wins wherever it is present.
    pub fn merged(&self, overrides: Option<&RiskOverrides>) -> RiskPolicy {
        let mut policy = self.clone();
        if let Some(o) = overrides {
            if let Some(v) = o.max_position_percent {
                policy.max_position_percent = v;
            }
            if let Some(v) = o.min_risk_reward_ratio {
                policy.min_risk_reward_ratio = v;
            }
            if let Some(v) = o.max_risk_per_trade {
                policy.max_risk_per_trade = v;
            }
            if let Some(v) = o.max_drawdown_percent {
                policy.max_drawdown_percent = v;
            }
            if let Some(v) = o.daily_loss_limit_percent {
                policy.daily_loss_limit_percent = v;
            }
            if let Some(v) = o.max_positions {
                policy.max_positions = v;
            }
            if let Some(v) = o.enable_auto_stop_loss {
                policy.enable_auto_stop_loss = v;
            }
            if let Some(v) = o.enable_circuit_breaker {
                policy.enable_circuit_breaker = v;
            }
            if let Some(v) = o.auto_stop_atr_multiplier {
                policy.auto_stop_atr_multiplier = v;
            }
            if let Some(v) = o.auto_stop_fallback_percent {
                policy.auto_stop_fallback_percent = v;
            }
        }
        policy
    }
}

/// An order awaiting admission. Consumed once by the gate, which may
/// rewrite quantity, stop loss and take profit before the portfolio sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub order_type: OrderType,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub overrides: Option<RiskOverrides>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationType {
    TradingHalted,
    MaxDrawdown,
    DailyLossLimit,
    ConsecutiveLosses,
    MaxPositions,
    MaxPositionSize,
    MaxRiskPerTrade,
    RiskReward,
    ConcurrentExecution,
    InvalidOrder,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::TradingHalted => "trading_halted",
            ViolationType::MaxDrawdown => "max_drawdown",
            ViolationType::DailyLossLimit => "daily_loss_limit",
            ViolationType::ConsecutiveLosses => "consecutive_losses",
            ViolationType::MaxPositions => "max_positions",
            ViolationType::MaxPositionSize => "max_position_size",
            ViolationType::MaxRiskPerTrade => "max_risk_per_trade",
            ViolationType::RiskReward => "risk_reward",
            ViolationType::ConcurrentExecution => "concurrent_execution",
            ViolationType::InvalidOrder => "invalid_order",
        }
    }
}

/// Hard violations reject the order; soft violations adjust it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub message: String,
}

/// Outcome of order validation. When `allowed` is true the caller must
/// execute `adjusted_quantity` with the returned stop/take-profit, never the
/// original request. `adjusted_quantity` may be 0, which is a no-op rather
/// than an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskValidationResult {
    pub allowed: bool,
    pub reasons: Vec<String>,
    pub violations: Vec<Violation>,
    pub adjusted_quantity: f64,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
}

impl RiskValidationResult {
    pub(crate) fn rejected(violation: Violation) -> Self {
        Self {
            allowed: false,
            reasons: vec![violation.message.clone()],
            violations: vec![violation],
            adjusted_quantity: 0.0,
            stop_loss_price: None,
            take_profit_price: None,
        }
    }
}

/// Read-only view of the portfolio handed to the gate. The gate never
/// mutates portfolio state; it only reads this snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub positions: Vec<Position>,
    pub cash: f64,
    pub total_value: f64,
}

impl PortfolioSnapshot {
    pub fn position_for(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn open_symbol_count(&self) -> usize {
        self.positions.len()
    }
}

/// Closed-trade outcome used by the losing-streak breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
    Breakeven,
}
