use std::collections::VecDeque;

use anyhow::{bail, Result};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use trading_core::{is_valid_price, Side};

use crate::models::*;

// Outcomes kept for the losing-streak breaker
const OUTCOME_WINDOW: usize = 20;

/// Order-admission control. Holds the global policy plus the running state
/// the circuit breakers need (peak balance, day-start balance, halt flag,
/// recent trade outcomes). All state is explicit and constructor-injected;
/// callers own the lifecycle.
pub struct RiskGate {
    policy: RiskPolicy,
    peak_balance: Option<f64>,
    day_start_balance: Option<f64>,
    halted: bool,
    halt_reason: Option<String>,
    recent_outcomes: VecDeque<TradeOutcome>,
}

impl RiskGate {
    pub fn new(policy: RiskPolicy) -> Result<Self> {
        if policy.max_position_percent <= 0.0 || policy.max_position_percent > 100.0 {
            bail!("max_position_percent must be between 0 and 100");
        }
        if policy.max_risk_per_trade <= 0.0 || policy.max_risk_per_trade > 100.0 {
            bail!("max_risk_per_trade must be between 0 and 100");
        }
        if policy.min_risk_reward_ratio <= 0.0 {
            bail!("min_risk_reward_ratio must be positive");
        }
        if policy.max_drawdown_percent <= 0.0 || policy.max_drawdown_percent > 100.0 {
            bail!("max_drawdown_percent must be between 0 and 100");
        }
        if policy.max_positions == 0 {
            bail!("max_positions must be at least 1");
        }
        Ok(Self {
            policy,
            peak_balance: None,
            day_start_balance: None,
            halted: false,
            halt_reason: None,
            recent_outcomes: VecDeque::with_capacity(OUTCOME_WINDOW),
        })
    }

    pub fn with_defaults() -> Self {
        Self {
            policy: RiskPolicy::default(),
            peak_balance: None,
            day_start_balance: None,
            halted: false,
            halt_reason: None,
            recent_outcomes: VecDeque::with_capacity(OUTCOME_WINDOW),
        }
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    /// Reset all breaker state, keeping the policy.
    pub fn reset(&mut self) {
        self.peak_balance = None;
        self.day_start_balance = None;
        self.halted = false;
        self.halt_reason = None;
        self.recent_outcomes.clear();
    }

    /// Feed a fresh portfolio valuation. The peak ratchets up on new highs.
    /// Returns the current drawdown from peak in percent.
    pub fn observe_balance(&mut self, total_value: f64) -> f64 {
        if !total_value.is_finite() || total_value <= 0.0 {
            return 0.0;
        }
        match self.peak_balance {
            None => {
                self.peak_balance = Some(total_value);
                0.0
            }
            Some(peak) if total_value > peak => {
                self.peak_balance = Some(total_value);
                0.0
            }
            Some(peak) => (peak - total_value) / peak * 100.0,
        }
    }

    /// Mark the start of a trading day; the daily-loss breaker measures
    /// against this balance.
    pub fn start_trading_day(&mut self, balance: f64) {
        self.day_start_balance = Some(balance);
    }

    /// Manually halt new orders.
    pub fn halt(&mut self, reason: impl Into<String>) {
        self.halted = true;
        self.halt_reason = Some(reason.into());
    }

    pub fn resume(&mut self) {
        self.halted = false;
        self.halt_reason = None;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Record a closed trade for the losing-streak breaker.
    pub fn record_trade_outcome(&mut self, pnl: f64) {
        let outcome = if pnl > 0.01 {
            TradeOutcome::Win
        } else if pnl < -0.01 {
            TradeOutcome::Loss
        } else {
            TradeOutcome::Breakeven
        };
        if self.recent_outcomes.len() == OUTCOME_WINDOW {
            self.recent_outcomes.pop_back();
        }
        self.recent_outcomes.push_front(outcome);
    }

    /// Length of the current losing streak, most recent trades first.
    pub fn consecutive_losses(&self) -> usize {
        self.recent_outcomes
            .iter()
            .take_while(|o| **o == TradeOutcome::Loss)
            .count()
    }

    /// Validate an order against the merged policy and portfolio snapshot.
    ///
    /// Circuit-breaker and position-count breaches reject outright; the
    /// risk cap, risk/reward and position-size checks adjust the order and
    /// record why. The caller must execute the returned quantity and
    /// stop/take-profit, not the requested ones.
    pub fn validate_order(
        &self,
        order: &OrderRequest,
        portfolio: &PortfolioSnapshot,
        atr: Option<f64>,
    ) -> RiskValidationResult {
        let policy = self.policy.merged(order.overrides.as_ref());

        if !is_valid_price(order.price) || !order.quantity.is_finite() || order.quantity <= 0.0 {
            return RiskValidationResult::rejected(Violation {
                violation_type: ViolationType::InvalidOrder,
                severity: Severity::Hard,
                message: format!(
                    "Order for {} has invalid price {} or quantity {}",
                    order.symbol, order.price, order.quantity
                ),
            });
        }

        if policy.enable_circuit_breaker {
            if let Some(violation) = self.check_circuit_breakers(&policy, portfolio) {
                tracing::warn!(
                    symbol = %order.symbol,
                    breaker = violation.violation_type.as_str(),
                    "order rejected by circuit breaker"
                );
                return RiskValidationResult::rejected(violation);
            }
        }

        // New symbols are gated by the position count; adding to an
        // existing position is always allowed
        if portfolio.position_for(&order.symbol).is_none()
            && portfolio.open_symbol_count() >= policy.max_positions
        {
            return RiskValidationResult::rejected(Violation {
                violation_type: ViolationType::MaxPositions,
                severity: Severity::Hard,
                message: format!(
                    "Position limit {} reached; not opening {}",
                    policy.max_positions, order.symbol
                ),
            });
        }

        let mut reasons = Vec::new();
        let mut violations = Vec::new();

        let stop_loss = self.resolve_stop_loss(order, &policy, atr, &mut reasons);
        let mut quantity = order.quantity;

        // Per-trade risk cap: shrink quantity so the stop-out loss stays
        // within max_risk_per_trade percent of the portfolio
        if let Some(stop) = stop_loss {
            let price = Decimal::from_f64(order.price).unwrap_or_default();
            let stop_dec = Decimal::from_f64(stop).unwrap_or_default();
            let risk_per_share = (price - stop_dec).abs();

            if risk_per_share > Decimal::ZERO {
                let max_loss = portfolio.total_value * policy.max_risk_per_trade / 100.0;
                let max_loss_dec = Decimal::from_f64(max_loss).unwrap_or_default();
                let max_qty = (max_loss_dec / risk_per_share)
                    .floor()
                    .to_f64()
                    .unwrap_or(0.0);

                if quantity > max_qty {
                    let capped = max_qty.max(1.0);
                    reasons.push(format!(
                        "Quantity reduced from {} to {} to keep risk within {:.1}% of portfolio",
                        quantity, capped, policy.max_risk_per_trade
                    ));
                    violations.push(Violation {
                        violation_type: ViolationType::MaxRiskPerTrade,
                        severity: Severity::Soft,
                        message: format!(
                            "Requested quantity risks more than ${:.2}",
                            max_loss
                        ),
                    });
                    quantity = capped;
                }
            }
        }

        // Risk/reward: derive or repair the take-profit so the trade pays
        // at least min_risk_reward_ratio times its risk
        let take_profit = self.resolve_take_profit(order, &policy, stop_loss, &mut reasons);

        // Position-size percent cap on the order value
        let max_value = portfolio.total_value * policy.max_position_percent / 100.0;
        let order_value = order.price * quantity;
        if order_value > max_value {
            let capped = (max_value / order.price).floor();
            reasons.push(format!(
                "Quantity reduced from {} to {} to keep position within {:.1}% of portfolio",
                quantity, capped, policy.max_position_percent
            ));
            violations.push(Violation {
                violation_type: ViolationType::MaxPositionSize,
                severity: Severity::Soft,
                message: format!("Order value ${:.2} exceeds cap ${:.2}", order_value, max_value),
            });
            quantity = capped;
        }

        tracing::debug!(
            symbol = %order.symbol,
            side = %order.side,
            requested = order.quantity,
            adjusted = quantity,
            "order admitted"
        );

        RiskValidationResult {
            allowed: true,
            reasons,
            violations,
            adjusted_quantity: quantity,
            stop_loss_price: stop_loss,
            take_profit_price: take_profit,
        }
    }

    fn check_circuit_breakers(
        &self,
        policy: &RiskPolicy,
        portfolio: &PortfolioSnapshot,
    ) -> Option<Violation> {
        if self.halted {
            return Some(Violation {
                violation_type: ViolationType::TradingHalted,
                severity: Severity::Hard,
                message: self
                    .halt_reason
                    .clone()
                    .unwrap_or_else(|| "Trading manually halted".to_string()),
            });
        }

        if let Some(peak) = self.peak_balance.filter(|p| *p > 0.0) {
            let drawdown = (peak - portfolio.total_value) / peak * 100.0;
            if drawdown > policy.max_drawdown_percent {
                return Some(Violation {
                    violation_type: ViolationType::MaxDrawdown,
                    severity: Severity::Hard,
                    message: format!(
                        "Drawdown {:.1}% exceeds limit {:.1}%",
                        drawdown, policy.max_drawdown_percent
                    ),
                });
            }
        }

        if let Some(day_start) = self.day_start_balance.filter(|b| *b > 0.0) {
            let daily_loss = (day_start - portfolio.total_value) / day_start * 100.0;
            if daily_loss > policy.daily_loss_limit_percent {
                return Some(Violation {
                    violation_type: ViolationType::DailyLossLimit,
                    severity: Severity::Hard,
                    message: format!(
                        "Daily loss {:.1}% exceeds limit {:.1}%",
                        daily_loss, policy.daily_loss_limit_percent
                    ),
                });
            }
        }

        let losses = self.consecutive_losses();
        if losses >= policy.max_consecutive_losses {
            return Some(Violation {
                violation_type: ViolationType::ConsecutiveLosses,
                severity: Severity::Hard,
                message: format!(
                    "{} consecutive losses reached the limit of {}",
                    losses, policy.max_consecutive_losses
                ),
            });
        }

        None
    }

    fn resolve_stop_loss(
        &self,
        order: &OrderRequest,
        policy: &RiskPolicy,
        atr: Option<f64>,
        reasons: &mut Vec<String>,
    ) -> Option<f64> {
        if let Some(stop) = order.stop_loss.filter(|s| is_valid_price(*s)) {
            return Some(stop);
        }
        if !policy.enable_auto_stop_loss {
            return None;
        }

        let distance = match atr.filter(|a| a.is_finite() && *a > 0.0) {
            Some(atr) => atr * policy.auto_stop_atr_multiplier,
            None => order.price * policy.auto_stop_fallback_percent / 100.0,
        };
        let stop = match order.side {
            Side::Long => order.price - distance,
            Side::Short => order.price + distance,
        };
        // A derived stop through zero means the distance was nonsense
        if !is_valid_price(stop) {
            return None;
        }

        reasons.push(format!("Auto stop loss set at {:.2}", stop));
        Some(stop)
    }

    fn resolve_take_profit(
        &self,
        order: &OrderRequest,
        policy: &RiskPolicy,
        stop_loss: Option<f64>,
        reasons: &mut Vec<String>,
    ) -> Option<f64> {
        let stop = stop_loss?;
        let risk = (order.price - stop).abs();
        if risk == 0.0 {
            return order.take_profit;
        }

        let reward_ok = order.take_profit.filter(|tp| is_valid_price(*tp)).map(|tp| {
            let reward = match order.side {
                Side::Long => tp - order.price,
                Side::Short => order.price - tp,
            };
            reward / risk >= policy.min_risk_reward_ratio
        });

        match reward_ok {
            Some(true) => order.take_profit,
            _ => {
                let target = match order.side {
                    Side::Long => order.price + risk * policy.min_risk_reward_ratio,
                    Side::Short => order.price - risk * policy.min_risk_reward_ratio,
                };
                if !is_valid_price(target) {
                    return order.take_profit;
                }
                reasons.push(format!(
                    "Take profit set at {:.2} for a {:.1}:1 reward/risk",
                    target, policy.min_risk_reward_ratio
                ));
                Some(target)
            }
        }
    }
}
