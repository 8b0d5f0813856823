use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::gate::RiskGate;
use crate::models::*;

struct GateState {
    gate: RiskGate,
    last_submission: Option<Instant>,
}

/// Serialized order admission for one portfolio.
///
/// Validation and the subsequent portfolio mutation run as one critical
/// section, so two concurrent submissions can never both pass validation
/// against the same stale snapshot. Submissions arriving within the
/// minimum spacing window are rejected as concurrent duplicates before
/// validation runs.
pub struct TradeGate {
    state: Mutex<GateState>,
    min_spacing: Duration,
}

impl TradeGate {
    pub fn new(gate: RiskGate) -> Self {
        let min_spacing = Duration::from_millis(gate.policy().min_order_spacing_ms);
        Self {
            state: Mutex::new(GateState {
                gate,
                last_submission: None,
            }),
            min_spacing,
        }
    }

    /// Validate the order and, if admitted, run `commit` while still inside
    /// the critical section. `commit` receives the validation result and is
    /// where the caller applies the adjusted quantity/stop/take-profit to
    /// its portfolio store.
    pub fn submit<F>(
        &self,
        order: &OrderRequest,
        portfolio: &PortfolioSnapshot,
        atr: Option<f64>,
        commit: F,
    ) -> RiskValidationResult
    where
        F: FnOnce(&RiskValidationResult),
    {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Instant::now();
        if let Some(last) = state.last_submission {
            if now.duration_since(last) < self.min_spacing {
                return RiskValidationResult::rejected(Violation {
                    violation_type: ViolationType::ConcurrentExecution,
                    severity: Severity::Hard,
                    message: format!(
                        "Order for {} arrived within the {}ms submission window",
                        order.symbol,
                        self.min_spacing.as_millis()
                    ),
                });
            }
        }
        state.last_submission = Some(now);

        let result = state.gate.validate_order(order, portfolio, atr);
        if result.allowed {
            commit(&result);
        }
        result
    }

    /// Access the underlying gate (for balance observations, halts, trade
    /// outcomes) under the same lock that serializes submissions.
    pub fn with_gate<R>(&self, f: impl FnOnce(&mut RiskGate) -> R) -> R {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state.gate)
    }
}
