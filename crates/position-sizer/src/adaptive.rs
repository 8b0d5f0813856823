use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use trading_core::{is_valid_price, Side};

/// Broad market bias used to tilt position sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketBias {
    Bull,
    Bear,
    Sideways,
}

impl MarketBias {
    /// Size multiplier for the bias: lean in during bull markets, pull back
    /// hard in bear markets, slightly reduce when directionless.
    pub fn size_multiplier(&self) -> f64 {
        match self {
            MarketBias::Bull => 1.15,
            MarketBias::Bear => 0.7,
            MarketBias::Sideways => 0.9,
        }
    }
}

/// Portfolio-level sizing limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingPolicy {
    /// Maximum position value as percent of account balance
    pub max_position_percent: f64,

    /// Positions smaller than this percent of the account are not worth
    /// opening and snap to zero
    pub min_position_percent: f64,

    /// Hard dollar cap on the loss a single trade may realize at its stop
    pub max_loss_per_trade: f64,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            max_position_percent: 20.0,
            min_position_percent: 1.0,
            max_loss_per_trade: 10_000.0,
        }
    }
}

/// Everything the sizer needs to know about the trade and its context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingInputs {
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub account_balance: f64,
    /// Percent of the account to risk between entry and stop (0-100)
    pub risk_percentage: f64,
    pub side: Side,
    /// Dimensionless volatility estimate, 0 = calm
    pub volatility: f64,
    pub market_bias: MarketBias,
    /// Signed trend strength, typically -1..1
    pub trend_strength: f64,
    /// Correlation of this asset with existing holdings, -1..1
    pub asset_correlation: f64,
    /// Model confidence in the signal, 0-100
    pub confidence: f64,
}

/// Sizing recommendation. `position_value` is the dollar allocation; the
/// share count is derived from it at the entry price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizedPosition {
    pub position_value: f64,
    pub shares: f64,
    /// Dollars lost if the stop is hit at the recommended size
    pub risk_amount: f64,
    /// `risk_amount` as percent of the account
    pub risk_percent: f64,
    pub reasoning: String,
}

impl SizedPosition {
    fn zero(reasoning: String) -> Self {
        Self {
            position_value: 0.0,
            shares: 0.0,
            risk_amount: 0.0,
            risk_percent: 0.0,
            reasoning,
        }
    }
}

/// Risk-bounded position sizer.
///
/// Starts from the classic fixed-fractional size (risk dollars divided by
/// stop distance) and then walks a fixed chain of multiplicative
/// adjustments: volatility, market bias, trend alignment, correlation,
/// confidence. The adjustment order is part of the contract — callers that
/// reproduce the numbers must apply them in the same sequence.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    policy: SizingPolicy,
}

// Factor applied on top of the quadratic shrink below the confidence knee,
// chosen so the curve is continuous with the linear branch at 60.
const LOW_CONFIDENCE_REDUCTION: f64 = 0.5;
const CONFIDENCE_KNEE: f64 = 60.0;

impl PositionSizer {
    pub fn new(policy: SizingPolicy) -> Result<Self> {
        if policy.max_position_percent <= 0.0 || policy.max_position_percent > 100.0 {
            bail!("max_position_percent must be between 0 and 100");
        }
        if policy.min_position_percent < 0.0
            || policy.min_position_percent > policy.max_position_percent
        {
            bail!("min_position_percent must be >= 0 and <= max_position_percent");
        }
        if policy.max_loss_per_trade <= 0.0 {
            bail!("max_loss_per_trade must be positive");
        }
        Ok(Self { policy })
    }

    pub fn with_defaults() -> Self {
        Self {
            policy: SizingPolicy::default(),
        }
    }

    pub fn policy(&self) -> &SizingPolicy {
        &self.policy
    }

    /// Compute the dollar allocation for a trade. Invalid prices, a missing
    /// stop distance, or a non-positive balance yield a zero-size result
    /// with an explanation rather than an error.
    pub fn calculate(&self, inputs: &SizingInputs) -> SizedPosition {
        if !is_valid_price(inputs.entry_price) || !is_valid_price(inputs.stop_loss_price) {
            return SizedPosition::zero(format!(
                "Invalid entry/stop prices ({} / {})",
                inputs.entry_price, inputs.stop_loss_price
            ));
        }
        if !inputs.account_balance.is_finite() || inputs.account_balance <= 0.0 {
            return SizedPosition::zero("Account balance must be positive".to_string());
        }

        let price_risk = (inputs.entry_price - inputs.stop_loss_price).abs() / inputs.entry_price;
        if price_risk == 0.0 {
            return SizedPosition::zero(
                "Stop equals entry; cannot size without a stop distance".to_string(),
            );
        }

        let risk_percentage = inputs.risk_percentage.clamp(0.0, 100.0);
        let risk_amount = inputs.account_balance * risk_percentage / 100.0;
        let mut value = risk_amount / price_risk;

        // 1. Volatility damping
        let vol = inputs.volatility.max(0.0);
        value *= 1.0 / (1.0 + vol * 1.5);

        // 2. Market bias
        value *= inputs.market_bias.size_multiplier();

        // 3. Trend alignment
        let trend_factor = 1.0 + inputs.trend_strength.abs().min(0.5);
        let aligned = match inputs.side {
            Side::Long => inputs.trend_strength >= 0.0,
            Side::Short => inputs.trend_strength < 0.0,
        };
        if aligned {
            value *= trend_factor;
        } else {
            value /= trend_factor;
        }

        // 4. Correlation: no penalty below 0.5, shrinking to zero at 1.0
        let corr_factor = 1.0 - ((inputs.asset_correlation - 0.5).max(0.0) * 2.0);
        value *= corr_factor.max(0.0);

        // 5. Confidence
        let confidence = inputs.confidence.clamp(0.0, 100.0);
        if confidence < CONFIDENCE_KNEE {
            value *= (confidence / CONFIDENCE_KNEE).powi(2) * LOW_CONFIDENCE_REDUCTION;
        } else {
            value *= 0.5 + (confidence - CONFIDENCE_KNEE) / 40.0 * 0.7;
        }

        // 6. Policy caps
        let max_value = inputs.account_balance * self.policy.max_position_percent / 100.0;
        value = value
            .min(max_value)
            .min(self.policy.max_loss_per_trade / price_risk);

        // 7. Minimum meaningful size
        let min_value = inputs.account_balance * self.policy.min_position_percent / 100.0;
        if value < min_value {
            return SizedPosition::zero(format!(
                "Sized value ${:.2} below minimum {:.1}% of account",
                value, self.policy.min_position_percent
            ));
        }

        let adjusted_risk = value * price_risk;
        let risk_percent = adjusted_risk / inputs.account_balance * 100.0;
        let shares = value / inputs.entry_price;

        tracing::debug!(
            side = %inputs.side,
            value,
            risk_percent,
            "position sized"
        );

        SizedPosition {
            position_value: value,
            shares,
            risk_amount: adjusted_risk,
            risk_percent,
            reasoning: format!(
                "${:.0} position ({:.2} shares), risking ${:.0} ({:.2}% of account) \
                 at {:.2}% stop distance, confidence {:.0}%",
                value,
                shares,
                adjusted_risk,
                risk_percent,
                price_risk * 100.0,
                confidence
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn base_inputs() -> SizingInputs {
        SizingInputs {
            entry_price: 150.0,
            stop_loss_price: 145.0,
            account_balance: 1_000_000.0,
            risk_percentage: 2.0,
            side: Side::Long,
            volatility: 0.0,
            market_bias: MarketBias::Sideways,
            trend_strength: 0.0,
            asset_correlation: 0.0,
            confidence: 80.0,
        }
    }

    #[test]
    fn test_cap_chain_bounds_extreme_base_size() {
        let sizer = PositionSizer::with_defaults();
        let result = sizer.calculate(&base_inputs());

        // Base size is riskAmount / priceRisk = 20_000 / (5/150) = 600_000,
        // which the 20% position cap pulls down to 200_000.
        assert_relative_eq!(result.position_value, 200_000.0, epsilon = 1e-6);
        let price_risk = 5.0 / 150.0;
        assert_relative_eq!(result.risk_amount, 200_000.0 * price_risk, epsilon = 1e-6);
        assert!(result.risk_amount <= sizer.policy().max_loss_per_trade);
    }

    #[test]
    fn test_risk_identity_holds() {
        let sizer = PositionSizer::with_defaults();
        let inputs = base_inputs();
        let result = sizer.calculate(&inputs);

        let price_risk =
            (inputs.entry_price - inputs.stop_loss_price).abs() / inputs.entry_price;
        assert_relative_eq!(
            result.position_value * price_risk,
            result.risk_amount,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_zero_stop_distance_sizes_zero() {
        let sizer = PositionSizer::with_defaults();
        let mut inputs = base_inputs();
        inputs.stop_loss_price = inputs.entry_price;

        let result = sizer.calculate(&inputs);
        assert_eq!(result.position_value, 0.0);
        assert_eq!(result.shares, 0.0);
    }

    #[test]
    fn test_size_shrinks_with_volatility() {
        let sizer = PositionSizer::with_defaults();
        let mut last = f64::INFINITY;

        for vol in [0.0, 0.5, 1.0, 2.0, 4.0] {
            let mut inputs = base_inputs();
            inputs.volatility = vol;
            // Avoid the cap hiding the adjustment
            inputs.risk_percentage = 0.5;
            let size = sizer.calculate(&inputs).position_value;
            assert!(size <= last, "size must not grow with volatility");
            last = size;
        }
    }

    #[test]
    fn test_size_grows_with_confidence_above_knee() {
        let sizer = PositionSizer::with_defaults();
        let mut last = 0.0;

        for conf in [60.0, 70.0, 85.0, 100.0] {
            let mut inputs = base_inputs();
            inputs.confidence = conf;
            inputs.risk_percentage = 0.5;
            let size = sizer.calculate(&inputs).position_value;
            assert!(size >= last, "size must not shrink as confidence rises");
            last = size;
        }
    }

    #[test]
    fn test_low_confidence_shrinks_quadratically() {
        // Drop the floor so small sizes are observable
        let sizer = PositionSizer::new(SizingPolicy {
            min_position_percent: 0.0,
            ..SizingPolicy::default()
        })
        .unwrap();

        let size_at = |conf: f64| {
            let mut inputs = base_inputs();
            inputs.confidence = conf;
            inputs.risk_percentage = 1.0;
            sizer.calculate(&inputs).position_value
        };

        let s50 = size_at(50.0);
        let s40 = size_at(40.0);
        let s20 = size_at(20.0);
        assert!(s40 < s50);
        assert!(s20 < s40);
        // Quadratic: halving confidence quarters the factor
        assert_relative_eq!(s20 / s40, 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_high_correlation_reduces_size() {
        let sizer = PositionSizer::with_defaults();

        let size_at = |corr: f64| {
            let mut inputs = base_inputs();
            inputs.asset_correlation = corr;
            inputs.risk_percentage = 0.5;
            sizer.calculate(&inputs).position_value
        };

        assert_relative_eq!(size_at(0.2), size_at(0.5), epsilon = 1e-9);
        assert!(size_at(0.8) < size_at(0.5));
        // Fully correlated assets get no new allocation
        assert_eq!(size_at(1.0), 0.0);
    }

    #[test]
    fn test_policy_validation() {
        assert!(PositionSizer::new(SizingPolicy {
            max_position_percent: 0.0,
            ..SizingPolicy::default()
        })
        .is_err());
        assert!(PositionSizer::new(SizingPolicy {
            min_position_percent: 30.0,
            ..SizingPolicy::default()
        })
        .is_err());
    }
}
