use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use trading_core::is_valid_price;

/// Raw Kelly criterion percentage.
///
/// f* = (b*p - q) / b, with b the win/loss payoff ratio, p the win
/// probability and q = 1 - p. Returns 0 when the payoff ratio is
/// non-positive and clamps the result to 0-100.
pub fn kelly_percentage(win_probability: f64, payoff_ratio: f64) -> f64 {
    if payoff_ratio <= 0.0 || !payoff_ratio.is_finite() {
        return 0.0;
    }
    let p = win_probability.clamp(0.0, 1.0);
    let q = 1.0 - p;
    let raw = (payoff_ratio * p - q) / payoff_ratio;
    raw.clamp(0.0, 1.0) * 100.0
}

/// Fractional-Kelly position sizer.
///
/// Full Kelly overshoots badly when the win-rate estimate is noisy, so the
/// raw percentage is always scaled by `kelly_fraction` before it becomes an
/// allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KellySizer {
    /// Fractional multiplier applied to the raw Kelly percentage
    /// (0.25 = quarter Kelly)
    pub kelly_fraction: f64,

    /// Minimum position as percent of portfolio
    pub min_position_percent: f64,

    /// Maximum position as percent of portfolio
    pub max_position_percent: f64,
}

/// Kelly sizing recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KellyRecommendation {
    /// Raw Kelly percentage before the fractional multiplier
    pub kelly_percent: f64,

    /// Percent of portfolio actually allocated
    pub applied_percent: f64,

    pub position_value: f64,
    pub shares: f64,
    pub reasoning: String,
}

impl Default for KellySizer {
    fn default() -> Self {
        Self {
            kelly_fraction: 0.25, // Quarter Kelly
            min_position_percent: 1.0,
            max_position_percent: 10.0,
        }
    }
}

impl KellySizer {
    pub fn new(
        kelly_fraction: f64,
        min_position_percent: f64,
        max_position_percent: f64,
    ) -> Result<Self> {
        if kelly_fraction <= 0.0 || kelly_fraction > 1.0 {
            bail!("kelly_fraction must be between 0 and 1");
        }
        if min_position_percent < 0.0 || min_position_percent > max_position_percent {
            bail!("min_position_percent must be >= 0 and <= max_position_percent");
        }
        if max_position_percent <= 0.0 || max_position_percent > 100.0 {
            bail!("max_position_percent must be between 0 and 100");
        }
        Ok(Self {
            kelly_fraction,
            min_position_percent,
            max_position_percent,
        })
    }

    /// Safer defaults for small or volatile accounts
    pub fn conservative() -> Self {
        Self {
            kelly_fraction: 0.15,
            min_position_percent: 0.5,
            max_position_percent: 5.0,
        }
    }

    /// Higher risk tolerance
    pub fn aggressive() -> Self {
        Self {
            kelly_fraction: 0.5,
            min_position_percent: 2.0,
            max_position_percent: 20.0,
        }
    }

    /// Turn a win-probability / payoff estimate into a dollar allocation.
    pub fn recommend(
        &self,
        win_probability: f64,
        payoff_ratio: f64,
        account_balance: f64,
        current_price: f64,
    ) -> Result<KellyRecommendation> {
        if !account_balance.is_finite() || account_balance <= 0.0 {
            bail!("account balance must be positive");
        }
        if !is_valid_price(current_price) {
            bail!("current price {} is not a valid price", current_price);
        }
        if !(0.0..=1.0).contains(&win_probability) {
            bail!("win probability must be between 0 and 1");
        }

        let kelly_percent = kelly_percentage(win_probability, payoff_ratio);
        let fractional = kelly_percent * self.kelly_fraction;
        let applied_percent = fractional
            .max(self.min_position_percent)
            .min(self.max_position_percent);

        let position_value = account_balance * applied_percent / 100.0;
        let shares = (position_value / current_price).floor();

        Ok(KellyRecommendation {
            kelly_percent,
            applied_percent,
            position_value,
            shares,
            reasoning: format!(
                "Kelly {:.2}% (raw), {:.0}% fraction applied -> {:.2}% of portfolio \
                 (p={:.2}, b={:.2})",
                kelly_percent,
                self.kelly_fraction * 100.0,
                applied_percent,
                win_probability,
                payoff_ratio
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kelly_zero_for_non_positive_payoff() {
        assert_eq!(kelly_percentage(0.9, 0.0), 0.0);
        assert_eq!(kelly_percentage(0.9, -2.0), 0.0);
    }

    #[test]
    fn test_kelly_certain_win_is_full_allocation() {
        assert_relative_eq!(kelly_percentage(1.0, 2.0), 100.0, epsilon = 1e-10);
        assert_relative_eq!(kelly_percentage(1.0, 0.5), 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_kelly_classic_example() {
        // p=0.6, b=2 -> (2*0.6 - 0.4) / 2 = 0.4
        assert_relative_eq!(kelly_percentage(0.6, 2.0), 40.0, epsilon = 1e-10);
    }

    #[test]
    fn test_kelly_negative_edge_clamps_to_zero() {
        assert_eq!(kelly_percentage(0.3, 1.0), 0.0);
    }

    #[test]
    fn test_quarter_kelly_applied() {
        let sizer = KellySizer::default();
        let rec = sizer.recommend(0.6, 2.0, 100_000.0, 100.0).unwrap();

        // Raw 40%, quarter Kelly -> 10%, which is exactly the default max
        assert_relative_eq!(rec.kelly_percent, 40.0, epsilon = 1e-10);
        assert_relative_eq!(rec.applied_percent, 10.0, epsilon = 1e-10);
        assert_relative_eq!(rec.position_value, 10_000.0, epsilon = 1e-6);
        assert_eq!(rec.shares, 100.0);
    }

    #[test]
    fn test_no_edge_uses_minimum() {
        let sizer = KellySizer::default();
        let rec = sizer.recommend(0.5, 1.0, 100_000.0, 50.0).unwrap();

        assert_eq!(rec.kelly_percent, 0.0);
        assert_relative_eq!(rec.applied_percent, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_constructor_rejects_bad_fraction() {
        assert!(KellySizer::new(0.0, 1.0, 10.0).is_err());
        assert!(KellySizer::new(1.5, 1.0, 10.0).is_err());
        assert!(KellySizer::new(0.25, 12.0, 10.0).is_err());
    }
}
