use serde::{Deserialize, Serialize};
use technical_analysis::{atr, rsi, sma};
use trading_core::Bar;

use exit_strategies::{
    CompoundExitConfig, ConditionOperator, ExitCondition, ExitStrategyConfig, HighLowBreakConfig,
    IndicatorId, SarExitConfig, TimeExitConfig, TrailingStopConfig,
};

use crate::optimizer::{optimize_parameters, OptimizedParams, OptimizerConfig};
use crate::regime::{
    Regime, RegimeConfidence, RegimeDetectionResult, RegimeDetector, TrendDirection,
    VolatilityTier,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn name(&self) -> &'static str {
        match self {
            SignalAction::Buy => "BUY",
            SignalAction::Sell => "SELL",
            SignalAction::Hold => "HOLD",
        }
    }
}

/// The externally visible decision output. Built fresh per analysis call
/// and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub action: SignalAction,
    /// 0-100 after regime adjustments
    pub confidence: f64,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    /// Expected favorable move in percent (signed; negative for sells)
    pub predicted_change: f64,
    pub regime: RegimeDetectionResult,
    /// Recommended exit strategies for the detected regime
    pub exit_plan: Vec<ExitStrategyConfig>,
    pub optimized_params: Option<OptimizedParams>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Bars below which analysis returns a zero-confidence HOLD
    pub min_history: usize,
    pub optimizer: OptimizerConfig,
    pub atr_period: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_history: 60,
            optimizer: OptimizerConfig::default(),
            atr_period: 14,
        }
    }
}

/// Orchestrates regime detection, parameter optimization and threshold
/// rules into one composite signal.
pub struct StockAnalyzer {
    config: AnalyzerConfig,
    detector: RegimeDetector,
}

impl StockAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            detector: RegimeDetector::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(AnalyzerConfig::default())
    }

    /// Produce a trade signal for a price history. Short histories yield a
    /// zero-confidence HOLD rather than an error; the output is a pure
    /// function of the window and config.
    pub fn analyze_stock(&self, symbol: &str, bars: &[Bar]) -> Signal {
        let regime = self.detector.detect(bars);

        if bars.len() < self.config.min_history {
            return self.hold(
                symbol,
                regime,
                None,
                format!(
                    "Insufficient history: {} bars (need {})",
                    bars.len(),
                    self.config.min_history
                ),
            );
        }

        let optimized = match optimize_parameters(bars, &self.config.optimizer) {
            Ok(params) => params,
            Err(e) => {
                return self.hold(symbol, regime, None, format!("Optimizer unavailable: {e}"))
            }
        };

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();

        let price = closes.last().copied().unwrap_or(f64::NAN);
        let rsi_now = rsi(&closes, optimized.rsi_period)
            .last()
            .copied()
            .unwrap_or(f64::NAN);
        let sma_now = sma(&closes, optimized.sma_period)
            .last()
            .copied()
            .unwrap_or(f64::NAN);
        let atr_now = atr(&highs, &lows, &closes, self.config.atr_period)
            .last()
            .copied()
            .unwrap_or(f64::NAN);

        if !price.is_finite() || !rsi_now.is_finite() || !sma_now.is_finite() {
            return self.hold(
                symbol,
                regime,
                Some(optimized),
                "Indicators not ready at the end of the window".to_string(),
            );
        }

        let oversold = self.config.optimizer.rsi_oversold;
        let overbought = self.config.optimizer.rsi_overbought;

        let action = if price > sma_now && rsi_now < oversold + 10.0 {
            SignalAction::Buy
        } else if price < sma_now && rsi_now > overbought {
            SignalAction::Sell
        } else if rsi_now < oversold {
            SignalAction::Buy
        } else if rsi_now > overbought {
            SignalAction::Sell
        } else {
            SignalAction::Hold
        };

        let confidence = adjust_confidence((rsi_now - 50.0).abs() * 2.0, action, &regime, rsi_now, oversold, overbought);

        let (target_price, stop_loss, predicted_change) =
            price_targets(action, price, atr_now, self.config.optimizer.atr_target_multiple);

        let reasoning = format!(
            "{}: price {:.2} vs SMA{} {:.2}, RSI{} {:.1}; {}",
            action.name(),
            price,
            optimized.sma_period,
            sma_now,
            optimized.rsi_period,
            rsi_now,
            regime.reasoning
        );

        tracing::info!(
            symbol,
            action = action.name(),
            confidence,
            regime = regime.regime.name(),
            "analysis complete"
        );

        Signal {
            symbol: symbol.to_string(),
            action,
            confidence,
            target_price,
            stop_loss,
            predicted_change,
            exit_plan: exit_plan_for(regime.regime, regime.volatility),
            regime,
            optimized_params: Some(optimized),
            reasoning,
        }
    }

    fn hold(
        &self,
        symbol: &str,
        regime: RegimeDetectionResult,
        optimized: Option<OptimizedParams>,
        reasoning: String,
    ) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            action: SignalAction::Hold,
            confidence: 0.0,
            target_price: None,
            stop_loss: None,
            predicted_change: 0.0,
            exit_plan: exit_plan_for(regime.regime, regime.volatility),
            regime,
            optimized_params: optimized,
            reasoning,
        }
    }
}

/// Scale raw RSI-distance confidence by the regime context and clamp to
/// 0-100.
fn adjust_confidence(
    base: f64,
    action: SignalAction,
    regime: &RegimeDetectionResult,
    rsi_now: f64,
    oversold: f64,
    overbought: f64,
) -> f64 {
    if action == SignalAction::Hold {
        return 0.0;
    }

    let mut confidence = base;

    if regime.confidence == RegimeConfidence::Initial {
        confidence *= 0.85;
    }
    if regime.volatility == VolatilityTier::High {
        confidence *= 0.85;
    }

    match regime.regime {
        Regime::Trending => {
            let aligned = matches!(
                (action, regime.trend_direction),
                (SignalAction::Buy, TrendDirection::Up)
                    | (SignalAction::Sell, TrendDirection::Down)
            );
            if aligned {
                confidence *= 1.15;
            } else {
                confidence *= 0.75;
            }
        }
        Regime::Ranging => {
            // Mean-reversion entries are the ones that work in a range
            let mean_reverting = (action == SignalAction::Buy && rsi_now < oversold + 10.0)
                || (action == SignalAction::Sell && rsi_now > overbought - 10.0);
            if mean_reverting {
                confidence *= 1.05;
            }
        }
        Regime::Unknown => {
            confidence *= 0.5;
        }
    }

    confidence.clamp(0.0, 100.0)
}

fn price_targets(
    action: SignalAction,
    price: f64,
    atr_now: f64,
    target_multiple: f64,
) -> (Option<f64>, Option<f64>, f64) {
    if action == SignalAction::Hold || !atr_now.is_finite() || atr_now <= 0.0 {
        return (None, None, 0.0);
    }

    let target_move = atr_now * target_multiple;
    let stop_move = atr_now * 2.0;
    match action {
        SignalAction::Buy => (
            Some(price + target_move),
            Some(price - stop_move),
            target_move / price * 100.0,
        ),
        SignalAction::Sell => (
            Some(price - target_move),
            Some(price + stop_move),
            -(target_move / price * 100.0),
        ),
        SignalAction::Hold => (None, None, 0.0),
    }
}

/// Regime-keyed exit-strategy bundle.
fn exit_plan_for(regime: Regime, volatility: VolatilityTier) -> Vec<ExitStrategyConfig> {
    match (regime, volatility) {
        (Regime::Trending, VolatilityTier::High) => vec![
            ExitStrategyConfig::TrailingStop(TrailingStopConfig::default()),
            ExitStrategyConfig::TimeBased(TimeExitConfig::default()),
            ExitStrategyConfig::HighLowBreak(HighLowBreakConfig::default()),
        ],
        (Regime::Trending, _) => vec![
            ExitStrategyConfig::TrailingStop(TrailingStopConfig::default()),
            ExitStrategyConfig::ParabolicSar(SarExitConfig::default()),
        ],
        (Regime::Ranging, VolatilityTier::High) => vec![
            ExitStrategyConfig::Compound(overbought_exhaustion_conditions()),
            ExitStrategyConfig::TimeBased(TimeExitConfig::default()),
            ExitStrategyConfig::HighLowBreak(HighLowBreakConfig::default()),
        ],
        (Regime::Ranging, _) => vec![
            ExitStrategyConfig::HighLowBreak(HighLowBreakConfig::default()),
            ExitStrategyConfig::TimeBased(TimeExitConfig::default()),
        ],
        (Regime::Unknown, _) => vec![
            ExitStrategyConfig::TrailingStop(TrailingStopConfig {
                atr_multiplier: 1.5,
                priority: 3,
            }),
            ExitStrategyConfig::TimeBased(TimeExitConfig {
                max_holding_days: 5,
                priority: 2,
            }),
        ],
    }
}

/// RSI exhaustion or an upper-band touch, either one is enough to leave a
/// stretched ranging market.
fn overbought_exhaustion_conditions() -> CompoundExitConfig {
    CompoundExitConfig {
        conditions: vec![
            ExitCondition {
                indicator: IndicatorId::Rsi,
                threshold: 70.0,
                operator: ConditionOperator::Above,
            },
            ExitCondition {
                indicator: IndicatorId::BollingerUpper,
                threshold: 0.0,
                operator: ConditionOperator::Touch,
            },
        ],
        require_all: false,
        priority: 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1_000.0,
            })
            .collect()
    }

    #[test]
    fn test_short_history_holds_with_zero_confidence() {
        let analyzer = StockAnalyzer::with_defaults();
        let bars = make_bars(&[100.0; 20]);

        let signal = analyzer.analyze_stock("AAPL", &bars);
        assert_eq!(signal.action, SignalAction::Hold);
        assert_eq!(signal.confidence, 0.0);
        assert_eq!(signal.regime.regime, Regime::Unknown);
        assert!(signal.optimized_params.is_none());
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let analyzer = StockAnalyzer::with_defaults();
        let closes: Vec<f64> = (0..150)
            .map(|i| 100.0 + (i as f64 * 0.21).sin() * 6.0 + i as f64 * 0.1)
            .collect();
        let bars = make_bars(&closes);

        let a = analyzer.analyze_stock("MSFT", &bars);
        let b = analyzer.analyze_stock("MSFT", &bars);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_confidence_stays_in_bounds() {
        let analyzer = StockAnalyzer::with_defaults();
        let closes: Vec<f64> = (0..200)
            .map(|i| 100.0 + (i as f64 * 0.5).sin() * 10.0)
            .collect();
        let bars = make_bars(&closes);

        let signal = analyzer.analyze_stock("NVDA", &bars);
        assert!(signal.confidence >= 0.0 && signal.confidence <= 100.0);
    }

    #[test]
    fn test_buy_sell_carry_targets() {
        let analyzer = StockAnalyzer::with_defaults();
        // Steady decline ends deeply oversold
        let closes: Vec<f64> = (0..100).map(|i| 300.0 - i as f64 * 1.2).collect();
        let bars = make_bars(&closes);

        let signal = analyzer.analyze_stock("META", &bars);
        if signal.action != SignalAction::Hold {
            let price = closes.last().unwrap();
            let target = signal.target_price.unwrap();
            let stop = signal.stop_loss.unwrap();
            match signal.action {
                SignalAction::Buy => {
                    assert!(target > *price);
                    assert!(stop < *price);
                    assert!(signal.predicted_change > 0.0);
                }
                SignalAction::Sell => {
                    assert!(target < *price);
                    assert!(stop > *price);
                    assert!(signal.predicted_change < 0.0);
                }
                SignalAction::Hold => unreachable!(),
            }
        }
    }

    #[test]
    fn test_exit_plan_tracks_regime() {
        use exit_strategies::ExitType;

        let plan = exit_plan_for(Regime::Trending, VolatilityTier::Low);
        let types: Vec<ExitType> = plan.iter().map(|c| c.exit_type()).collect();
        assert_eq!(types, vec![ExitType::TrailingStop, ExitType::ParabolicSar]);

        let plan = exit_plan_for(Regime::Ranging, VolatilityTier::High);
        let types: Vec<ExitType> = plan.iter().map(|c| c.exit_type()).collect();
        assert_eq!(
            types,
            vec![
                ExitType::CompoundCondition,
                ExitType::TimeBased,
                ExitType::HighLowBreak
            ]
        );

        let plan = exit_plan_for(Regime::Unknown, VolatilityTier::Low);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_hold_signal_has_no_targets() {
        let analyzer = StockAnalyzer::with_defaults();
        // Gentle drift keeps RSI near neutral
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + (i % 4) as f64 * 0.05).collect();
        let bars = make_bars(&closes);

        let signal = analyzer.analyze_stock("KO", &bars);
        if signal.action == SignalAction::Hold {
            assert!(signal.target_price.is_none());
            assert!(signal.stop_loss.is_none());
            assert_eq!(signal.predicted_change, 0.0);
            assert_eq!(signal.confidence, 0.0);
        }
    }
}
