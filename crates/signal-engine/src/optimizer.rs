use anyhow::{bail, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use technical_analysis::{atr, rsi, sma};
use trading_core::Bar;

/// Search space and simulation settings for the RSI/SMA grid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub rsi_periods: Vec<usize>,
    pub sma_periods: Vec<usize>,
    /// Bars between simulated signal checks
    pub stride: usize,
    /// Bars a simulated trade is given to reach its target
    pub holding_horizon: usize,
    /// Favorable-move target as a multiple of ATR
    pub atr_target_multiple: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            rsi_periods: vec![7, 14, 21],
            sma_periods: vec![10, 20, 50],
            stride: 5,
            holding_horizon: 10,
            atr_target_multiple: 1.5,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

/// Winning parameter pair with its in-sample hit rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedParams {
    pub rsi_period: usize,
    pub sma_period: usize,
    /// Fraction of simulated triggers that reached their target
    pub hit_rate: f64,
    /// Number of simulated triggers behind the hit rate
    pub samples: usize,
}

const ATR_PERIOD: usize = 14;

/// Grid-search the RSI/SMA period pair that maximized the historical
/// directional hit rate over this window.
///
/// Candidates are scored independently (in parallel) and selected in
/// ascending (rsi_period, sma_period) order, so a tie on hit rate always
/// resolves to the smallest periods rather than to iteration accident.
pub fn optimize_parameters(bars: &[Bar], config: &OptimizerConfig) -> Result<OptimizedParams> {
    if config.rsi_periods.is_empty() || config.sma_periods.is_empty() {
        bail!("optimizer search space is empty");
    }
    if config.rsi_periods.iter().any(|p| *p == 0) || config.sma_periods.iter().any(|p| *p == 0) {
        bail!("indicator periods must be positive");
    }
    if config.stride == 0 || config.holding_horizon == 0 {
        bail!("stride and holding_horizon must be positive");
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let atr_series = atr(&highs, &lows, &closes, ATR_PERIOD);

    let mut candidates: Vec<(usize, usize)> = Vec::new();
    for &rsi_period in &config.rsi_periods {
        for &sma_period in &config.sma_periods {
            candidates.push((rsi_period, sma_period));
        }
    }
    candidates.sort_unstable();
    candidates.dedup();

    let scored: Vec<OptimizedParams> = candidates
        .par_iter()
        .map(|&(rsi_period, sma_period)| {
            let (hit_rate, samples) =
                simulate_hit_rate(&closes, &atr_series, rsi_period, sma_period, config);
            OptimizedParams {
                rsi_period,
                sma_period,
                hit_rate,
                samples,
            }
        })
        .collect();

    // Strictly-greater keeps the first (smallest-period) candidate on ties
    let mut best = scored[0].clone();
    for candidate in &scored[1..] {
        if candidate.hit_rate > best.hit_rate {
            best = candidate.clone();
        }
    }

    tracing::debug!(
        rsi = best.rsi_period,
        sma = best.sma_period,
        hit_rate = best.hit_rate,
        samples = best.samples,
        "parameter grid search complete"
    );

    Ok(best)
}

/// Replay historical threshold triggers at a fixed stride and measure how
/// often price moved favorably by the ATR-scaled target within the horizon.
fn simulate_hit_rate(
    closes: &[f64],
    atr_series: &[f64],
    rsi_period: usize,
    sma_period: usize,
    config: &OptimizerConfig,
) -> (f64, usize) {
    let rsi_series = rsi(closes, rsi_period);
    let sma_series = sma(closes, sma_period);

    let warmup = rsi_period.max(sma_period).max(ATR_PERIOD) + 1;
    let end = closes.len().saturating_sub(config.holding_horizon);
    let mut hits = 0usize;
    let mut total = 0usize;

    let mut i = warmup;
    while i < end {
        let price = closes[i];
        let rsi_v = rsi_series[i];
        let sma_v = sma_series[i];
        let atr_v = atr_series[i];
        if !price.is_finite() || !rsi_v.is_finite() || !sma_v.is_finite() || !atr_v.is_finite() {
            i += config.stride;
            continue;
        }

        let target_move = atr_v * config.atr_target_multiple;
        let buy = price > sma_v && rsi_v < config.rsi_oversold + 10.0;
        let sell = price < sma_v && rsi_v > config.rsi_overbought;

        if buy {
            total += 1;
            let target = price + target_move;
            if closes[i + 1..=i + config.holding_horizon]
                .iter()
                .any(|c| *c >= target)
            {
                hits += 1;
            }
        } else if sell {
            total += 1;
            let target = price - target_move;
            if closes[i + 1..=i + config.holding_horizon]
                .iter()
                .any(|c| *c <= target)
            {
                hits += 1;
            }
        }

        i += config.stride;
    }

    if total == 0 {
        (0.0, 0)
    } else {
        (hits as f64 / total as f64, total)
    }
}
