use serde::{Deserialize, Serialize};
use technical_analysis::{adx, atr};
use trading_core::Bar;

/// Market regime classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    /// Directional movement with strong trend readings
    Trending,

    /// Sideways movement without directional persistence
    Ranging,

    /// Unable to classify (insufficient data)
    Unknown,
}

impl Regime {
    pub fn name(&self) -> &'static str {
        match self {
            Regime::Trending => "Trending",
            Regime::Ranging => "Ranging",
            Regime::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityTier {
    High,
    Medium,
    Low,
}

/// A freshly detected regime is `Initial` until the same classification has
/// held across the confirmation span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeConfidence {
    Initial,
    Confirmed,
}

/// Intermediate measurements behind a classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeMetrics {
    /// ADX trend-strength reading (0-100)
    pub adx: f64,

    /// Average True Range in price units
    pub atr: f64,

    /// ATR as percent of the last close
    pub atr_percent: f64,

    /// Linear-regression slope of recent closes, normalized by price
    pub trend_strength: f64,

    /// Standard deviation of bar-to-bar returns
    pub volatility: f64,

    /// Directional movement / total movement (1.0 = straight line)
    pub range_efficiency: f64,

    pub sample_size: usize,
}

impl RegimeMetrics {
    fn empty(sample_size: usize) -> Self {
        Self {
            adx: 0.0,
            atr: 0.0,
            atr_percent: 0.0,
            trend_strength: 0.0,
            volatility: 0.0,
            range_efficiency: 0.0,
            sample_size,
        }
    }
}

/// Regime detection result. A pure function of the supplied window; calling
/// twice with the same bars yields the same result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeDetectionResult {
    pub regime: Regime,
    pub trend_direction: TrendDirection,
    pub volatility: VolatilityTier,
    pub adx: f64,
    pub atr: f64,
    pub confidence: RegimeConfidence,
    /// How many trailing observations produced this same classification
    pub days_in_regime: usize,
    pub metrics: RegimeMetrics,
    pub reasoning: String,
}

/// Rule-based market regime detector.
pub struct RegimeDetector {
    min_bars: usize,
    adx_period: usize,
    /// Normalized slope above which a trend counts as directional
    trend_threshold: f64,
    /// Observations the classification must hold before it is Confirmed
    confirmation_span: usize,
}

const ADX_TRENDING: f64 = 25.0;
const ATR_PERCENT_HIGH: f64 = 3.0;
const ATR_PERCENT_MEDIUM: f64 = 1.5;
// How far back the days-in-regime scan walks before giving up
const MAX_REGIME_LOOKBACK: usize = 30;

impl RegimeDetector {
    pub fn new() -> Self {
        Self {
            min_bars: 50,
            adx_period: 14,
            trend_threshold: 0.001,
            confirmation_span: 5,
        }
    }

    pub fn min_bars(&self) -> usize {
        self.min_bars
    }

    /// Classify the regime over a bar window.
    pub fn detect(&self, bars: &[Bar]) -> RegimeDetectionResult {
        if bars.len() < self.min_bars {
            return RegimeDetectionResult {
                regime: Regime::Unknown,
                trend_direction: TrendDirection::Neutral,
                volatility: VolatilityTier::Low,
                adx: 0.0,
                atr: 0.0,
                confidence: RegimeConfidence::Initial,
                days_in_regime: 0,
                metrics: RegimeMetrics::empty(bars.len()),
                reasoning: format!(
                    "Insufficient data: {} bars (need {})",
                    bars.len(),
                    self.min_bars
                ),
            };
        }

        let metrics = self.calculate_metrics(bars);
        let (regime, direction) = self.classify(&metrics);
        let volatility = volatility_tier(metrics.atr_percent);

        // Walk back one bar at a time and count how long this exact
        // classification has held
        let mut days_in_regime = 1usize;
        for back in 1..=MAX_REGIME_LOOKBACK {
            if bars.len() < self.min_bars + back {
                break;
            }
            let window = &bars[..bars.len() - back];
            let earlier = self.calculate_metrics(window);
            if self.classify(&earlier) != (regime, direction) {
                break;
            }
            days_in_regime += 1;
        }

        let confidence = if days_in_regime >= self.confirmation_span {
            RegimeConfidence::Confirmed
        } else {
            RegimeConfidence::Initial
        };

        let reasoning = format!(
            "{} (ADX {:.1}, trend {:.4}, efficiency {:.2}, ATR {:.2}%)",
            regime.name(),
            metrics.adx,
            metrics.trend_strength,
            metrics.range_efficiency,
            metrics.atr_percent
        );

        RegimeDetectionResult {
            regime,
            trend_direction: direction,
            volatility,
            adx: metrics.adx,
            atr: metrics.atr,
            confidence,
            days_in_regime,
            metrics,
            reasoning,
        }
    }

    fn classify(&self, metrics: &RegimeMetrics) -> (Regime, TrendDirection) {
        let direction = if metrics.trend_strength > self.trend_threshold {
            TrendDirection::Up
        } else if metrics.trend_strength < -self.trend_threshold {
            TrendDirection::Down
        } else {
            TrendDirection::Neutral
        };

        let trending = metrics.adx > ADX_TRENDING
            && direction != TrendDirection::Neutral
            && metrics.range_efficiency > 0.3;

        if trending {
            (Regime::Trending, direction)
        } else {
            (Regime::Ranging, direction)
        }
    }

    fn calculate_metrics(&self, bars: &[Bar]) -> RegimeMetrics {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();

        let adx_value = adx(&highs, &lows, &closes, self.adx_period)
            .last()
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0);
        let atr_value = atr(&highs, &lows, &closes, self.adx_period)
            .last()
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0);

        let last_close = closes.last().copied().unwrap_or(0.0);
        let atr_percent = if last_close > 0.0 {
            atr_value / last_close * 100.0
        } else {
            0.0
        };

        RegimeMetrics {
            adx: adx_value,
            atr: atr_value,
            atr_percent,
            trend_strength: trend_strength(&closes),
            volatility: return_volatility(&closes),
            range_efficiency: range_efficiency(&closes),
            sample_size: bars.len(),
        }
    }
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn volatility_tier(atr_percent: f64) -> VolatilityTier {
    if atr_percent >= ATR_PERCENT_HIGH {
        VolatilityTier::High
    } else if atr_percent >= ATR_PERCENT_MEDIUM {
        VolatilityTier::Medium
    } else {
        VolatilityTier::Low
    }
}

/// Linear-regression slope of the last 20 closes, normalized by the average
/// price so it is comparable across symbols.
fn trend_strength(closes: &[f64]) -> f64 {
    const LOOKBACK: usize = 20;
    if closes.len() < LOOKBACK {
        return 0.0;
    }
    let recent = &closes[closes.len() - LOOKBACK..];
    let n = LOOKBACK as f64;

    let sum_x: f64 = (0..LOOKBACK).sum::<usize>() as f64;
    let sum_y: f64 = recent.iter().sum();
    let sum_xy: f64 = recent.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..LOOKBACK).map(|i| (i * i) as f64).sum();

    let denom = n * sum_x2 - sum_x * sum_x;
    if denom == 0.0 {
        return 0.0;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let avg_price = sum_y / n;
    if avg_price == 0.0 {
        return 0.0;
    }
    slope / avg_price
}

/// Standard deviation of bar-to-bar returns.
fn return_volatility(closes: &[f64]) -> f64 {
    if closes.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.is_empty() {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    variance.sqrt()
}

/// Net movement divided by total movement; 1.0 is a perfectly straight path.
fn range_efficiency(closes: &[f64]) -> f64 {
    if closes.len() < 2 {
        return 0.0;
    }
    let net = (closes[closes.len() - 1] - closes[0]).abs();
    let total: f64 = closes.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    if total == 0.0 {
        return 0.0;
    }
    net / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn make_bars(count: usize, step: f64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let base = 100.0 + i as f64 * step;
                Bar {
                    timestamp: start + Duration::days(i as i64),
                    open: base,
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base,
                    volume: 1_000.0,
                }
            })
            .collect()
    }

    #[test]
    fn test_insufficient_data_is_unknown() {
        let detector = RegimeDetector::new();
        let result = detector.detect(&make_bars(10, 0.5));

        assert_eq!(result.regime, Regime::Unknown);
        assert_eq!(result.confidence, RegimeConfidence::Initial);
        assert_eq!(result.days_in_regime, 0);
    }

    #[test]
    fn test_uptrend_is_trending_up() {
        let detector = RegimeDetector::new();
        let result = detector.detect(&make_bars(100, 0.5));

        assert_eq!(result.regime, Regime::Trending);
        assert_eq!(result.trend_direction, TrendDirection::Up);
        assert!(result.metrics.trend_strength > 0.0);
        assert!(result.adx > ADX_TRENDING);
    }

    #[test]
    fn test_downtrend_is_trending_down() {
        let detector = RegimeDetector::new();
        let result = detector.detect(&make_bars(100, -0.4));

        assert_eq!(result.regime, Regime::Trending);
        assert_eq!(result.trend_direction, TrendDirection::Down);
    }

    #[test]
    fn test_persistent_regime_is_confirmed() {
        let detector = RegimeDetector::new();
        let result = detector.detect(&make_bars(100, 0.5));

        assert!(result.days_in_regime >= 5);
        assert_eq!(result.confidence, RegimeConfidence::Confirmed);
    }

    #[test]
    fn test_flat_series_is_ranging() {
        let detector = RegimeDetector::new();
        // Small oscillation around 100
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars: Vec<Bar> = (0..100)
            .map(|i| {
                let base = 100.0 + if i % 2 == 0 { 0.3 } else { -0.3 };
                Bar {
                    timestamp: start + Duration::days(i as i64),
                    open: base,
                    high: base + 0.5,
                    low: base - 0.5,
                    close: base,
                    volume: 1_000.0,
                }
            })
            .collect();

        let result = detector.detect(&bars);
        assert_eq!(result.regime, Regime::Ranging);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let detector = RegimeDetector::new();
        let bars = make_bars(80, 0.3);

        let a = detector.detect(&bars);
        let b = detector.detect(&bars);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
