use approx::assert_relative_eq;

use crate::indicators::*;

fn rising_closes(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + i as f64).collect()
}

#[test]
fn test_sma_length_and_warmup() {
    let data = rising_closes(10);
    let out = sma(&data, 3);

    assert_eq!(out.len(), data.len());
    assert!(out[0].is_nan());
    assert!(out[1].is_nan());
    assert_relative_eq!(out[2], 101.0, epsilon = 1e-10);
    assert_relative_eq!(out[9], 108.0, epsilon = 1e-10);
}

#[test]
fn test_sma_invalid_price_poisons_windows() {
    let mut data = rising_closes(10);
    data[4] = -1.0;
    let out = sma(&data, 3);

    // Every 3-wide window containing index 4 is NaN
    assert!(out[4].is_nan());
    assert!(out[5].is_nan());
    assert!(out[6].is_nan());
    // Windows past the bad point recover
    assert!(out[7].is_finite());
}

#[test]
fn test_ema_warmup_and_recovery() {
    let mut data = rising_closes(20);
    data[8] = f64::NAN;
    let out = ema(&data, 3);

    assert_eq!(out.len(), data.len());
    assert!(out[1].is_nan());
    assert!(out[2].is_finite());
    // Bad point resets the seed; the next seed needs 3 valid values
    assert!(out[8].is_nan());
    assert!(out[9].is_nan());
    assert!(out[10].is_nan());
    assert!(out[11].is_finite());
}

#[test]
fn test_rsi_all_gains_saturates() {
    let data = rising_closes(30);
    let out = rsi(&data, 14);

    assert_eq!(out.len(), data.len());
    assert!(out[13].is_nan());
    let last = out.last().unwrap();
    assert_relative_eq!(*last, 100.0, epsilon = 1e-6);
}

#[test]
fn test_rsi_mixed_series_in_range() {
    let data: Vec<f64> = (0..40)
        .map(|i| 100.0 + if i % 2 == 0 { 1.5 } else { -1.0 } * (i as f64 % 7.0))
        .collect();
    let out = rsi(&data, 14);

    for v in out.iter().filter(|v| v.is_finite()) {
        assert!(*v >= 0.0 && *v <= 100.0);
    }
}

#[test]
fn test_macd_histogram_same_length() {
    let data = rising_closes(60);
    let result = macd(&data, 12, 26, 9);

    assert_eq!(result.macd_line.len(), 60);
    assert_eq!(result.signal_line.len(), 60);
    assert_eq!(result.histogram.len(), 60);
    assert!(result.histogram.last().unwrap().is_finite());
}

#[test]
fn test_bollinger_bands_bracket_middle() {
    let data: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
    let bb = bollinger_bands(&data, 20, 2.0);

    for i in 19..30 {
        assert!(bb.upper[i] >= bb.middle[i]);
        assert!(bb.lower[i] <= bb.middle[i]);
    }
}

#[test]
fn test_atr_constant_range() {
    // Every bar spans exactly 2.0 with no gaps, so ATR converges to 2.0
    let n = 30;
    let highs: Vec<f64> = (0..n).map(|_| 101.0).collect();
    let lows: Vec<f64> = (0..n).map(|_| 99.0).collect();
    let closes: Vec<f64> = (0..n).map(|_| 100.0).collect();

    let out = atr(&highs, &lows, &closes, 14);
    assert_eq!(out.len(), n);
    assert!(out[13].is_nan());
    assert_relative_eq!(*out.last().unwrap(), 2.0, epsilon = 1e-9);
}

#[test]
fn test_atr_resets_after_invalid_bar() {
    let n = 40;
    let highs: Vec<f64> = (0..n).map(|_| 101.0).collect();
    let mut lows: Vec<f64> = (0..n).map(|_| 99.0).collect();
    let closes: Vec<f64> = (0..n).map(|_| 100.0).collect();
    lows[20] = 0.0;

    let out = atr(&highs, &lows, &closes, 14);
    assert!(out[20].is_nan());
    // Needs a fresh 14-bar warm-up after the invalid bar
    assert!(out[30].is_nan());
    assert!(out[34].is_finite());
}

#[test]
fn test_adx_strong_trend_reads_high() {
    let n = 80;
    let highs: Vec<f64> = (0..n).map(|i| 101.0 + i as f64).collect();
    let lows: Vec<f64> = (0..n).map(|i| 99.0 + i as f64).collect();
    let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();

    let out = adx(&highs, &lows, &closes, 14);
    assert_eq!(out.len(), n);
    let last = out.last().unwrap();
    assert!(last.is_finite());
    assert!(*last > 25.0, "persistent trend should read as strong, got {last}");
}

#[test]
fn test_parabolic_sar_tracks_below_uptrend() {
    let n = 30;
    let highs: Vec<f64> = (0..n).map(|i| 101.0 + i as f64).collect();
    let lows: Vec<f64> = (0..n).map(|i| 99.0 + i as f64).collect();

    let out = parabolic_sar(&highs, &lows, 0.02, 0.2);
    assert_eq!(out.len(), n);
    assert!(out[0].is_nan());
    for i in 2..n {
        assert!(out[i] < lows[i], "SAR should stay under price in an uptrend");
    }
}

#[test]
fn test_parabolic_sar_reverses_on_breakdown() {
    // Uptrend for 15 bars, then a sharp drop
    let mut highs: Vec<f64> = (0..15).map(|i| 101.0 + i as f64).collect();
    let mut lows: Vec<f64> = (0..15).map(|i| 99.0 + i as f64).collect();
    for i in 0..10 {
        highs.push(114.0 - 3.0 * i as f64);
        lows.push(112.0 - 3.0 * i as f64);
    }

    let out = parabolic_sar(&highs, &lows, 0.02, 0.2);
    let last = *out.last().unwrap();
    let last_high = *highs.last().unwrap();
    assert!(last > last_high, "SAR should flip above price after the reversal");
}
