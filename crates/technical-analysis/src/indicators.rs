//! Indicator functions over price/OHLC series.
//!
//! Every function returns a vector the same length as its input. Entries
//! before the warm-up period are NaN. Any input that is not a valid price
//! (NaN, infinite, zero or negative) invalidates its own point and every
//! window or smoothing run that contains it; recursive indicators restart
//! their warm-up after an invalid point.

use trading_core::is_valid_price;

fn sanitize(data: &[f64]) -> Vec<f64> {
    data.iter()
        .map(|&x| if is_valid_price(x) { x } else { f64::NAN })
        .collect()
}

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    let data = sanitize(data);
    let mut result = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }

    for i in period - 1..data.len() {
        let window = &data[i + 1 - period..=i];
        if window.iter().all(|x| x.is_finite()) {
            result[i] = window.iter().sum::<f64>() / period as f64;
        }
    }
    result
}

/// Exponential Moving Average
///
/// Seeded with the SMA of the first `period` consecutive valid values;
/// re-seeds after any invalid input.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; data.len()];
    if period == 0 || data.is_empty() {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut prev: Option<f64> = None;
    let mut valid_run = 0usize;

    for i in 0..data.len() {
        let x = data[i];
        if !is_valid_price(x) {
            prev = None;
            valid_run = 0;
            continue;
        }
        valid_run += 1;

        match prev {
            Some(p) => {
                let v = (x - p) * multiplier + p;
                result[i] = v;
                prev = Some(v);
            }
            None if valid_run >= period => {
                let seed =
                    data[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
                result[i] = seed;
                prev = Some(seed);
            }
            None => {}
        }
    }
    result
}

/// Relative Strength Index (Wilder smoothing)
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    let data = sanitize(data);
    let mut result = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period + 1 {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    // Count of consecutive valid price changes accumulated so far
    let mut changes = 0usize;

    for i in 1..data.len() {
        if !data[i].is_finite() || !data[i - 1].is_finite() {
            changes = 0;
            avg_gain = 0.0;
            avg_loss = 0.0;
            continue;
        }

        let change = data[i] - data[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        changes += 1;

        if changes < period {
            avg_gain += gain;
            avg_loss += loss;
            continue;
        }
        if changes == period {
            avg_gain = (avg_gain + gain) / period as f64;
            avg_loss = (avg_loss + loss) / period as f64;
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }

        let rs = if avg_loss == 0.0 {
            100.0
        } else {
            avg_gain / avg_loss
        };
        result[i] = 100.0 - (100.0 / (1.0 + rs));
    }

    result
}

/// MACD (Moving Average Convergence Divergence)
pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(
    data: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> MacdResult {
    let n = data.len();
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || slow_period < fast_period {
        return MacdResult {
            macd_line: vec![f64::NAN; n],
            signal_line: vec![f64::NAN; n],
            histogram: vec![f64::NAN; n],
        };
    }

    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);

    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_macd(&macd_line, signal_period);
    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

// EMA over a series that may be negative (MACD line), so the is_valid_price
// sanitization does not apply — only finiteness gates a point.
fn ema_macd(data: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; data.len()];
    if period == 0 || data.is_empty() {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut prev: Option<f64> = None;
    let mut valid_run = 0usize;

    for i in 0..data.len() {
        let x = data[i];
        if !x.is_finite() {
            prev = None;
            valid_run = 0;
            continue;
        }
        valid_run += 1;

        match prev {
            Some(p) => {
                let v = (x - p) * multiplier + p;
                result[i] = v;
                prev = Some(v);
            }
            None if valid_run >= period => {
                let seed =
                    data[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
                result[i] = seed;
                prev = Some(seed);
            }
            None => {}
        }
    }
    result
}

/// Bollinger Bands
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    let n = data.len();
    let sanitized = sanitize(data);
    let middle = sma(data, period);
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];

    if period > 0 && n >= period {
        for i in period - 1..n {
            let mean = middle[i];
            if !mean.is_finite() {
                continue;
            }
            let window = &sanitized[i + 1 - period..=i];
            let variance =
                window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
            let std = variance.sqrt();
            upper[i] = mean + std_dev * std;
            lower[i] = mean - std_dev * std;
        }
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

/// Average True Range (Wilder smoothing)
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 || highs.len() != n || lows.len() != n {
        return result;
    }

    let mut smoothed = 0.0;
    let mut trs = 0usize;

    for i in 1..n {
        let tr = match true_range(highs[i], lows[i], closes[i - 1]) {
            Some(tr) => tr,
            None => {
                trs = 0;
                smoothed = 0.0;
                continue;
            }
        };
        trs += 1;

        if trs < period {
            smoothed += tr;
            continue;
        }
        if trs == period {
            smoothed = (smoothed + tr) / period as f64;
        } else {
            smoothed = (smoothed * (period - 1) as f64 + tr) / period as f64;
        }
        result[i] = smoothed;
    }

    result
}

fn true_range(high: f64, low: f64, prev_close: f64) -> Option<f64> {
    if !is_valid_price(high) || !is_valid_price(low) || !is_valid_price(prev_close) {
        return None;
    }
    Some(
        (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs()),
    )
}

/// Average Directional Index — trend strength on a 0-100 scale.
pub fn adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period * 2 + 1 || highs.len() != n || lows.len() != n {
        return result;
    }

    let mut sm_plus = 0.0;
    let mut sm_minus = 0.0;
    let mut sm_tr = 0.0;
    let mut adx_val = 0.0;
    // Consecutive valid bars since the last invalid input
    let mut bars = 0usize;
    let mut dx_count = 0usize;

    for i in 1..n {
        let valid = is_valid_price(highs[i])
            && is_valid_price(lows[i])
            && is_valid_price(highs[i - 1])
            && is_valid_price(lows[i - 1])
            && is_valid_price(closes[i - 1]);
        if !valid {
            bars = 0;
            dx_count = 0;
            sm_plus = 0.0;
            sm_minus = 0.0;
            sm_tr = 0.0;
            adx_val = 0.0;
            continue;
        }

        let up_move = highs[i] - highs[i - 1];
        let down_move = lows[i - 1] - lows[i];
        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };
        let tr = true_range(highs[i], lows[i], closes[i - 1]).unwrap_or(0.0);
        bars += 1;

        if bars <= period {
            sm_plus += plus_dm;
            sm_minus += minus_dm;
            sm_tr += tr;
            if bars < period {
                continue;
            }
        } else {
            sm_plus = sm_plus - sm_plus / period as f64 + plus_dm;
            sm_minus = sm_minus - sm_minus / period as f64 + minus_dm;
            sm_tr = sm_tr - sm_tr / period as f64 + tr;
        }

        let pdi = if sm_tr > 0.0 {
            100.0 * sm_plus / sm_tr
        } else {
            0.0
        };
        let mdi = if sm_tr > 0.0 {
            100.0 * sm_minus / sm_tr
        } else {
            0.0
        };
        let di_sum = pdi + mdi;
        let dx = if di_sum > 0.0 {
            100.0 * (pdi - mdi).abs() / di_sum
        } else {
            0.0
        };

        dx_count += 1;
        if dx_count < period {
            adx_val += dx;
            continue;
        }
        if dx_count == period {
            adx_val = (adx_val + dx) / period as f64;
        } else {
            adx_val = (adx_val * (period - 1) as f64 + dx) / period as f64;
        }
        result[i] = adx_val;
    }

    result
}

/// Parabolic SAR (stop-and-reverse)
///
/// `af_step` is the acceleration increment, `af_max` the acceleration cap.
/// The first output is NaN; the series restarts after any invalid bar.
pub fn parabolic_sar(highs: &[f64], lows: &[f64], af_step: f64, af_max: f64) -> Vec<f64> {
    let n = highs.len();
    let mut result = vec![f64::NAN; n];
    if n < 2 || lows.len() != n || af_step <= 0.0 || af_max < af_step {
        return result;
    }

    let mut state: Option<SarState> = None;

    for i in 1..n {
        if !is_valid_price(highs[i])
            || !is_valid_price(lows[i])
            || !is_valid_price(highs[i - 1])
            || !is_valid_price(lows[i - 1])
        {
            state = None;
            continue;
        }

        let s = match state.as_mut() {
            Some(s) => s,
            None => {
                let rising = highs[i] >= highs[i - 1];
                let init = SarState {
                    rising,
                    sar: if rising { lows[i - 1] } else { highs[i - 1] },
                    ep: if rising { highs[i] } else { lows[i] },
                    af: af_step,
                };
                result[i] = init.sar;
                state = Some(init);
                continue;
            }
        };

        let mut sar = s.sar + s.af * (s.ep - s.sar);
        if s.rising {
            // SAR may not enter the prior bar's range
            sar = sar.min(lows[i - 1]);
            if lows[i] < sar {
                // Reversal to falling
                sar = s.ep;
                s.rising = false;
                s.ep = lows[i];
                s.af = af_step;
            } else if highs[i] > s.ep {
                s.ep = highs[i];
                s.af = (s.af + af_step).min(af_max);
            }
        } else {
            sar = sar.max(highs[i - 1]);
            if highs[i] > sar {
                // Reversal to rising
                sar = s.ep;
                s.rising = true;
                s.ep = highs[i];
                s.af = af_step;
            } else if lows[i] < s.ep {
                s.ep = lows[i];
                s.af = (s.af + af_step).min(af_max);
            }
        }

        s.sar = sar;
        result[i] = sar;
    }

    result
}

struct SarState {
    rising: bool,
    sar: f64,
    ep: f64,
    af: f64,
}
