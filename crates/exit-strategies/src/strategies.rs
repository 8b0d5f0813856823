use serde_json::json;
use trading_core::{is_valid_price, Position, Side};

use crate::models::*;

fn invalid_position(exit_type: ExitType, priority: i32) -> ExitSignal {
    ExitSignal::idle(
        exit_type,
        priority,
        ExitOutcome::InvalidPosition,
        "Invalid position data".to_string(),
    )
}

/// ATR trailing stop. The stop hangs off the best price seen since entry
/// and tightens as the unrealized gain grows: full distance below 5% gain,
/// 0.85x between 5-10%, 0.7x above 10%.
pub fn check_trailing_stop(
    position: &Position,
    snapshot: &MarketSnapshot,
    config: &TrailingStopConfig,
) -> ExitSignal {
    let exit_type = ExitType::TrailingStop;
    if position.validate().is_err() {
        return invalid_position(exit_type, config.priority);
    }
    if !is_valid_price(snapshot.current_price) {
        return ExitSignal::idle(
            exit_type,
            config.priority,
            ExitOutcome::InsufficientData,
            "Current price unavailable".to_string(),
        );
    }
    let atr = match snapshot.atr.filter(|a| a.is_finite() && *a > 0.0) {
        Some(atr) => atr,
        None => {
            return ExitSignal::idle(
                exit_type,
                config.priority,
                ExitOutcome::InsufficientData,
                "ATR unavailable".to_string(),
            )
        }
    };

    let gain = position.unrealized_gain(snapshot.current_price);
    let tighten = if gain < 0.05 {
        1.0
    } else if gain < 0.10 {
        0.85
    } else {
        0.7
    };
    let distance = atr * config.atr_multiplier * tighten;

    let (stop_level, breached) = match position.side {
        Side::Long => {
            let stop = position.highest_price_seen - distance;
            (stop, snapshot.current_price <= stop)
        }
        Side::Short => {
            let stop = position.lowest_price_seen + distance;
            (stop, snapshot.current_price >= stop)
        }
    };

    let metadata = json!({
        "stop_level": stop_level,
        "atr": atr,
        "tighten_factor": tighten,
        "unrealized_gain": gain,
    });

    if breached {
        ExitSignal::triggered(
            exit_type,
            config.priority,
            snapshot.current_price,
            format!(
                "Price {:.2} crossed trailing stop {:.2} ({}x ATR)",
                snapshot.current_price, stop_level, config.atr_multiplier
            ),
            metadata,
        )
    } else {
        let mut signal = ExitSignal::idle(
            exit_type,
            config.priority,
            ExitOutcome::NoTrigger,
            format!("Trailing stop armed at {:.2}", stop_level),
        );
        signal.metadata = metadata;
        signal
    }
}

/// Hard time limit on holding a position, with a soft decay factor reported
/// before the trigger fires.
pub fn check_time_exit(
    position: &Position,
    snapshot: &MarketSnapshot,
    config: &TimeExitConfig,
) -> ExitSignal {
    let exit_type = ExitType::TimeBased;
    if position.validate().is_err() {
        return invalid_position(exit_type, config.priority);
    }
    if config.max_holding_days <= 0 {
        return ExitSignal::idle(
            exit_type,
            config.priority,
            ExitOutcome::InsufficientData,
            "max_holding_days must be positive".to_string(),
        );
    }

    let days_held = position.days_held(snapshot.now).max(0);
    let decay = (days_held as f64 / config.max_holding_days as f64).min(1.0);
    let metadata = json!({
        "days_held": days_held,
        "max_holding_days": config.max_holding_days,
        "time_decay_factor": decay,
    });

    if days_held >= config.max_holding_days {
        ExitSignal::triggered(
            exit_type,
            config.priority,
            snapshot.current_price,
            format!(
                "Held {} days, exceeding the {}-day limit",
                days_held, config.max_holding_days
            ),
            metadata,
        )
    } else {
        let mut signal = ExitSignal::idle(
            exit_type,
            config.priority,
            ExitOutcome::NoTrigger,
            format!(
                "Held {}/{} days (decay {:.2})",
                days_held, config.max_holding_days, decay
            ),
        );
        signal.metadata = metadata;
        signal
    }
}

/// Parabolic SAR reversal: exit when the SAR flips from the trend-following
/// side of price to the opposite side between two observations.
pub fn check_sar_reversal(
    position: &Position,
    snapshot: &MarketSnapshot,
    config: &SarExitConfig,
) -> ExitSignal {
    let exit_type = ExitType::ParabolicSar;
    if position.validate().is_err() {
        return invalid_position(exit_type, config.priority);
    }
    if !is_valid_price(snapshot.current_price) {
        return ExitSignal::idle(
            exit_type,
            config.priority,
            ExitOutcome::InsufficientData,
            "Current price unavailable".to_string(),
        );
    }

    let (current_sar, previous_sar) = match (
        snapshot.current_sar.filter(|s| s.is_finite()),
        snapshot.previous_sar.filter(|s| s.is_finite()),
    ) {
        (Some(c), Some(p)) => (c, p),
        _ => {
            return ExitSignal::idle(
                exit_type,
                config.priority,
                ExitOutcome::InsufficientData,
                "SAR values unavailable".to_string(),
            )
        }
    };

    let price = snapshot.current_price;
    let reversed = match position.side {
        Side::Long => previous_sar < price && current_sar > price,
        Side::Short => previous_sar > price && current_sar < price,
    };

    if reversed {
        ExitSignal::triggered(
            exit_type,
            config.priority,
            price,
            format!(
                "Parabolic SAR flipped across price ({:.2} -> {:.2})",
                previous_sar, current_sar
            ),
            json!({ "current_sar": current_sar, "previous_sar": previous_sar }),
        )
    } else {
        ExitSignal::idle(
            exit_type,
            config.priority,
            ExitOutcome::NoTrigger,
            format!("SAR at {:.2}, no reversal", current_sar),
        )
    }
}

fn evaluate_condition(
    condition: &ExitCondition,
    snapshot: &MarketSnapshot,
) -> Option<bool> {
    let value = snapshot.indicators.get(condition.indicator)?;
    let threshold = condition.threshold;

    match condition.operator {
        ConditionOperator::Above => Some(value > threshold),
        ConditionOperator::Below => Some(value < threshold),
        ConditionOperator::Touch => {
            // A zero threshold means "touching the current price", used for
            // Bollinger-band touch conditions
            let reference = if threshold == 0.0 {
                if !is_valid_price(snapshot.current_price) {
                    return None;
                }
                snapshot.current_price
            } else {
                threshold
            };
            Some((value - reference).abs() <= reference.abs() * 0.01)
        }
        ConditionOperator::CrossAbove => {
            let previous = snapshot
                .previous_indicators
                .as_ref()?
                .get(condition.indicator)?;
            Some(previous <= threshold && value > threshold)
        }
        ConditionOperator::CrossBelow => {
            let previous = snapshot
                .previous_indicators
                .as_ref()?
                .get(condition.indicator)?;
            Some(previous >= threshold && value < threshold)
        }
    }
}

/// Compound indicator conditions combined with AND (`require_all`) or OR.
/// A condition whose indicator is missing cannot vote; if the remaining
/// votes cannot decide the combination, the strategy reports
/// `InsufficientData` instead of guessing.
pub fn check_compound_conditions(
    position: &Position,
    snapshot: &MarketSnapshot,
    config: &CompoundExitConfig,
) -> ExitSignal {
    let exit_type = ExitType::CompoundCondition;
    if position.validate().is_err() {
        return invalid_position(exit_type, config.priority);
    }
    if config.conditions.is_empty() {
        return ExitSignal::idle(
            exit_type,
            config.priority,
            ExitOutcome::InsufficientData,
            "No conditions configured".to_string(),
        );
    }

    let votes: Vec<Option<bool>> = config
        .conditions
        .iter()
        .map(|c| evaluate_condition(c, snapshot))
        .collect();
    let unevaluable = votes.iter().filter(|v| v.is_none()).count();

    let decided = if config.require_all {
        if votes.iter().any(|v| *v == Some(false)) {
            Some(false)
        } else if unevaluable > 0 {
            None
        } else {
            Some(true)
        }
    } else if votes.iter().any(|v| *v == Some(true)) {
        Some(true)
    } else if unevaluable > 0 {
        None
    } else {
        Some(false)
    };

    match decided {
        Some(true) => ExitSignal::triggered(
            exit_type,
            config.priority,
            snapshot.current_price,
            format!(
                "{} of {} conditions met ({})",
                votes.iter().filter(|v| **v == Some(true)).count(),
                config.conditions.len(),
                if config.require_all { "all required" } else { "any" }
            ),
            json!({ "conditions": config.conditions.len() }),
        ),
        Some(false) => ExitSignal::idle(
            exit_type,
            config.priority,
            ExitOutcome::NoTrigger,
            "Conditions not met".to_string(),
        ),
        None => ExitSignal::idle(
            exit_type,
            config.priority,
            ExitOutcome::InsufficientData,
            format!("{unevaluable} condition(s) could not evaluate"),
        ),
    }
}

/// Exit when price breaks the tracked period low (long) or high (short).
pub fn check_high_low_break(
    position: &Position,
    snapshot: &MarketSnapshot,
    config: &HighLowBreakConfig,
) -> ExitSignal {
    let exit_type = ExitType::HighLowBreak;
    if position.validate().is_err() {
        return invalid_position(exit_type, config.priority);
    }
    if !is_valid_price(snapshot.current_price) {
        return ExitSignal::idle(
            exit_type,
            config.priority,
            ExitOutcome::InsufficientData,
            "Current price unavailable".to_string(),
        );
    }

    let (level, broken, label) = match position.side {
        Side::Long => match snapshot.period_low.filter(|p| is_valid_price(*p)) {
            Some(low) => (low, snapshot.current_price < low, "period low"),
            None => {
                return ExitSignal::idle(
                    exit_type,
                    config.priority,
                    ExitOutcome::InsufficientData,
                    "Period low unavailable".to_string(),
                )
            }
        },
        Side::Short => match snapshot.period_high.filter(|p| is_valid_price(*p)) {
            Some(high) => (high, snapshot.current_price > high, "period high"),
            None => {
                return ExitSignal::idle(
                    exit_type,
                    config.priority,
                    ExitOutcome::InsufficientData,
                    "Period high unavailable".to_string(),
                )
            }
        },
    };

    if broken {
        ExitSignal::triggered(
            exit_type,
            config.priority,
            snapshot.current_price,
            format!(
                "Price {:.2} broke {} {:.2}",
                snapshot.current_price, label, level
            ),
            json!({ "level": level }),
        )
    } else {
        ExitSignal::idle(
            exit_type,
            config.priority,
            ExitOutcome::NoTrigger,
            format!("Price holding above {} {:.2}", label, level),
        )
    }
}
