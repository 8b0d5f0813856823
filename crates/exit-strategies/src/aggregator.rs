use trading_core::Position;

use crate::models::{ExitSignal, ExitStrategyConfig, MarketSnapshot};
use crate::strategies::*;

/// Evaluate one configured strategy.
pub fn evaluate_strategy(
    position: &Position,
    snapshot: &MarketSnapshot,
    config: &ExitStrategyConfig,
) -> ExitSignal {
    match config {
        ExitStrategyConfig::TrailingStop(c) => check_trailing_stop(position, snapshot, c),
        ExitStrategyConfig::TimeBased(c) => check_time_exit(position, snapshot, c),
        ExitStrategyConfig::ParabolicSar(c) => check_sar_reversal(position, snapshot, c),
        ExitStrategyConfig::Compound(c) => check_compound_conditions(position, snapshot, c),
        ExitStrategyConfig::HighLowBreak(c) => check_high_low_break(position, snapshot, c),
    }
}

/// Evaluate every configured strategy against the same snapshot and return
/// all signals, triggered or not, in configuration order. Useful for
/// surfacing soft state (armed stop levels, time decay) in a UI.
pub fn evaluate_all(
    position: &Position,
    snapshot: &MarketSnapshot,
    configs: &[ExitStrategyConfig],
) -> Vec<ExitSignal> {
    configs
        .iter()
        .map(|c| evaluate_strategy(position, snapshot, c))
        .collect()
}

/// Run all configured strategies and return the winning triggered signal,
/// or None when nothing fired.
///
/// Ties on numeric priority resolve in favor of stop-class strategies
/// (trailing stop, high/low break); any remaining tie goes to the earlier
/// entry in the configured list.
pub fn evaluate_exit_strategies(
    position: &Position,
    snapshot: &MarketSnapshot,
    configs: &[ExitStrategyConfig],
) -> Option<ExitSignal> {
    let mut best: Option<ExitSignal> = None;

    for signal in evaluate_all(position, snapshot, configs) {
        if !signal.should_exit {
            continue;
        }
        let wins = match &best {
            None => true,
            Some(current) => {
                signal.priority > current.priority
                    || (signal.priority == current.priority
                        && signal.exit_type.is_stop_class()
                        && !current.exit_type.is_stop_class())
            }
        };
        if wins {
            best = Some(signal);
        }
    }

    if let Some(signal) = &best {
        tracing::info!(
            exit_type = signal.exit_type.name(),
            priority = signal.priority,
            reason = %signal.reason,
            "exit triggered"
        );
    }

    best
}
