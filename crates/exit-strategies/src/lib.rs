pub mod aggregator;
pub mod models;
pub mod strategies;

pub use aggregator::{evaluate_all, evaluate_exit_strategies, evaluate_strategy};
pub use models::{
    ConditionOperator, ExitCondition, ExitOutcome, ExitSignal, ExitStrategyConfig, ExitType,
    IndicatorId, IndicatorValues, MarketSnapshot,
};
pub use models::{
    CompoundExitConfig, HighLowBreakConfig, SarExitConfig, TimeExitConfig, TrailingStopConfig,
};
