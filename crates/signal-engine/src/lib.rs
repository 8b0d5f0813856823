pub mod analyzer;
pub mod optimizer;
pub mod regime;

pub use analyzer::{AnalyzerConfig, Signal, SignalAction, StockAnalyzer};
pub use optimizer::{optimize_parameters, OptimizedParams, OptimizerConfig};
pub use regime::{
    Regime, RegimeConfidence, RegimeDetectionResult, RegimeDetector, RegimeMetrics,
    TrendDirection, VolatilityTier,
};
