pub mod adaptive;
pub mod kelly;

pub use adaptive::{MarketBias, PositionSizer, SizedPosition, SizingInputs, SizingPolicy};
pub use kelly::{kelly_percentage, KellyRecommendation, KellySizer};
