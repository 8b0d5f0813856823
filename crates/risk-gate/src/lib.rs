pub mod gate;
pub mod models;
pub mod trade_gate;

pub use gate::RiskGate;
pub use models::*;
pub use trade_gate::TradeGate;
