pub mod error;
pub mod position;
pub mod types;

pub use error::TradingError;
pub use position::Position;
pub use types::{is_valid_price, Bar, OrderType, Side};
