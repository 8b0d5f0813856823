use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TradingError;
use crate::types::{is_valid_price, Side};

/// An open position. The extrema fields track the highest and lowest price
/// observed since entry; they only move in their own direction and start at
/// the entry price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub side: Side,
    pub entry_date: DateTime<Utc>,
    pub highest_price_seen: f64,
    pub lowest_price_seen: f64,
}

impl Position {
    /// Create a position at fill time. Extrema initialize to the entry price.
    pub fn open(
        symbol: impl Into<String>,
        entry_price: f64,
        quantity: f64,
        side: Side,
        entry_date: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            entry_price,
            quantity,
            side,
            entry_date,
            highest_price_seen: entry_price,
            lowest_price_seen: entry_price,
        }
    }

    /// Check the structural invariants: positive entry price and quantity,
    /// non-empty symbol.
    pub fn validate(&self) -> Result<(), TradingError> {
        if self.symbol.is_empty() {
            return Err(TradingError::InvalidData("position has no symbol".into()));
        }
        if !is_valid_price(self.entry_price) {
            return Err(TradingError::InvalidData(format!(
                "position {} has invalid entry price {}",
                self.symbol, self.entry_price
            )));
        }
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(TradingError::InvalidData(format!(
                "position {} has invalid quantity {}",
                self.symbol, self.quantity
            )));
        }
        Ok(())
    }

    /// Fold a new high/low observation into the extrema, returning the
    /// updated position. The high ratchets up and the low ratchets down;
    /// an observation can never move either against its direction.
    /// Invalid prices are ignored.
    pub fn record_price_observation(&self, high: f64, low: f64) -> Position {
        let mut next = self.clone();
        if is_valid_price(high) && high > next.highest_price_seen {
            next.highest_price_seen = high;
        }
        if is_valid_price(low) && low < next.lowest_price_seen {
            next.lowest_price_seen = low;
        }
        next
    }

    /// Add to the position at a new fill price. Entry price becomes the
    /// quantity-weighted average; extrema absorb the new fill.
    pub fn average_in(&self, fill_price: f64, fill_quantity: f64) -> Result<Position, TradingError> {
        if !is_valid_price(fill_price) {
            return Err(TradingError::InvalidData(format!(
                "averaging fill price {} is not a valid price",
                fill_price
            )));
        }
        if !fill_quantity.is_finite() || fill_quantity <= 0.0 {
            return Err(TradingError::InvalidData(format!(
                "averaging fill quantity {} must be positive",
                fill_quantity
            )));
        }

        let total_quantity = self.quantity + fill_quantity;
        let avg_price =
            (self.entry_price * self.quantity + fill_price * fill_quantity) / total_quantity;

        let mut next = self.clone();
        next.entry_price = avg_price;
        next.quantity = total_quantity;
        next = next.record_price_observation(fill_price, fill_price);
        Ok(next)
    }

    /// Whole days elapsed since entry.
    pub fn days_held(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entry_date).num_days()
    }

    /// Unrealized gain as a fraction of entry, positive when the position
    /// is in profit for its side.
    pub fn unrealized_gain(&self, current_price: f64) -> f64 {
        match self.side {
            Side::Long => (current_price - self.entry_price) / self.entry_price,
            Side::Short => (self.entry_price - current_price) / self.entry_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn position() -> Position {
        Position::open(
            "AAPL",
            100.0,
            50.0,
            Side::Long,
            Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap(),
        )
    }

    #[test]
    fn test_extrema_initialize_to_entry() {
        let pos = position();
        assert_eq!(pos.highest_price_seen, 100.0);
        assert_eq!(pos.lowest_price_seen, 100.0);
    }

    #[test]
    fn test_extrema_are_monotonic() {
        let pos = position()
            .record_price_observation(110.0, 95.0)
            .record_price_observation(105.0, 98.0);

        // Lower high and higher low must not move the extrema
        assert_eq!(pos.highest_price_seen, 110.0);
        assert_eq!(pos.lowest_price_seen, 95.0);
    }

    #[test]
    fn test_invalid_observation_ignored() {
        let pos = position().record_price_observation(f64::NAN, -5.0);
        assert_eq!(pos.highest_price_seen, 100.0);
        assert_eq!(pos.lowest_price_seen, 100.0);
    }

    #[test]
    fn test_average_in_weighted_price() {
        let pos = position().average_in(110.0, 50.0).unwrap();
        assert_eq!(pos.quantity, 100.0);
        assert!((pos.entry_price - 105.0).abs() < 1e-9);
        assert_eq!(pos.highest_price_seen, 110.0);
    }

    #[test]
    fn test_days_held_floors() {
        let pos = position();
        let now = pos.entry_date + chrono::Duration::hours(6 * 24 + 20);
        assert_eq!(pos.days_held(now), 6);
    }

    #[test]
    fn test_validate_rejects_bad_quantity() {
        let mut pos = position();
        pos.quantity = 0.0;
        assert!(pos.validate().is_err());
    }
}
