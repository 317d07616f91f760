use super::money::Amount;
use super::stay::Stay;
use crate::error::BookingError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u32);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Single,
    Double,
    Suite,
    Family,
}

/// A bookable unit of inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub room_type: RoomType,
    pub price_per_night: Amount,
    pub capacity: u8,
    pub active: bool,
}

impl Room {
    pub fn new(id: RoomId, room_type: RoomType, price_per_night: Amount, capacity: u8) -> Self {
        Self {
            id,
            room_type,
            price_per_night,
            capacity,
            active: true,
        }
    }

    /// Price of a stay at the current nightly rate.
    pub fn quote(&self, stay: &Stay) -> Result<Amount, BookingError> {
        self.price_per_night.times(stay.nights())
    }

    pub fn check_occupancy(&self, guests: u8) -> Result<(), BookingError> {
        if guests == 0 {
            return Err(BookingError::ValidationError(
                "A booking needs at least one guest".to_string(),
            ));
        }
        if guests > self.capacity {
            return Err(BookingError::ValidationError(format!(
                "Room {} holds {} guests, {} requested",
                self.id, self.capacity, guests
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_uses_nightly_rate() {
        let room = Room::new(RoomId(1), RoomType::Double, Amount::new(dec!(100)).unwrap(), 2);
        let stay = Stay::new(
            NaiveDate::from_ymd_opt(2027, 1, 10).unwrap(),
            NaiveDate::from_ymd_opt(2027, 1, 12).unwrap(),
        )
        .unwrap();
        assert_eq!(room.quote(&stay).unwrap().value(), dec!(200));
    }

    #[test]
    fn test_occupancy_limits() {
        let room = Room::new(RoomId(1), RoomType::Single, Amount::new(dec!(50)).unwrap(), 1);
        assert!(room.check_occupancy(1).is_ok());
        assert!(matches!(
            room.check_occupancy(2),
            Err(BookingError::ValidationError(_))
        ));
        assert!(room.check_occupancy(0).is_err());
    }
}
