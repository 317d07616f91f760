use super::engine::BookingEngine;
use crate::domain::availability;
use crate::domain::booking::BookingId;
use crate::domain::room::RoomId;
use crate::domain::stay::Stay;
use crate::error::{BookingError, Result};
use chrono::NaiveDate;

impl BookingEngine {
    /// Whether `room` is free for `[check_in, check_out)`.
    ///
    /// Read-only. `excluding` skips one booking, for re-validating a booking
    /// against everyone else.
    pub async fn is_available(
        &self,
        room: RoomId,
        check_in: NaiveDate,
        check_out: NaiveDate,
        excluding: Option<BookingId>,
    ) -> Result<bool> {
        let stay = self.validate_stay(check_in, check_out)?;
        if self.rooms.get(room).await?.is_none() {
            return Err(BookingError::NotFound(format!("room {room}")));
        }
        let existing = self.bookings.for_room(room).await?;
        Ok(availability::is_free(&stay, &existing, excluding))
    }

    /// Builds a stay, rejecting inverted ranges and check-ins before today.
    pub(crate) fn validate_stay(&self, check_in: NaiveDate, check_out: NaiveDate) -> Result<Stay> {
        let stay = Stay::new(check_in, check_out)?;
        let today = self.clock.today();
        if check_in < today {
            return Err(BookingError::ValidationError(format!(
                "check-in {check_in} is in the past (today is {today})"
            )));
        }
        Ok(stay)
    }
}
