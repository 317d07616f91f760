use super::booking::{Booking, BookingId};
use super::stay::Stay;

/// Returns the first booking that holds the room during `requested`.
///
/// Only PENDING and CONFIRMED bookings occupy the calendar; `excluding` lets
/// a booking be re-validated against everyone but itself.
pub fn find_conflict<'a, I>(
    requested: &Stay,
    existing: I,
    excluding: Option<BookingId>,
) -> Option<&'a Booking>
where
    I: IntoIterator<Item = &'a Booking>,
{
    existing.into_iter().find(|booking| {
        booking.status.holds_room()
            && Some(booking.id) != excluding
            && booking.stay.overlaps(requested)
    })
}

pub fn is_free<'a, I>(requested: &Stay, existing: I, excluding: Option<BookingId>) -> bool
where
    I: IntoIterator<Item = &'a Booking>,
{
    find_conflict(requested, existing, excluding).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::{BookingRequest, BookingStatus};
    use crate::domain::money::Amount;
    use crate::domain::room::{Room, RoomId, RoomType};
    use crate::domain::user::UserId;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn stay(from: u32, to: u32) -> Stay {
        Stay::new(
            NaiveDate::from_ymd_opt(2027, 1, from).unwrap(),
            NaiveDate::from_ymd_opt(2027, 1, to).unwrap(),
        )
        .unwrap()
    }

    fn booking(from: u32, to: u32) -> Booking {
        let room = Room::new(RoomId(1), RoomType::Double, Amount::new(dec!(100)).unwrap(), 2);
        let request = BookingRequest {
            room: RoomId(1),
            owner: UserId(1),
            created_by: UserId(1),
            stay: stay(from, to),
            guests: 1,
            special_requests: None,
        };
        Booking::new(&room, request, Utc::now()).unwrap()
    }

    #[test]
    fn test_cancelled_bookings_do_not_block() {
        let mut cancelled = booking(10, 12);
        cancelled.status = BookingStatus::Cancelled;
        assert!(is_free(&stay(10, 12), [&cancelled], None));
    }

    #[test]
    fn test_confirmed_and_pending_block() {
        let pending = booking(10, 12);
        let mut confirmed = booking(12, 15);
        confirmed.status = BookingStatus::Confirmed;
        let existing = vec![pending.clone(), confirmed];

        assert!(!is_free(&stay(11, 13), &existing, None));
        assert!(!is_free(&stay(14, 16), &existing, None));
        assert!(is_free(&stay(15, 18), &existing, None));
        assert!(is_free(&stay(8, 10), &existing, None));

        let conflict = find_conflict(&stay(9, 11), &existing, None).unwrap();
        assert_eq!(conflict.id, pending.id);
    }

    #[test]
    fn test_excluding_self_for_revalidation() {
        let existing = booking(10, 12);
        assert!(!is_free(&stay(10, 12), [&existing], None));
        assert!(is_free(&stay(10, 12), [&existing], Some(existing.id)));
    }
}
