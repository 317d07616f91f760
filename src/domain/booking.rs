//! Booking state machine.
//!
//! A booking's `status` and `payment_status` only change through the methods
//! on [`Booking`]; each method validates the transition table and returns
//! `InvalidTransition` naming the guard that failed.

use super::money::Amount;
use super::room::{Room, RoomId};
use super::stay::Stay;
use super::user::UserId;
use crate::error::BookingError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub Uuid);

impl BookingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Statuses that occupy the room's calendar.
    pub fn holds_room(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        };
        f.write_str(name)
    }
}

/// The events that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingEvent {
    StartPayment,
    ConfirmPayment,
    FailPayment,
    Cancel,
    Refund,
    Complete,
}

impl fmt::Display for BookingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingEvent::StartPayment => "start payment for",
            BookingEvent::ConfirmPayment => "confirm payment for",
            BookingEvent::FailPayment => "fail payment for",
            BookingEvent::Cancel => "cancel",
            BookingEvent::Refund => "refund",
            BookingEvent::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// How close to check-in a booking may still be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationPolicy {
    pub notice: Duration,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            notice: Duration::zero(),
        }
    }
}

impl CancellationPolicy {
    pub fn with_notice_hours(hours: i64) -> Self {
        Self {
            notice: Duration::hours(hours),
        }
    }

    /// Last instant at which a stay starting on `check_in` may be cancelled.
    pub fn deadline(&self, check_in: NaiveDate) -> DateTime<Utc> {
        check_in.and_time(chrono::NaiveTime::MIN).and_utc() - self.notice
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub room: RoomId,
    pub owner: UserId,
    pub created_by: UserId,
    #[serde(flatten)]
    pub stay: Stay,
    pub guests: u8,
    pub nightly_rate: Amount,
    pub total_amount: Amount,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub special_requests: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a caller asks for when creating a booking.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub room: RoomId,
    pub owner: UserId,
    pub created_by: UserId,
    pub stay: Stay,
    pub guests: u8,
    pub special_requests: Option<String>,
}

impl Booking {
    /// Creates a PENDING booking, freezing the room's current nightly rate.
    pub fn new(room: &Room, request: BookingRequest, now: DateTime<Utc>) -> Result<Self, BookingError> {
        if !room.active {
            return Err(BookingError::ValidationError(format!(
                "Room {} is not open for booking",
                room.id
            )));
        }
        room.check_occupancy(request.guests)?;
        let total_amount = room.quote(&request.stay)?;

        Ok(Self {
            id: BookingId::new(),
            room: room.id,
            owner: request.owner,
            created_by: request.created_by,
            stay: request.stay,
            guests: request.guests,
            nightly_rate: room.price_per_night,
            total_amount,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            special_requests: request
                .special_requests
                .filter(|text| !text.trim().is_empty()),
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn nights(&self) -> u32 {
        self.stay.nights()
    }

    pub fn can_cancel(&self, now: DateTime<Utc>, policy: &CancellationPolicy) -> bool {
        self.status.holds_room() && now < policy.deadline(self.stay.check_in())
    }

    /// A payment attempt may only be started while the booking is waiting for
    /// one. A previous FAILED attempt goes back to PENDING.
    pub fn begin_payment_attempt(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        if self.status != BookingStatus::Pending {
            return Err(self.reject(BookingEvent::StartPayment, "status must be PENDING"));
        }
        if self.payment_status == PaymentStatus::Paid {
            return Err(self.reject(BookingEvent::StartPayment, "booking is already paid"));
        }
        self.payment_status = PaymentStatus::Pending;
        self.updated_at = now;
        Ok(())
    }

    /// PENDING -> CONFIRMED, with `payment_status` set to PAID in the same step.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        if self.status != BookingStatus::Pending {
            return Err(self.reject(BookingEvent::ConfirmPayment, "status must be PENDING"));
        }
        self.status = BookingStatus::Confirmed;
        self.payment_status = PaymentStatus::Paid;
        self.updated_at = now;
        Ok(())
    }

    /// A failed attempt leaves the booking PENDING so the guest can retry.
    pub fn record_payment_failure(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        if self.status != BookingStatus::Pending {
            return Err(self.reject(BookingEvent::FailPayment, "status must be PENDING"));
        }
        self.payment_status = PaymentStatus::Failed;
        self.updated_at = now;
        Ok(())
    }

    /// Money was captured for a booking that is no longer PENDING. The status
    /// stays as it is and the payment is tracked as PAID so it can be refunded.
    pub fn record_late_capture(&mut self, now: DateTime<Utc>) {
        if self.status == BookingStatus::Cancelled && self.payment_status != PaymentStatus::Refunded {
            self.payment_status = PaymentStatus::Paid;
            self.updated_at = now;
        }
    }

    /// PENDING|CONFIRMED -> CANCELLED. `payment_status` is left untouched: a
    /// PAID booking stays PAID until its refund settles.
    pub fn cancel(
        &mut self,
        reason: String,
        now: DateTime<Utc>,
        policy: &CancellationPolicy,
    ) -> Result<(), BookingError> {
        if !self.status.holds_room() {
            return Err(self.reject(BookingEvent::Cancel, "status must be PENDING or CONFIRMED"));
        }
        if !self.can_cancel(now, policy) {
            return Err(self.reject(BookingEvent::Cancel, "cancellation window has closed"));
        }
        self.status = BookingStatus::Cancelled;
        self.cancellation_reason = Some(reason);
        self.updated_at = now;
        Ok(())
    }

    /// CANCELLED+PAID -> CANCELLED+REFUNDED once the refund has settled.
    pub fn mark_refunded(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        if self.status != BookingStatus::Cancelled {
            return Err(self.reject(BookingEvent::Refund, "status must be CANCELLED"));
        }
        if self.payment_status != PaymentStatus::Paid {
            return Err(self.reject(BookingEvent::Refund, "payment status must be PAID"));
        }
        self.payment_status = PaymentStatus::Refunded;
        self.updated_at = now;
        Ok(())
    }

    /// CONFIRMED -> COMPLETED once the check-out date is reached.
    pub fn complete(&mut self, today: NaiveDate, now: DateTime<Utc>) -> Result<(), BookingError> {
        if self.status != BookingStatus::Confirmed {
            return Err(self.reject(BookingEvent::Complete, "status must be CONFIRMED"));
        }
        if today < self.stay.check_out() {
            return Err(self.reject(BookingEvent::Complete, "check-out date has not passed"));
        }
        self.status = BookingStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    fn reject(&self, event: BookingEvent, guard: &'static str) -> BookingError {
        BookingError::invalid_transition(self.status, event, guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::room::RoomType;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2027, 1, day).unwrap()
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2027, 1, day, hour, 0, 0).unwrap()
    }

    fn room() -> Room {
        Room::new(RoomId(7), RoomType::Double, Amount::new(dec!(100)).unwrap(), 2)
    }

    fn booking() -> Booking {
        let request = BookingRequest {
            room: RoomId(7),
            owner: UserId(1),
            created_by: UserId(1),
            stay: Stay::new(date(10), date(12)).unwrap(),
            guests: 2,
            special_requests: Some("  ".to_string()),
        };
        Booking::new(&room(), request, at(1, 9)).unwrap()
    }

    #[test]
    fn test_new_booking_is_pending_with_frozen_total() {
        let booking = booking();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.nights(), 2);
        assert_eq!(booking.total_amount.value(), dec!(200));
        assert_eq!(booking.special_requests, None);
    }

    #[test]
    fn test_new_booking_rejects_inactive_room_and_overcapacity() {
        let mut closed = room();
        closed.active = false;
        let request = BookingRequest {
            room: RoomId(7),
            owner: UserId(1),
            created_by: UserId(1),
            stay: Stay::new(date(10), date(12)).unwrap(),
            guests: 3,
            special_requests: None,
        };
        assert!(Booking::new(&closed, request.clone(), at(1, 9)).is_err());
        assert!(matches!(
            Booking::new(&room(), request, at(1, 9)),
            Err(BookingError::ValidationError(_))
        ));
    }

    #[test]
    fn test_confirm_sets_paid_atomically() {
        let mut booking = booking();
        booking.confirm(at(2, 9)).unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.payment_status, PaymentStatus::Paid);

        let err = booking.confirm(at(2, 10)).unwrap_err();
        assert!(matches!(
            err,
            BookingError::InvalidTransition {
                from: BookingStatus::Confirmed,
                event: BookingEvent::ConfirmPayment,
                ..
            }
        ));
    }

    #[test]
    fn test_payment_failure_keeps_booking_pending() {
        let mut booking = booking();
        booking.record_payment_failure(at(2, 9)).unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Failed);
        booking.begin_payment_attempt(at(2, 10)).unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Pending);

        booking.confirm(at(2, 10)).unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_cancel_paid_booking_keeps_paid_until_refund() {
        let policy = CancellationPolicy::default();
        let mut booking = booking();
        booking.confirm(at(2, 9)).unwrap();
        booking
            .cancel("change of plans".to_string(), at(3, 9), &policy)
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
        assert_eq!(booking.cancellation_reason.as_deref(), Some("change of plans"));

        booking.mark_refunded(at(4, 9)).unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Refunded);
        assert!(booking.mark_refunded(at(4, 10)).is_err());
    }

    #[test]
    fn test_cancel_respects_notice_window() {
        let mut booking = booking();
        let strict = CancellationPolicy::with_notice_hours(24);
        assert!(booking.can_cancel(at(8, 23), &strict));
        assert!(!booking.can_cancel(at(9, 1), &strict));
        assert!(booking.cancel("late".to_string(), at(9, 1), &strict).is_err());

        let lenient = CancellationPolicy::default();
        assert!(booking.can_cancel(at(9, 23), &lenient));
        assert!(!booking.can_cancel(at(10, 0), &lenient), "stay in progress");
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let policy = CancellationPolicy::default();
        let mut booking = booking();
        booking.cancel("abandon".to_string(), at(2, 9), &policy).unwrap();

        assert!(booking.confirm(at(2, 10)).is_err());
        assert!(booking.cancel("again".to_string(), at(2, 11), &policy).is_err());
        assert!(booking.complete(date(20), at(20, 12)).is_err());
        assert!(!booking.can_cancel(at(2, 12), &policy));
    }

    #[test]
    fn test_complete_requires_elapsed_checkout() {
        let mut booking = booking();
        assert!(booking.complete(date(13), at(13, 9)).is_err(), "not confirmed");
        booking.confirm(at(2, 9)).unwrap();
        assert!(booking.complete(date(11), at(11, 9)).is_err());
        booking.complete(date(12), at(12, 11)).unwrap();
        assert_eq!(booking.status, BookingStatus::Completed);
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_late_capture_on_cancelled_booking() {
        let policy = CancellationPolicy::default();
        let mut booking = booking();
        booking.cancel("abandon".to_string(), at(2, 9), &policy).unwrap();
        booking.record_late_capture(at(2, 10));
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
    }
}
