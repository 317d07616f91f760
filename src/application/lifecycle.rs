use super::engine::{BookingEngine, with_deadline};
use crate::domain::access::{Access, AccessGuard, Operation};
use crate::domain::booking::{Booking, BookingId, BookingRequest, BookingStatus, PaymentStatus};
use crate::domain::payment::Payment;
use crate::domain::room::RoomId;
use crate::domain::user::UserId;
use crate::error::{BookingError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

/// A create-booking request as it arrives from a caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub room_id: RoomId,
    /// Staff booking on behalf of a guest name the guest here.
    #[serde(default)]
    pub owner_id: Option<UserId>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u8,
    #[serde(default)]
    pub special_requests: Option<String>,
}

impl BookingEngine {
    /// Creates a PENDING booking if the room is free.
    ///
    /// The overlap check and the insert happen atomically inside the store;
    /// the loser of a race for the same nights gets `RoomUnavailable`.
    pub async fn create_booking(&self, actor: UserId, request: NewBooking) -> Result<Booking> {
        let actor = self.actor(actor).await?;
        let owner = request.owner_id.unwrap_or(actor.id);
        AccessGuard::authorize_for(&actor, Operation::CreateBooking, owner)?;
        if owner != actor.id {
            let guest = self.actor(owner).await?;
            if !guest.active {
                return Err(BookingError::AccountInactive(guest.id));
            }
        }

        let stay = self.validate_stay(request.check_in, request.check_out)?;
        let room = self
            .rooms
            .get(request.room_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("room {}", request.room_id)))?;

        let booking = Booking::new(
            &room,
            BookingRequest {
                room: room.id,
                owner,
                created_by: actor.id,
                stay,
                guests: request.guests,
                special_requests: request.special_requests,
            },
            self.clock.now(),
        )?;

        let inserted = with_deadline(
            "booking insert",
            self.config.store_timeout,
            self.bookings.insert_if_available(booking.clone()),
        )
        .await;
        if let Err(err) = inserted {
            if matches!(err, BookingError::RoomUnavailable { .. }) {
                tracing::info!(room = %room.id, %stay, "booking rejected: room unavailable");
            }
            return Err(err);
        }

        tracing::info!(
            booking = %booking.id,
            room = %room.id,
            owner = %owner,
            %stay,
            total = %booking.total_amount,
            "booking created"
        );
        Ok(booking)
    }

    pub async fn get_booking(&self, actor: UserId, id: BookingId) -> Result<Booking> {
        let actor = self.actor(actor).await?;
        let booking = self.load_booking(id).await?;
        AccessGuard::authorize_for(&actor, Operation::ViewBooking, booking.owner)?;
        Ok(booking)
    }

    /// Every booking the actor may see: their own for guests, all for staff.
    pub async fn list_bookings(&self, actor: UserId) -> Result<Vec<Booking>> {
        let actor = self.actor(actor).await?;
        let access = AccessGuard::authorize(&actor, Operation::ViewBooking)?;
        let bookings = self.bookings.get_all().await?;
        Ok(match access {
            Access::Own => bookings.into_iter().filter(|b| b.owner == actor.id).collect(),
            _ => bookings,
        })
    }

    pub async fn booking_payments(&self, actor: UserId, id: BookingId) -> Result<Vec<Payment>> {
        let booking = self.get_booking(actor, id).await?;
        self.payments.for_booking(booking.id).await
    }

    /// PENDING|CONFIRMED -> CANCELLED.
    ///
    /// A PAID booking is cancelled immediately; its payment is marked as
    /// awaiting a refund and stays PAID until staff issue the refund and it
    /// settles.
    pub async fn cancel_booking(&self, actor: UserId, id: BookingId, reason: &str) -> Result<Booking> {
        let actor = self.actor(actor).await?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BookingError::ValidationError(
                "a cancellation reason is required".to_string(),
            ));
        }

        let _guard = self.lock_booking(id).await;
        let mut booking = self.load_booking(id).await?;
        AccessGuard::authorize_for(&actor, Operation::CancelBooking, booking.owner)?;

        let now = self.clock.now();
        if let Err(err) = booking.cancel(reason.to_string(), now, &self.config.cancellation) {
            self.audit_rejection(booking.id, Some(actor.id), &err).await;
            return Err(err);
        }
        self.save_booking(booking.clone()).await?;

        // Committed. `issue_refund` only needs the CANCELLED/PAID booking, so
        // a lost refund marker is flagged for review instead of failing.
        if booking.payment_status == PaymentStatus::Paid
            && let Err(err) = self.mark_refund_requested(booking.id, now).await
        {
            tracing::error!(booking = %booking.id, error = %err, "failed to mark refund as requested");
            self.flag_for_review(
                Some(booking.id),
                &booking.id.to_string(),
                format!("cancelled while paid; refund marker not saved: {err}"),
            )
            .await;
        }

        tracing::info!(booking = %booking.id, actor = %actor.id, reason, "booking cancelled");
        Ok(booking)
    }

    async fn mark_refund_requested(&self, booking: BookingId, now: DateTime<Utc>) -> Result<()> {
        if let Some(mut payment) = self.paid_payment(booking).await? {
            payment.request_refund(now);
            self.save_payment(payment).await?;
            tracing::info!(%booking, "refund pending for cancelled booking");
        }
        Ok(())
    }

    /// Moves every CONFIRMED booking whose check-out date has been reached to
    /// COMPLETED. System-driven; returns the ids it completed.
    pub async fn complete_elapsed_stays(&self) -> Result<Vec<BookingId>> {
        let today = self.clock.today();
        let due: Vec<BookingId> = self
            .bookings
            .get_all()
            .await?
            .into_iter()
            .filter(|b| b.status == BookingStatus::Confirmed && b.stay.check_out() <= today)
            .map(|b| b.id)
            .collect();

        let mut completed = Vec::with_capacity(due.len());
        for id in due {
            let _guard = self.lock_booking(id).await;
            let mut booking = self.load_booking(id).await?;
            match booking.complete(today, self.clock.now()) {
                Ok(()) => {
                    self.save_booking(booking).await?;
                    completed.push(id);
                }
                // moved on since the scan
                Err(err) => tracing::debug!(booking = %id, error = %err, "skipped completion"),
            }
        }

        if !completed.is_empty() {
            tracing::info!(count = completed.len(), "stays completed");
        }
        Ok(completed)
    }
}
