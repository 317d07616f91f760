use super::locks::KeyedLocks;
use super::signature::WebhookVerifier;
use crate::config::EngineConfig;
use crate::domain::audit::{AuditEntry, AuditKind};
use crate::domain::booking::{Booking, BookingId, PaymentStatus};
use crate::domain::payment::Payment;
use crate::domain::ports::{
    AuditLogBox, BookingStoreBox, ClockRef, GatewayRef, PaymentStoreBox, RoomStoreBox, Stores,
    UserStoreBox,
};
use crate::domain::room::Room;
use crate::domain::user::{User, UserId};
use crate::error::{BookingError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

/// The booking-lifecycle and payment-reconciliation engine.
///
/// `BookingEngine` owns the storage ports, the card gateway and the clock. Its
/// operations are split by concern across the sibling modules
/// (`availability`, `lifecycle`, `reconciliation`, `inventory`, `reports`).
///
/// Every operation that changes an existing booking holds that booking's lock
/// and re-reads it from the store before validating the transition, so racing
/// requests are decided by whichever reaches the lock first.
pub struct BookingEngine {
    pub(crate) rooms: RoomStoreBox,
    pub(crate) users: UserStoreBox,
    pub(crate) bookings: BookingStoreBox,
    pub(crate) payments: PaymentStoreBox,
    pub(crate) audit: AuditLogBox,
    pub(crate) gateway: GatewayRef,
    pub(crate) clock: ClockRef,
    pub(crate) config: EngineConfig,
    pub(crate) verifier: WebhookVerifier,
    booking_locks: KeyedLocks<BookingId>,
}

impl BookingEngine {
    pub fn new(stores: Stores, gateway: GatewayRef, clock: ClockRef, config: EngineConfig) -> Self {
        let verifier =
            WebhookVerifier::new(config.webhook_secret.clone(), config.webhook_tolerance);
        Self {
            rooms: stores.rooms,
            users: stores.users,
            bookings: stores.bookings,
            payments: stores.payments,
            audit: stores.audit,
            gateway,
            clock,
            config,
            verifier,
            booking_locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn verifier(&self) -> &WebhookVerifier {
        &self.verifier
    }

    /// Loads a user account for trusted catalog import.
    pub async fn register_user(&self, user: User) -> Result<()> {
        self.users.store(user).await
    }

    /// Loads a room for trusted catalog import, bypassing the access guard.
    pub async fn import_room(&self, room: Room) -> Result<()> {
        self.rooms.store(room).await
    }

    pub async fn audit_entries(&self) -> Result<Vec<AuditEntry>> {
        self.audit.entries().await
    }

    pub(crate) async fn actor(&self, id: UserId) -> Result<User> {
        self.users
            .get(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("user {id}")))
    }

    pub(crate) async fn load_booking(&self, id: BookingId) -> Result<Booking> {
        self.bookings
            .get(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {id}")))
    }

    pub(crate) async fn lock_booking(&self, id: BookingId) -> OwnedMutexGuard<()> {
        self.booking_locks.acquire(id).await
    }

    pub(crate) async fn save_booking(&self, booking: Booking) -> Result<()> {
        with_deadline("booking update", self.config.store_timeout, self.bookings.update(booking))
            .await
    }

    pub(crate) async fn save_payment(&self, payment: Payment) -> Result<()> {
        with_deadline("payment update", self.config.store_timeout, self.payments.store(payment))
            .await
    }

    /// The booking's payment that is not FAILED, if any.
    pub(crate) async fn active_payment(&self, booking: BookingId) -> Result<Option<Payment>> {
        let payments = self.payments.for_booking(booking).await?;
        Ok(payments.into_iter().rev().find(Payment::is_active))
    }

    pub(crate) async fn paid_payment(&self, booking: BookingId) -> Result<Option<Payment>> {
        let payments = self.payments.for_booking(booking).await?;
        Ok(payments
            .into_iter()
            .rev()
            .find(|p| p.status == PaymentStatus::Paid))
    }

    /// Records a refused state-machine transition. Other errors pass through
    /// without an audit entry.
    pub(crate) async fn audit_rejection(
        &self,
        booking: BookingId,
        actor: Option<UserId>,
        err: &BookingError,
    ) {
        if let BookingError::InvalidTransition { from, event, guard } = err {
            tracing::warn!(%booking, %from, ?event, guard, "transition rejected");
            self.record(AuditEntry {
                at: self.clock.now(),
                booking: Some(booking),
                actor,
                kind: AuditKind::RejectedTransition {
                    from: *from,
                    event: *event,
                    guard: guard.to_string(),
                },
            })
            .await;
        }
    }

    pub(crate) async fn flag_for_review(
        &self,
        booking: Option<BookingId>,
        reference: &str,
        reason: String,
    ) {
        tracing::warn!(?booking, reference, %reason, "flagged for manual review");
        self.record(AuditEntry {
            at: self.clock.now(),
            booking,
            actor: None,
            kind: AuditKind::ManualReview {
                reference: reference.to_string(),
                reason,
            },
        })
        .await;
    }

    pub(crate) async fn record_discarded(
        &self,
        booking: Option<BookingId>,
        reference: &str,
        reason: &str,
    ) {
        self.record(AuditEntry {
            at: self.clock.now(),
            booking,
            actor: None,
            kind: AuditKind::DiscardedEvent {
                reference: reference.to_string(),
                reason: reason.to_string(),
            },
        })
        .await;
    }

    async fn record(&self, entry: AuditEntry) {
        if let Err(err) = self.audit.record(entry).await {
            tracing::error!(error = %err, "failed to write audit entry");
        }
    }
}

/// Runs `operation` under a deadline; running out of time is a retryable
/// `Timeout`, never a partial result.
pub(crate) async fn with_deadline<T, F>(what: &'static str, limit: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation = what, ?limit, "deadline exceeded");
            Err(BookingError::Timeout(what))
        }
    }
}
