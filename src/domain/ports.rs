use super::audit::AuditEntry;
use super::booking::{Booking, BookingId};
use super::money::Amount;
use super::payment::{Payment, PaymentId};
use super::room::{Room, RoomId};
use super::user::{User, UserId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn store(&self, room: Room) -> Result<()>;
    async fn get(&self, id: RoomId) -> Result<Option<Room>>;
    async fn get_all(&self) -> Result<Vec<Room>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn store(&self, user: User) -> Result<()>;
    async fn get(&self, id: UserId) -> Result<Option<User>>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Inserts the booking only if no PENDING/CONFIRMED booking on the same
    /// room overlaps it. The scan and the insert are one atomic step; a
    /// conflict yields `RoomUnavailable`.
    async fn insert_if_available(&self, booking: Booking) -> Result<()>;
    /// Overwrites an existing booking in place.
    async fn update(&self, booking: Booking) -> Result<()>;
    async fn get(&self, id: BookingId) -> Result<Option<Booking>>;
    async fn for_room(&self, room: RoomId) -> Result<Vec<Booking>>;
    async fn get_all(&self) -> Result<Vec<Booking>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts or overwrites a payment. An external reference is bound to
    /// one payment for good; storing a different payment under it fails with
    /// `ReferenceConflict` and writes nothing.
    async fn store(&self, payment: Payment) -> Result<()>;
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>>;
    async fn for_booking(&self, booking: BookingId) -> Result<Vec<Payment>>;
    async fn get_all(&self) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<()>;
    async fn entries(&self) -> Result<Vec<AuditEntry>>;
}

/// A payment intent created by the card gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayIntent {
    pub intent_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundState {
    Succeeded,
    /// Settles later through a `refund.succeeded` event.
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefundReceipt {
    pub reference: String,
    pub state: RefundState,
}

/// The card gateway's side of the reconciliation contract.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        booking: BookingId,
        amount: Amount,
        instrument: &str,
    ) -> Result<GatewayIntent>;
    async fn refund(&self, intent_id: &str, amount: Amount) -> Result<RefundReceipt>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

pub type RoomStoreBox = Box<dyn RoomStore>;
pub type UserStoreBox = Box<dyn UserStore>;
pub type BookingStoreBox = Box<dyn BookingStore>;
pub type PaymentStoreBox = Box<dyn PaymentStore>;
pub type AuditLogBox = Box<dyn AuditLog>;
pub type GatewayRef = Arc<dyn PaymentGateway>;
pub type ClockRef = Arc<dyn Clock>;

/// Everything the engine persists to.
pub struct Stores {
    pub rooms: RoomStoreBox,
    pub users: UserStoreBox,
    pub bookings: BookingStoreBox,
    pub payments: PaymentStoreBox,
    pub audit: AuditLogBox,
}
