use crate::domain::audit::AuditEntry;
use crate::domain::availability;
use crate::domain::booking::{Booking, BookingId};
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{AuditLog, BookingStore, PaymentStore, RoomStore, Stores, UserStore};
use crate::domain::room::{Room, RoomId};
use crate::domain::user::{User, UserId};
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory room catalog.
#[derive(Default, Clone)]
pub struct InMemoryRoomStore {
    rooms: Arc<RwLock<HashMap<RoomId, Room>>>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn store(&self, room: Room) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        rooms.insert(room.id, room);
        Ok(())
    }

    async fn get(&self, id: RoomId) -> Result<Option<Room>> {
        let rooms = self.rooms.read().await;
        Ok(rooms.get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Room>> {
        let rooms = self.rooms.read().await;
        let mut all: Vec<Room> = rooms.values().cloned().collect();
        all.sort_by_key(|room| room.id);
        Ok(all)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn store(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;
        users.insert(user.id, user);
        Ok(())
    }

    async fn get(&self, id: UserId) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }
}

/// A thread-safe in-memory booking store.
///
/// `insert_if_available` holds the write lock across the overlap scan and the
/// insert, so two overlapping requests can never both succeed.
#[derive(Default, Clone)]
pub struct InMemoryBookingStore {
    bookings: Arc<RwLock<HashMap<BookingId, Booking>>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert_if_available(&self, booking: Booking) -> Result<()> {
        let mut bookings = self.bookings.write().await;
        let same_room = bookings.values().filter(|b| b.room == booking.room);
        if availability::find_conflict(&booking.stay, same_room, Some(booking.id)).is_some() {
            return Err(BookingError::RoomUnavailable {
                room: booking.room,
                check_in: booking.stay.check_in(),
                check_out: booking.stay.check_out(),
            });
        }
        bookings.insert(booking.id, booking);
        Ok(())
    }

    async fn update(&self, booking: Booking) -> Result<()> {
        let mut bookings = self.bookings.write().await;
        if !bookings.contains_key(&booking.id) {
            return Err(BookingError::NotFound(format!("booking {}", booking.id)));
        }
        bookings.insert(booking.id, booking);
        Ok(())
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(bookings.get(&id).cloned())
    }

    async fn for_room(&self, room: RoomId) -> Result<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(bookings.values().filter(|b| b.room == room).cloned().collect())
    }

    async fn get_all(&self) -> Result<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut all: Vec<Booking> = bookings.values().cloned().collect();
        all.sort_by_key(|b| b.created_at);
        Ok(all)
    }
}

/// Payments indexed by id, with a secondary index on the external reference.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    inner: Arc<RwLock<PaymentTables>>,
}

#[derive(Default)]
struct PaymentTables {
    payments: HashMap<PaymentId, Payment>,
    by_reference: HashMap<String, PaymentId>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn store(&self, payment: Payment) -> Result<()> {
        let mut tables = self.inner.write().await;
        if let Some(&bound) = tables.by_reference.get(&payment.external_reference)
            && bound != payment.id
        {
            return Err(BookingError::ReferenceConflict {
                reference: payment.external_reference,
                payment: bound,
            });
        }
        tables
            .by_reference
            .insert(payment.external_reference.clone(), payment.id);
        tables.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        let tables = self.inner.read().await;
        Ok(tables.payments.get(&id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let tables = self.inner.read().await;
        Ok(tables
            .by_reference
            .get(reference)
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn for_booking(&self, booking: BookingId) -> Result<Vec<Payment>> {
        let tables = self.inner.read().await;
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| p.booking == booking)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn get_all(&self) -> Result<Vec<Payment>> {
        let tables = self.inner.read().await;
        Ok(tables.payments.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryAuditLog {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.entries.read().await.clone())
    }
}

/// A full set of fresh in-memory stores.
pub fn in_memory_stores() -> Stores {
    Stores {
        rooms: Box::new(InMemoryRoomStore::new()),
        users: Box::new(InMemoryUserStore::new()),
        bookings: Box::new(InMemoryBookingStore::new()),
        payments: Box::new(InMemoryPaymentStore::new()),
        audit: Box::new(InMemoryAuditLog::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::{BookingRequest, BookingStatus};
    use crate::domain::money::Amount;
    use crate::domain::room::RoomType;
    use crate::domain::stay::Stay;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn room() -> Room {
        Room::new(RoomId(1), RoomType::Double, Amount::new(dec!(100)).unwrap(), 2)
    }

    fn booking(from: u32, to: u32) -> Booking {
        let request = BookingRequest {
            room: RoomId(1),
            owner: UserId(1),
            created_by: UserId(1),
            stay: Stay::new(
                NaiveDate::from_ymd_opt(2027, 1, from).unwrap(),
                NaiveDate::from_ymd_opt(2027, 1, to).unwrap(),
            )
            .unwrap(),
            guests: 1,
            special_requests: None,
        };
        Booking::new(&room(), request, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_room_store() {
        let store = InMemoryRoomStore::new();
        store.store(room()).await.unwrap();
        assert_eq!(store.get(RoomId(1)).await.unwrap(), Some(room()));
        assert!(store.get(RoomId(2)).await.unwrap().is_none());
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_if_available_rejects_overlap() {
        let store = InMemoryBookingStore::new();
        store.insert_if_available(booking(10, 12)).await.unwrap();
        store.insert_if_available(booking(12, 15)).await.unwrap();

        let err = store.insert_if_available(booking(11, 13)).await.unwrap_err();
        assert!(matches!(err, BookingError::RoomUnavailable { .. }));
        assert_eq!(store.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_booking_frees_the_room() {
        let store = InMemoryBookingStore::new();
        let mut first = booking(10, 12);
        store.insert_if_available(first.clone()).await.unwrap();

        first.status = BookingStatus::Cancelled;
        store.update(first).await.unwrap();

        store.insert_if_available(booking(10, 12)).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_unknown_booking() {
        let store = InMemoryBookingStore::new();
        assert!(matches!(
            store.update(booking(10, 12)).await,
            Err(BookingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_payment_reference_index() {
        let store = InMemoryPaymentStore::new();
        let booking = booking(10, 12);
        let payment = Payment::card(
            booking.id,
            "pi_000042".to_string(),
            booking.total_amount,
            Utc::now(),
        );
        store.store(payment.clone()).await.unwrap();

        let found = store.find_by_reference("pi_000042").await.unwrap().unwrap();
        assert_eq!(found.id, payment.id);
        assert!(store.find_by_reference("pi_missing").await.unwrap().is_none());
        assert_eq!(store.for_booking(booking.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reference_stays_bound_to_its_payment() {
        let store = InMemoryPaymentStore::new();
        let first = booking(10, 12);
        let second = booking(14, 15);
        let mut original = Payment::card(first.id, "pi_reused".to_string(), first.total_amount, Utc::now());
        store.store(original.clone()).await.unwrap();

        let clash = Payment::card(second.id, "pi_reused".to_string(), second.total_amount, Utc::now());
        let err = store.store(clash).await.unwrap_err();
        assert!(matches!(err, BookingError::ReferenceConflict { payment, .. } if payment == original.id));
        assert!(store.for_booking(second.id).await.unwrap().is_empty());

        original.mark_paid(Utc::now());
        store.store(original.clone()).await.unwrap();
        let found = store.find_by_reference("pi_reused").await.unwrap().unwrap();
        assert_eq!(found, original);
    }
}
