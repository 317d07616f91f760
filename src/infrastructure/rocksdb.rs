use crate::domain::audit::AuditEntry;
use crate::domain::availability;
use crate::domain::booking::{Booking, BookingId};
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{AuditLog, BookingStore, PaymentStore, RoomStore, Stores, UserStore};
use crate::domain::room::{Room, RoomId};
use crate::domain::user::{User, UserId};
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const CF_ROOMS: &str = "rooms";
pub const CF_USERS: &str = "users";
pub const CF_BOOKINGS: &str = "bookings";
pub const CF_PAYMENTS: &str = "payments";
/// External reference -> payment id.
pub const CF_PAYMENT_REFS: &str = "payment_refs";
pub const CF_AUDIT: &str = "audit";

/// A persistent store implementation using RocksDB.
///
/// Each entity lives in its own column family and is serialized as JSON.
/// Writes that must be checked against existing data go through
/// `write_gate`, which serializes them within the process.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_gate: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [
            CF_ROOMS,
            CF_USERS,
            CF_BOOKINGS,
            CF_PAYMENTS,
            CF_PAYMENT_REFS,
            CF_AUDIT,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    /// Boxes this store into every port the engine needs.
    pub fn into_stores(self) -> Stores {
        Stores {
            rooms: Box::new(self.clone()),
            users: Box::new(self.clone()),
            bookings: Box::new(self.clone()),
            payments: Box::new(self.clone()),
            audit: Box::new(self),
        }
    }

    fn cf(&self, name: &'static str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            BookingError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn put<T: Serialize>(&self, family: &'static str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(family)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn fetch<T: DeserializeOwned>(&self, family: &'static str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(family)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, family: &'static str) -> Result<Vec<T>> {
        let cf = self.cf(family)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }
}

#[async_trait]
impl RoomStore for RocksDBStore {
    async fn store(&self, room: Room) -> Result<()> {
        self.put(CF_ROOMS, &room.id.0.to_be_bytes(), &room)
    }

    async fn get(&self, id: RoomId) -> Result<Option<Room>> {
        self.fetch(CF_ROOMS, &id.0.to_be_bytes())
    }

    async fn get_all(&self) -> Result<Vec<Room>> {
        self.scan(CF_ROOMS)
    }
}

#[async_trait]
impl UserStore for RocksDBStore {
    async fn store(&self, user: User) -> Result<()> {
        self.put(CF_USERS, &user.id.0.to_be_bytes(), &user)
    }

    async fn get(&self, id: UserId) -> Result<Option<User>> {
        self.fetch(CF_USERS, &id.0.to_be_bytes())
    }
}

#[async_trait]
impl BookingStore for RocksDBStore {
    async fn insert_if_available(&self, booking: Booking) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let same_room = BookingStore::for_room(self, booking.room).await?;
        if availability::find_conflict(&booking.stay, &same_room, Some(booking.id)).is_some() {
            return Err(BookingError::RoomUnavailable {
                room: booking.room,
                check_in: booking.stay.check_in(),
                check_out: booking.stay.check_out(),
            });
        }
        self.put(CF_BOOKINGS, booking.id.0.as_bytes(), &booking)
    }

    async fn update(&self, booking: Booking) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let cf = self.cf(CF_BOOKINGS)?;
        if self.db.get_pinned_cf(cf, booking.id.0.as_bytes())?.is_none() {
            return Err(BookingError::NotFound(format!("booking {}", booking.id)));
        }
        self.put(CF_BOOKINGS, booking.id.0.as_bytes(), &booking)
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        self.fetch(CF_BOOKINGS, id.0.as_bytes())
    }

    async fn for_room(&self, room: RoomId) -> Result<Vec<Booking>> {
        let all: Vec<Booking> = self.scan(CF_BOOKINGS)?;
        Ok(all.into_iter().filter(|b| b.room == room).collect())
    }

    async fn get_all(&self) -> Result<Vec<Booking>> {
        let mut all: Vec<Booking> = self.scan(CF_BOOKINGS)?;
        all.sort_by_key(|b| b.created_at);
        Ok(all)
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn store(&self, payment: Payment) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let payments = self.cf(CF_PAYMENTS)?;
        let refs = self.cf(CF_PAYMENT_REFS)?;
        if let Some(bound) = self.db.get_pinned_cf(refs, payment.external_reference.as_bytes())?
            && &bound[..] != payment.id.0.as_bytes()
        {
            let bound = Uuid::from_slice(&bound).map_err(|e| BookingError::InternalError(Box::new(e)))?;
            return Err(BookingError::ReferenceConflict {
                reference: payment.external_reference,
                payment: PaymentId(bound),
            });
        }
        let mut batch = WriteBatch::default();
        batch.put_cf(payments, payment.id.0.as_bytes(), serde_json::to_vec(&payment)?);
        batch.put_cf(refs, payment.external_reference.as_bytes(), payment.id.0.as_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.fetch(CF_PAYMENTS, id.0.as_bytes())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let refs = self.cf(CF_PAYMENT_REFS)?;
        match self.db.get_pinned_cf(refs, reference.as_bytes())? {
            Some(id) => self.fetch(CF_PAYMENTS, &id),
            None => Ok(None),
        }
    }

    async fn for_booking(&self, booking: BookingId) -> Result<Vec<Payment>> {
        let all: Vec<Payment> = self.scan(CF_PAYMENTS)?;
        let mut payments: Vec<Payment> = all.into_iter().filter(|p| p.booking == booking).collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn get_all(&self) -> Result<Vec<Payment>> {
        self.scan(CF_PAYMENTS)
    }
}

#[async_trait]
impl AuditLog for RocksDBStore {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        let key = Uuid::now_v7();
        self.put(CF_AUDIT, key.as_bytes(), &entry)
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>> {
        self.scan(CF_AUDIT)
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
    use tempfile::tempdir;

    fn room() -> Room {
        Room::new(RoomId(1), RoomType::Suite, Amount::new(dec!(250)).unwrap(), 4)
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
            guests: 2,
            special_requests: None,
        };
        Booking::new(&room(), request, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for family in [CF_ROOMS, CF_USERS, CF_BOOKINGS, CF_PAYMENTS, CF_PAYMENT_REFS, CF_AUDIT] {
            assert!(store.db.cf_handle(family).is_some(), "{family} missing");
        }
    }

    #[tokio::test]
    async fn test_rocksdb_room_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        RoomStore::store(&store, room()).await.unwrap();
        let retrieved = RoomStore::get(&store, RoomId(1)).await.unwrap().unwrap();
        assert_eq!(retrieved, room());
        assert!(RoomStore::get(&store, RoomId(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_booking_overlap_and_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store.insert_if_available(booking(10, 12)).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let err = store.insert_if_available(booking(11, 13)).await.unwrap_err();
        assert!(matches!(err, BookingError::RoomUnavailable { .. }));

        let mut existing = BookingStore::get_all(&store).await.unwrap().remove(0);
        existing.status = BookingStatus::Cancelled;
        store.update(existing).await.unwrap();
        store.insert_if_available(booking(11, 13)).await.unwrap();
    }

    #[tokio::test]
    async fn test_rocksdb_payment_reference_index() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let booking = booking(10, 12);
        let payment = Payment::card(booking.id, "pi_000007".to_string(), booking.total_amount, Utc::now());

        PaymentStore::store(&store, payment.clone()).await.unwrap();
        let found = store.find_by_reference("pi_000007").await.unwrap().unwrap();
        assert_eq!(found, payment);
        assert_eq!(store.for_booking(booking.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_reference_survives_reopen_and_is_not_rebound() {
        let dir = tempdir().unwrap();
        let first = booking(10, 12);
        let original = Payment::card(first.id, "pi_reused".to_string(), first.total_amount, Utc::now());
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            PaymentStore::store(&store, original.clone()).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let second = booking(14, 15);
        let clash = Payment::card(second.id, "pi_reused".to_string(), second.total_amount, Utc::now());
        let err = PaymentStore::store(&store, clash).await.unwrap_err();
        assert!(matches!(err, BookingError::ReferenceConflict { payment, .. } if payment == original.id));

        let found = store.find_by_reference("pi_reused").await.unwrap().unwrap();
        assert_eq!(found.booking, first.id);
        assert!(store.for_booking(second.id).await.unwrap().is_empty());
    }
}
