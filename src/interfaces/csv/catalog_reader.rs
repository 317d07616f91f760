use crate::domain::money::Amount;
use crate::domain::room::{Room, RoomId, RoomType};
use crate::domain::user::{Role, User, UserId};
use crate::error::{BookingError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: u32,
    name: String,
    role: Role,
    active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RoomRecord {
    id: u32,
    room_type: RoomType,
    price_per_night: Amount,
    capacity: u8,
    active: Option<bool>,
}

/// Reads the user and room catalogs a replay or server starts from.
///
/// `users.csv` has the columns `id, name, role, active`; `rooms.csv` has
/// `id, room_type, price_per_night, capacity, active`. A blank `active`
/// means active.
pub struct CatalogReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CatalogReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn users(self) -> impl Iterator<Item = Result<User>> {
        self.reader
            .into_deserialize::<UserRecord>()
            .map(|result| {
                let record = result.map_err(BookingError::from)?;
                let mut user = User::new(UserId(record.id), record.name, record.role);
                user.active = record.active.unwrap_or(true);
                Ok(user)
            })
    }

    pub fn rooms(self) -> impl Iterator<Item = Result<Room>> {
        self.reader
            .into_deserialize::<RoomRecord>()
            .map(|result| {
                let record = result.map_err(BookingError::from)?;
                if record.capacity == 0 {
                    return Err(BookingError::ValidationError(format!(
                        "room {} has no capacity",
                        record.id
                    )));
                }
                let mut room = Room::new(
                    RoomId(record.id),
                    record.room_type,
                    record.price_per_night,
                    record.capacity,
                );
                room.active = record.active.unwrap_or(true);
                Ok(room)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reads_users() {
        let data = "id, name, role, active\n1, Ada, guest,\n2, Bo, staff, true\n3, Cy, admin, false";
        let users: Vec<Result<User>> = CatalogReader::new(data.as_bytes()).users().collect();

        assert_eq!(users.len(), 3);
        let ada = users[0].as_ref().unwrap();
        assert_eq!(ada.role, Role::Guest);
        assert!(ada.active);
        let cy = users[2].as_ref().unwrap();
        assert_eq!(cy.role, Role::Administrator);
        assert!(!cy.active);
    }

    #[test]
    fn test_reads_rooms_and_rejects_bad_rows() {
        let data = "id, room_type, price_per_night, capacity, active\n\
                    101, double, 100.00, 2,\n\
                    102, penthouse, 900, 4,\n\
                    103, single, -5, 1,";
        let rooms: Vec<Result<Room>> = CatalogReader::new(data.as_bytes()).rooms().collect();

        let room = rooms[0].as_ref().unwrap();
        assert_eq!(room.id, RoomId(101));
        assert_eq!(room.price_per_night.value(), dec!(100));
        assert!(room.active);
        assert!(rooms[1].is_err(), "unknown room type");
        assert!(rooms[2].is_err(), "negative price");
    }
}
