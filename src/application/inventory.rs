use super::engine::{BookingEngine, with_deadline};
use crate::domain::access::{AccessGuard, Operation};
use crate::domain::money::Amount;
use crate::domain::room::{Room, RoomId, RoomType};
use crate::domain::user::UserId;
use crate::error::{BookingError, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoom {
    pub id: RoomId,
    pub room_type: RoomType,
    pub price_per_night: Amount,
    pub capacity: u8,
}

impl BookingEngine {
    pub async fn add_room(&self, actor: UserId, new_room: NewRoom) -> Result<Room> {
        let actor = self.actor(actor).await?;
        AccessGuard::authorize(&actor, Operation::ManageInventory)?;
        if new_room.capacity == 0 {
            return Err(BookingError::ValidationError(
                "room capacity must be at least one".to_string(),
            ));
        }
        if self.rooms.get(new_room.id).await?.is_some() {
            return Err(BookingError::ValidationError(format!(
                "room {} already exists",
                new_room.id
            )));
        }

        let room = Room::new(
            new_room.id,
            new_room.room_type,
            new_room.price_per_night,
            new_room.capacity,
        );
        self.store_room(room.clone()).await?;
        tracing::info!(room = %room.id, price = %room.price_per_night, "room added");
        Ok(room)
    }

    /// Changes the nightly rate for future bookings. Existing bookings keep
    /// the rate they were created with.
    pub async fn update_room_price(&self, actor: UserId, id: RoomId, price: Amount) -> Result<Room> {
        let actor = self.actor(actor).await?;
        AccessGuard::authorize(&actor, Operation::ManageInventory)?;
        let mut room = self.get_room(id).await?;
        let previous = room.price_per_night;
        room.price_per_night = price;
        self.store_room(room.clone()).await?;
        tracing::info!(room = %id, %previous, %price, "room price updated");
        Ok(room)
    }

    /// Opens or closes a room for new bookings.
    pub async fn set_room_active(&self, actor: UserId, id: RoomId, active: bool) -> Result<Room> {
        let actor = self.actor(actor).await?;
        AccessGuard::authorize(&actor, Operation::ManageInventory)?;
        let mut room = self.get_room(id).await?;
        room.active = active;
        self.store_room(room.clone()).await?;
        tracing::info!(room = %id, active, "room availability changed");
        Ok(room)
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>> {
        self.rooms.get_all().await
    }

    pub async fn get_room(&self, id: RoomId) -> Result<Room> {
        self.rooms
            .get(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("room {id}")))
    }

    async fn store_room(&self, room: Room) -> Result<()> {
        with_deadline("room update", self.config.store_timeout, self.rooms.store(room)).await
    }
}
