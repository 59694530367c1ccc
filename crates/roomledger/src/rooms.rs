//! Room CRUD. Listing runs the consistency engine's resolve-on-read
//! pass, so a `getRooms` call may write corrective updates back to the
//! store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use crate::consistency::{ConsistencyEngine, RoomView};
use crate::domain::{Page, PageParams, Room, RoomId, RoomStatus, RoomUtilities};
use crate::error::ServiceError;
use crate::store::Store;

static ROOM_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_room_id() -> RoomId {
    let id = ROOM_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RoomId(format!("room-{id:06}"))
}

#[derive(Debug, Default, Deserialize)]
pub struct RoomQuery {
    pub status: Option<RoomStatus>,
    #[serde(rename = "searchKeyword")]
    pub search_keyword: Option<String>,
    #[serde(flatten)]
    pub page: PageParams,
}

#[derive(Debug, Deserialize)]
pub struct RoomIdParams {
    pub id: RoomId,
}

#[derive(Debug, Deserialize)]
pub struct AddRoomParams {
    pub room_number: String,
    #[serde(default)]
    pub floor: i32,
    #[serde(default)]
    pub rent_price: f64,
    pub status: Option<RoomStatus>,
    pub utilities: Option<RoomUtilities>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoomParams {
    pub id: RoomId,
    pub room_number: Option<String>,
    pub floor: Option<i32>,
    pub rent_price: Option<f64>,
    pub status: Option<RoomStatus>,
    pub utilities: Option<RoomUtilities>,
}

pub struct RoomService<S> {
    store: Arc<S>,
    consistency: ConsistencyEngine<S>,
}

impl<S: Store> RoomService<S> {
    pub fn new(store: Arc<S>) -> Self {
        let consistency = ConsistencyEngine::new(store.clone());
        Self { store, consistency }
    }

    pub fn get_rooms(&self, query: RoomQuery) -> Result<Page<RoomView>, ServiceError> {
        let mut rooms = self.store.rooms()?;

        if let Some(status) = query.status {
            rooms.retain(|room| room.status == status);
        }
        if let Some(keyword) = query
            .search_keyword
            .as_deref()
            .filter(|keyword| !keyword.is_empty())
        {
            let keyword = keyword.to_lowercase();
            rooms.retain(|room| room.room_number.to_lowercase().contains(&keyword));
        }
        rooms.sort_by(|a, b| a.room_number.cmp(&b.room_number));

        let total = rooms.len();
        let list = rooms
            .into_iter()
            .skip(query.page.offset())
            .take(query.page.page_size)
            .map(|room| self.consistency.resolve_on_read(room))
            .collect::<Result<Vec<RoomView>, ServiceError>>()?;

        Ok(Page {
            list,
            total,
            page_num: query.page.page_num,
            page_size: query.page.page_size,
        })
    }

    pub fn get_room_by_id(&self, id: &RoomId) -> Result<Room, ServiceError> {
        self.store
            .room(id)?
            .ok_or_else(|| ServiceError::not_found("房间不存在"))
    }

    pub fn add_room(&self, params: AddRoomParams) -> Result<Room, ServiceError> {
        if self.store.room_by_number(&params.room_number)?.is_some() {
            return Err(ServiceError::validation("房间号已存在"));
        }

        let now = Utc::now();
        let room = Room {
            id: next_room_id(),
            room_number: params.room_number,
            floor: params.floor,
            rent_price: params.rent_price,
            status: params.status.unwrap_or(RoomStatus::Available),
            current_rental_id: None,
            utilities: params.utilities.unwrap_or_default(),
            create_date: now,
            update_date: now,
        };

        Ok(self.store.insert_room(room)?)
    }

    pub fn update_room(&self, params: UpdateRoomParams) -> Result<Room, ServiceError> {
        let mut room = self.get_room_by_id(&params.id)?;

        if let Some(room_number) = params.room_number {
            if room_number != room.room_number
                && self.store.room_by_number(&room_number)?.is_some()
            {
                return Err(ServiceError::validation("房间号已存在"));
            }
            room.room_number = room_number;
        }
        if let Some(floor) = params.floor {
            room.floor = floor;
        }
        if let Some(rent_price) = params.rent_price {
            room.rent_price = rent_price;
        }
        if let Some(status) = params.status {
            room.status = status;
        }
        if let Some(utilities) = params.utilities {
            room.utilities = utilities;
        }
        room.update_date = Utc::now();

        self.store.update_room(&room)?;
        Ok(room)
    }

    pub fn delete_room(&self, id: &RoomId) -> Result<(), ServiceError> {
        let room = self.get_room_by_id(id)?;
        if room.status == RoomStatus::Rented {
            return Err(ServiceError::validation("该房间有租户，无法删除"));
        }
        self.store.remove_room(id)?;
        Ok(())
    }
}
