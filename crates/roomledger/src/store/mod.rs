//! Storage abstraction over the external document store.
//!
//! The backing store is treated as a plain document database: point
//! reads/writes per collection plus the handful of targeted lookups the
//! handlers need. No transactions, joins, or triggers — multi-step
//! read-modify-write sequences in the services rely on low contention,
//! and the consistency engine repairs whatever drift slips through.

mod memory;

pub use memory::MemoryStore;

use crate::domain::{
    MaintenanceId, MaintenanceRecord, Rental, RentalId, Room, RoomId, Tenant, TenantId, User,
    UserId, UtilityRecord, UtilityRecordId,
};

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document already exists")]
    Conflict,
    #[error("document not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Document-store client surface, one group of methods per collection.
///
/// `insert_*` fails with [`StoreError::Conflict`] on a duplicate id,
/// `update_*` with [`StoreError::NotFound`] when the document is absent.
/// Filtering beyond the targeted finders happens service-side over the
/// full listing.
pub trait Store: Send + Sync {
    // rooms
    fn insert_room(&self, room: Room) -> Result<Room, StoreError>;
    fn update_room(&self, room: &Room) -> Result<(), StoreError>;
    fn room(&self, id: &RoomId) -> Result<Option<Room>, StoreError>;
    fn remove_room(&self, id: &RoomId) -> Result<(), StoreError>;
    fn rooms(&self) -> Result<Vec<Room>, StoreError>;
    fn room_by_number(&self, room_number: &str) -> Result<Option<Room>, StoreError>;

    // tenants
    fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant, StoreError>;
    fn update_tenant(&self, tenant: &Tenant) -> Result<(), StoreError>;
    fn tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError>;
    fn remove_tenant(&self, id: &TenantId) -> Result<(), StoreError>;
    fn tenants(&self) -> Result<Vec<Tenant>, StoreError>;
    fn tenant_by_id_card(&self, id_card: &str) -> Result<Option<Tenant>, StoreError>;

    // rentals (never removed; lifecycle transitions only)
    fn insert_rental(&self, rental: Rental) -> Result<Rental, StoreError>;
    fn update_rental(&self, rental: &Rental) -> Result<(), StoreError>;
    fn rental(&self, id: &RentalId) -> Result<Option<Rental>, StoreError>;
    fn rentals(&self) -> Result<Vec<Rental>, StoreError>;
    fn rentals_for_room(&self, room_id: &RoomId) -> Result<Vec<Rental>, StoreError>;
    fn active_rental_for_tenant(&self, tenant_id: &TenantId)
        -> Result<Option<Rental>, StoreError>;

    // utility records
    fn insert_utility_record(&self, record: UtilityRecord) -> Result<UtilityRecord, StoreError>;
    fn update_utility_record(&self, record: &UtilityRecord) -> Result<(), StoreError>;
    fn utility_record(&self, id: &UtilityRecordId) -> Result<Option<UtilityRecord>, StoreError>;
    fn utility_records(&self) -> Result<Vec<UtilityRecord>, StoreError>;
    fn utility_record_for_period(
        &self,
        rental_id: &RentalId,
        billing_year: i32,
        billing_month: u32,
    ) -> Result<Option<UtilityRecord>, StoreError>;

    // maintenance records
    fn insert_maintenance_record(
        &self,
        record: MaintenanceRecord,
    ) -> Result<MaintenanceRecord, StoreError>;
    fn update_maintenance_record(&self, record: &MaintenanceRecord) -> Result<(), StoreError>;
    fn maintenance_record(&self, id: &MaintenanceId)
        -> Result<Option<MaintenanceRecord>, StoreError>;
    fn remove_maintenance_record(&self, id: &MaintenanceId) -> Result<(), StoreError>;
    fn maintenance_records(&self) -> Result<Vec<MaintenanceRecord>, StoreError>;

    // users
    fn insert_user(&self, user: User) -> Result<User, StoreError>;
    fn update_user(&self, user: &User) -> Result<(), StoreError>;
    fn user(&self, id: &UserId) -> Result<Option<User>, StoreError>;
    fn users(&self) -> Result<Vec<User>, StoreError>;
    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
}
