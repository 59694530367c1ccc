use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{Store, StoreError};
use crate::domain::{
    MaintenanceId, MaintenanceRecord, Rental, RentalId, RentalStatus, Room, RoomId, Tenant,
    TenantId, User, UserId, UtilityRecord, UtilityRecordId,
};

/// In-process store used by the service binary, the demo, and tests.
/// Collections are plain maps; listings come back in insertion-id order
/// so paging stays stable.
#[derive(Default, Clone)]
pub struct MemoryStore {
    rooms: Arc<Mutex<HashMap<RoomId, Room>>>,
    tenants: Arc<Mutex<HashMap<TenantId, Tenant>>>,
    rentals: Arc<Mutex<HashMap<RentalId, Rental>>>,
    utility_records: Arc<Mutex<HashMap<UtilityRecordId, UtilityRecord>>>,
    maintenance_records: Arc<Mutex<HashMap<MaintenanceId, MaintenanceRecord>>>,
    users: Arc<Mutex<HashMap<UserId, User>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn insert_room(&self, room: Room) -> Result<Room, StoreError> {
        let mut guard = self.rooms.lock().expect("store mutex poisoned");
        if guard.contains_key(&room.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(room.id.clone(), room.clone());
        Ok(room)
    }

    fn update_room(&self, room: &Room) -> Result<(), StoreError> {
        let mut guard = self.rooms.lock().expect("store mutex poisoned");
        if !guard.contains_key(&room.id) {
            return Err(StoreError::NotFound);
        }
        guard.insert(room.id.clone(), room.clone());
        Ok(())
    }

    fn room(&self, id: &RoomId) -> Result<Option<Room>, StoreError> {
        let guard = self.rooms.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn remove_room(&self, id: &RoomId) -> Result<(), StoreError> {
        let mut guard = self.rooms.lock().expect("store mutex poisoned");
        guard.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn rooms(&self) -> Result<Vec<Room>, StoreError> {
        let guard = self.rooms.lock().expect("store mutex poisoned");
        let mut rooms: Vec<Room> = guard.values().cloned().collect();
        rooms.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(rooms)
    }

    fn room_by_number(&self, room_number: &str) -> Result<Option<Room>, StoreError> {
        let guard = self.rooms.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .find(|room| room.room_number == room_number)
            .cloned())
    }

    fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant, StoreError> {
        let mut guard = self.tenants.lock().expect("store mutex poisoned");
        if guard.contains_key(&tenant.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(tenant.id.clone(), tenant.clone());
        Ok(tenant)
    }

    fn update_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let mut guard = self.tenants.lock().expect("store mutex poisoned");
        if !guard.contains_key(&tenant.id) {
            return Err(StoreError::NotFound);
        }
        guard.insert(tenant.id.clone(), tenant.clone());
        Ok(())
    }

    fn tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        let guard = self.tenants.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn remove_tenant(&self, id: &TenantId) -> Result<(), StoreError> {
        let mut guard = self.tenants.lock().expect("store mutex poisoned");
        guard.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let guard = self.tenants.lock().expect("store mutex poisoned");
        let mut tenants: Vec<Tenant> = guard.values().cloned().collect();
        tenants.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(tenants)
    }

    fn tenant_by_id_card(&self, id_card: &str) -> Result<Option<Tenant>, StoreError> {
        let guard = self.tenants.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .find(|tenant| tenant.id_card == id_card)
            .cloned())
    }

    fn insert_rental(&self, rental: Rental) -> Result<Rental, StoreError> {
        let mut guard = self.rentals.lock().expect("store mutex poisoned");
        if guard.contains_key(&rental.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(rental.id.clone(), rental.clone());
        Ok(rental)
    }

    fn update_rental(&self, rental: &Rental) -> Result<(), StoreError> {
        let mut guard = self.rentals.lock().expect("store mutex poisoned");
        if !guard.contains_key(&rental.id) {
            return Err(StoreError::NotFound);
        }
        guard.insert(rental.id.clone(), rental.clone());
        Ok(())
    }

    fn rental(&self, id: &RentalId) -> Result<Option<Rental>, StoreError> {
        let guard = self.rentals.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn rentals(&self) -> Result<Vec<Rental>, StoreError> {
        let guard = self.rentals.lock().expect("store mutex poisoned");
        let mut rentals: Vec<Rental> = guard.values().cloned().collect();
        rentals.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(rentals)
    }

    fn rentals_for_room(&self, room_id: &RoomId) -> Result<Vec<Rental>, StoreError> {
        let guard = self.rentals.lock().expect("store mutex poisoned");
        let mut rentals: Vec<Rental> = guard
            .values()
            .filter(|rental| &rental.room_id == room_id)
            .cloned()
            .collect();
        rentals.sort_by(|a, b| b.create_date.cmp(&a.create_date));
        Ok(rentals)
    }

    fn active_rental_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Rental>, StoreError> {
        let guard = self.rentals.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .find(|rental| {
                &rental.tenant_id == tenant_id && rental.status == RentalStatus::Active
            })
            .cloned())
    }

    fn insert_utility_record(&self, record: UtilityRecord) -> Result<UtilityRecord, StoreError> {
        let mut guard = self.utility_records.lock().expect("store mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_utility_record(&self, record: &UtilityRecord) -> Result<(), StoreError> {
        let mut guard = self.utility_records.lock().expect("store mutex poisoned");
        if !guard.contains_key(&record.id) {
            return Err(StoreError::NotFound);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn utility_record(&self, id: &UtilityRecordId) -> Result<Option<UtilityRecord>, StoreError> {
        let guard = self.utility_records.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn utility_records(&self) -> Result<Vec<UtilityRecord>, StoreError> {
        let guard = self.utility_records.lock().expect("store mutex poisoned");
        let mut records: Vec<UtilityRecord> = guard.values().cloned().collect();
        records.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(records)
    }

    fn utility_record_for_period(
        &self,
        rental_id: &RentalId,
        billing_year: i32,
        billing_month: u32,
    ) -> Result<Option<UtilityRecord>, StoreError> {
        let guard = self.utility_records.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .find(|record| {
                &record.rental_id == rental_id
                    && record.billing_year == billing_year
                    && record.billing_month == billing_month
            })
            .cloned())
    }

    fn insert_maintenance_record(
        &self,
        record: MaintenanceRecord,
    ) -> Result<MaintenanceRecord, StoreError> {
        let mut guard = self
            .maintenance_records
            .lock()
            .expect("store mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_maintenance_record(&self, record: &MaintenanceRecord) -> Result<(), StoreError> {
        let mut guard = self
            .maintenance_records
            .lock()
            .expect("store mutex poisoned");
        if !guard.contains_key(&record.id) {
            return Err(StoreError::NotFound);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn maintenance_record(
        &self,
        id: &MaintenanceId,
    ) -> Result<Option<MaintenanceRecord>, StoreError> {
        let guard = self
            .maintenance_records
            .lock()
            .expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn remove_maintenance_record(&self, id: &MaintenanceId) -> Result<(), StoreError> {
        let mut guard = self
            .maintenance_records
            .lock()
            .expect("store mutex poisoned");
        guard.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn maintenance_records(&self) -> Result<Vec<MaintenanceRecord>, StoreError> {
        let guard = self
            .maintenance_records
            .lock()
            .expect("store mutex poisoned");
        let mut records: Vec<MaintenanceRecord> = guard.values().cloned().collect();
        records.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(records)
    }

    fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let mut guard = self.users.lock().expect("store mutex poisoned");
        if guard.contains_key(&user.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut guard = self.users.lock().expect("store mutex poisoned");
        if !guard.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }
        guard.insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let guard = self.users.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn users(&self) -> Result<Vec<User>, StoreError> {
        let guard = self.users.lock().expect("store mutex poisoned");
        let mut users: Vec<User> = guard.values().cloned().collect();
        users.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(users)
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let guard = self.users.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .find(|user| user.username == username)
            .cloned())
    }
}
