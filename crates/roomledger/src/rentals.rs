//! Rental lifecycle: create, terminate, renew, and the read paths that
//! join room and tenant details onto rental rows.
//!
//! `active` is the sole non-terminal state. Renewal never resurrects a
//! rental: the old row is completed and a fresh active row is inserted
//! with `previous_rental_id` pointing back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Page, PageParams, Rental, RentalId, RentalStatus, Room, RoomId, RoomStatus, Tenant, TenantId,
};
use crate::error::ServiceError;
use crate::store::Store;

static RENTAL_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_rental_id() -> RentalId {
    let id = RENTAL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RentalId(format!("rental-{id:06}"))
}

#[derive(Debug, Deserialize)]
pub struct CreateRentalParams {
    pub room_id: RoomId,
    pub tenant_id: TenantId,
    pub rent_price: f64,
    #[serde(default)]
    pub deposit: f64,
    pub rent_start_date: NaiveDate,
    pub rent_end_date: NaiveDate,
    #[serde(default)]
    pub utilities_included: bool,
    #[serde(default)]
    pub electricity_start_reading: f64,
    #[serde(default)]
    pub water_start_reading: f64,
    #[serde(default)]
    pub contract_notes: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedRental {
    pub rental_id: RentalId,
}

#[derive(Debug, Deserialize)]
pub struct TerminateRentalParams {
    pub rental_id: RentalId,
    pub termination_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenewRentalParams {
    pub rental_id: RentalId,
    pub new_rent_end_date: NaiveDate,
    pub new_rent_price: Option<f64>,
    #[serde(default)]
    pub electricity_reading: f64,
    #[serde(default)]
    pub water_reading: f64,
    pub contract_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RenewedRental {
    pub new_rental_id: RentalId,
    pub previous_rental_id: RentalId,
}

#[derive(Debug, Default, Deserialize)]
pub struct RentalQuery {
    pub status: Option<RentalStatus>,
    #[serde(flatten)]
    pub page: PageParams,
}

#[derive(Debug, Deserialize)]
pub struct RentalIdParams {
    pub rental_id: RentalId,
}

#[derive(Debug, Deserialize)]
pub struct RoomRentalsParams {
    pub room_id: RoomId,
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    #[serde(default = "ExpiringQuery::default_days_ahead")]
    pub days_ahead: i64,
}

impl ExpiringQuery {
    fn default_days_ahead() -> i64 {
        30
    }
}

impl Default for ExpiringQuery {
    fn default() -> Self {
        Self {
            days_ahead: Self::default_days_ahead(),
        }
    }
}

/// Rental row with room and tenant details joined on for display.
#[derive(Debug, Clone, Serialize)]
pub struct RentalView {
    #[serde(flatten)]
    pub rental: Rental,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_info: Option<Room>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_info: Option<Tenant>,
}

pub struct RentalService<S> {
    store: Arc<S>,
}

impl<S: Store> RentalService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Creates a rental and flips the room to rented with the cached
    /// pointer set. Both the room and the tenant must be free.
    pub fn create_rental(&self, params: CreateRentalParams) -> Result<CreatedRental, ServiceError> {
        let mut room = self
            .store
            .room(&params.room_id)?
            .ok_or_else(|| ServiceError::not_found("房间不存在"))?;

        if room.status != RoomStatus::Available {
            return Err(ServiceError::validation("房间不可租用"));
        }

        if self.store.tenant(&params.tenant_id)?.is_none() {
            return Err(ServiceError::not_found("租户不存在"));
        }

        if self
            .store
            .active_rental_for_tenant(&params.tenant_id)?
            .is_some()
        {
            return Err(ServiceError::validation("该租户已有活跃租赁关系"));
        }

        let now = Utc::now();
        let rental = Rental {
            id: next_rental_id(),
            room_id: params.room_id,
            tenant_id: params.tenant_id,
            rent_price: params.rent_price,
            deposit: params.deposit,
            rent_start_date: params.rent_start_date,
            rent_end_date: params.rent_end_date,
            status: RentalStatus::Active,
            utilities_included: params.utilities_included,
            electricity_start_reading: params.electricity_start_reading,
            water_start_reading: params.water_start_reading,
            contract_notes: params.contract_notes,
            is_renewal: false,
            previous_rental_id: None,
            renewal_date: None,
            actual_end_date: None,
            termination_date: None,
            termination_reason: None,
            create_date: now,
            update_date: now,
        };

        let rental = self.store.insert_rental(rental)?;

        room.status = RoomStatus::Rented;
        room.current_rental_id = Some(rental.id.clone());
        room.update_date = now;
        self.store.update_room(&room)?;

        Ok(CreatedRental {
            rental_id: rental.id,
        })
    }

    /// Marks the rental terminated and releases its room.
    pub fn terminate_rental(&self, params: TerminateRentalParams) -> Result<(), ServiceError> {
        let mut rental = self
            .store
            .rental(&params.rental_id)?
            .ok_or_else(|| ServiceError::not_found("租赁关系不存在"))?;

        let now = Utc::now();
        rental.status = RentalStatus::Terminated;
        rental.termination_date = Some(now);
        rental.termination_reason = Some(params.termination_reason.unwrap_or_default());
        rental.update_date = now;
        self.store.update_rental(&rental)?;

        if let Some(mut room) = self.store.room(&rental.room_id)? {
            room.status = RoomStatus::Available;
            room.current_rental_id = None;
            room.update_date = now;
            self.store.update_room(&room)?;
        }

        Ok(())
    }

    /// Completes the current rental and inserts a fresh active row
    /// starting today, carrying the deposit and the utilities-included
    /// flag forward. The room's pointer moves to the new rental.
    pub fn renew_rental(&self, params: RenewRentalParams) -> Result<RenewedRental, ServiceError> {
        let mut current = self
            .store
            .rental(&params.rental_id)?
            .ok_or_else(|| ServiceError::not_found("租赁关系不存在"))?;

        if current.status != RentalStatus::Active {
            return Err(ServiceError::validation("只有活跃的租赁关系才能续租"));
        }

        let mut room = self
            .store
            .room(&current.room_id)?
            .ok_or_else(|| ServiceError::not_found("房间不存在"))?;

        let now = Utc::now();
        current.status = RentalStatus::Completed;
        current.actual_end_date = Some(now);
        current.update_date = now;
        self.store.update_rental(&current)?;

        let renewal = Rental {
            id: next_rental_id(),
            room_id: current.room_id.clone(),
            tenant_id: current.tenant_id.clone(),
            rent_price: params.new_rent_price.unwrap_or(current.rent_price),
            deposit: current.deposit,
            rent_start_date: now.date_naive(),
            rent_end_date: params.new_rent_end_date,
            status: RentalStatus::Active,
            utilities_included: current.utilities_included,
            electricity_start_reading: params.electricity_reading,
            water_start_reading: params.water_reading,
            contract_notes: params
                .contract_notes
                .unwrap_or_else(|| format!("续租合同 - 原租赁ID: {}", current.id)),
            is_renewal: true,
            previous_rental_id: Some(current.id.clone()),
            renewal_date: Some(now),
            actual_end_date: None,
            termination_date: None,
            termination_reason: None,
            create_date: now,
            update_date: now,
        };
        let renewal = self.store.insert_rental(renewal)?;

        room.current_rental_id = Some(renewal.id.clone());
        room.update_date = now;
        self.store.update_room(&room)?;

        Ok(RenewedRental {
            new_rental_id: renewal.id,
            previous_rental_id: current.id,
        })
    }

    pub fn get_rental_info(&self, rental_id: &RentalId) -> Result<RentalView, ServiceError> {
        let rental = self
            .store
            .rental(rental_id)?
            .ok_or_else(|| ServiceError::not_found("租赁关系不存在"))?;
        self.with_details(rental)
    }

    pub fn get_rentals(&self, query: RentalQuery) -> Result<Page<RentalView>, ServiceError> {
        let mut rentals = self.store.rentals()?;
        if let Some(status) = query.status {
            rentals.retain(|rental| rental.status == status);
        }
        rentals.sort_by(|a, b| b.create_date.cmp(&a.create_date));

        let total = rentals.len();
        let list = rentals
            .into_iter()
            .skip(query.page.offset())
            .take(query.page.page_size)
            .map(|rental| self.with_details(rental))
            .collect::<Result<Vec<RentalView>, ServiceError>>()?;

        Ok(Page {
            list,
            total,
            page_num: query.page.page_num,
            page_size: query.page.page_size,
        })
    }

    /// Rental history of one room, newest first.
    pub fn get_rentals_by_room(&self, room_id: &RoomId) -> Result<Vec<RentalView>, ServiceError> {
        self.store
            .rentals_for_room(room_id)?
            .into_iter()
            .map(|rental| self.with_details(rental))
            .collect()
    }

    /// Active rentals ending within `days_ahead` days of `today`.
    pub fn get_expiring_rentals(
        &self,
        query: ExpiringQuery,
        today: NaiveDate,
    ) -> Result<Vec<RentalView>, ServiceError> {
        let cutoff = today + Duration::days(query.days_ahead);
        let mut expiring: Vec<Rental> = self
            .store
            .rentals()?
            .into_iter()
            .filter(|rental| {
                rental.status == RentalStatus::Active && rental.rent_end_date <= cutoff
            })
            .collect();
        expiring.sort_by(|a, b| a.rent_end_date.cmp(&b.rent_end_date));
        expiring
            .into_iter()
            .map(|rental| self.with_details(rental))
            .collect()
    }

    fn with_details(&self, rental: Rental) -> Result<RentalView, ServiceError> {
        let room_info = self.store.room(&rental.room_id)?;
        let tenant_info = self.store.tenant(&rental.tenant_id)?;
        Ok(RentalView {
            rental,
            room_info,
            tenant_info,
        })
    }
}
