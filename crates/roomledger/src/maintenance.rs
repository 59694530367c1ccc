//! Maintenance records: per-room repair history, warranty tracking, and
//! the cost rollups the income statistics pull from.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    MaintenanceId, MaintenanceRecord, MaintenanceStatus, PageParams, Room, RoomId,
};
use crate::error::ServiceError;
use crate::store::Store;

static MAINTENANCE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_maintenance_id() -> MaintenanceId {
    let id = MAINTENANCE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    MaintenanceId(format!("maint-{id:06}"))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Deserialize)]
pub struct AddMaintenanceParams {
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    pub maintenance_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CreatedMaintenanceRecord {
    pub maintenance_id: MaintenanceId,
}

#[derive(Debug, Default, Deserialize)]
pub struct MaintenanceQuery {
    #[serde(rename = "roomId", alias = "room_id")]
    pub room_id: Option<RoomId>,
    pub status: Option<MaintenanceStatus>,
    pub maintenance_type: Option<String>,
    #[serde(flatten)]
    pub page: PageParams,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMaintenanceParams {
    pub id: MaintenanceId,
    pub maintenance_date: Option<NaiveDate>,
    pub maintenance_type: Option<String>,
    pub description: Option<String>,
    pub cost: Option<f64>,
    pub maintenance_company: Option<String>,
    pub contact_phone: Option<String>,
    pub warranty_period: Option<i64>,
    pub status: Option<MaintenanceStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceIdParams {
    pub id: MaintenanceId,
}

#[derive(Debug, Deserialize)]
pub struct ExpiringWarrantyQuery {
    #[serde(default = "ExpiringWarrantyQuery::default_days_ahead")]
    pub days_ahead: i64,
}

impl ExpiringWarrantyQuery {
    fn default_days_ahead() -> i64 {
        30
    }
}

impl Default for ExpiringWarrantyQuery {
    fn default() -> Self {
        Self {
            days_ahead: Self::default_days_ahead(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RoomStatsParams {
    pub room_id: RoomId,
    pub year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MaintenanceCostQuery {
    pub room_id: Option<RoomId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiringWarranty {
    #[serde(flatten)]
    pub record: MaintenanceRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_info: Option<Room>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct TypeBucket {
    pub count: usize,
    pub cost: f64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RoomBucket {
    pub count: usize,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceCostStats {
    pub total_cost: f64,
    pub record_count: usize,
    pub room_stats: BTreeMap<String, RoomBucket>,
    pub type_stats: BTreeMap<String, TypeBucket>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomMaintenanceStats {
    pub total_cost: f64,
    pub record_count: usize,
    pub type_stats: BTreeMap<String, TypeBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_stats: Option<BTreeMap<u32, TypeBucket>>,
    pub records: Vec<MaintenanceRecord>,
}

pub struct MaintenanceService<S> {
    store: Arc<S>,
}

impl<S: Store> MaintenanceService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Records a completed repair against an existing room. The intake
    /// form only carries a cost and description, so type defaults to
    /// `general` and the warranty window starts at zero.
    pub fn add_record(
        &self,
        params: AddMaintenanceParams,
    ) -> Result<CreatedMaintenanceRecord, ServiceError> {
        if self.store.room(&params.room_id)?.is_none() {
            return Err(ServiceError::not_found("房间不存在"));
        }

        let now = Utc::now();
        let record = MaintenanceRecord {
            id: next_maintenance_id(),
            room_id: params.room_id,
            maintenance_date: params.maintenance_date.unwrap_or_else(|| now.date_naive()),
            maintenance_type: "general".to_string(),
            description: params.description,
            cost: params.amount,
            maintenance_company: String::new(),
            contact_phone: String::new(),
            warranty_period: 0,
            warranty_end_date: None,
            status: MaintenanceStatus::Completed,
            notes: String::new(),
            create_date: now,
            update_date: now,
        };
        let record = self.store.insert_maintenance_record(record)?;

        Ok(CreatedMaintenanceRecord {
            maintenance_id: record.id,
        })
    }

    pub fn get_records(
        &self,
        query: MaintenanceQuery,
    ) -> Result<Vec<MaintenanceRecord>, ServiceError> {
        let mut records = self.store.maintenance_records()?;
        if let Some(room_id) = &query.room_id {
            records.retain(|record| &record.room_id == room_id);
        }
        if let Some(status) = query.status {
            records.retain(|record| record.status == status);
        }
        if let Some(maintenance_type) = &query.maintenance_type {
            records.retain(|record| &record.maintenance_type == maintenance_type);
        }
        records.sort_by(|a, b| b.maintenance_date.cmp(&a.maintenance_date));

        Ok(records
            .into_iter()
            .skip(query.page.offset())
            .take(query.page.page_size)
            .collect())
    }

    pub fn update_record(
        &self,
        params: UpdateMaintenanceParams,
    ) -> Result<MaintenanceRecord, ServiceError> {
        let mut record = self
            .store
            .maintenance_record(&params.id)?
            .ok_or_else(|| ServiceError::not_found("维修记录不存在"))?;

        if let Some(maintenance_date) = params.maintenance_date {
            record.maintenance_date = maintenance_date;
        }
        if let Some(maintenance_type) = params.maintenance_type {
            record.maintenance_type = maintenance_type;
        }
        if let Some(description) = params.description {
            record.description = description;
        }
        if let Some(cost) = params.cost {
            record.cost = cost;
        }
        if let Some(maintenance_company) = params.maintenance_company {
            record.maintenance_company = maintenance_company;
        }
        if let Some(contact_phone) = params.contact_phone {
            record.contact_phone = contact_phone;
        }
        if let Some(warranty_period) = params.warranty_period {
            record.warranty_period = warranty_period;
            // Warranty runs from the maintenance date.
            record.warranty_end_date = if warranty_period > 0 {
                Some(record.maintenance_date + Duration::days(warranty_period))
            } else {
                None
            };
        }
        if let Some(status) = params.status {
            record.status = status;
        }
        if let Some(notes) = params.notes {
            record.notes = notes;
        }
        record.update_date = Utc::now();

        self.store.update_maintenance_record(&record)?;
        Ok(record)
    }

    pub fn delete_record(&self, id: &MaintenanceId) -> Result<(), ServiceError> {
        if self.store.maintenance_record(id)?.is_none() {
            return Err(ServiceError::not_found("维修记录不存在"));
        }
        self.store.remove_maintenance_record(id)?;
        Ok(())
    }

    /// Warranties ending within `days_ahead` days of `today`, soonest
    /// first, with the room joined on.
    pub fn get_expiring_warranties(
        &self,
        query: ExpiringWarrantyQuery,
        today: NaiveDate,
    ) -> Result<Vec<ExpiringWarranty>, ServiceError> {
        let cutoff = today + Duration::days(query.days_ahead);
        let mut expiring: Vec<MaintenanceRecord> = self
            .store
            .maintenance_records()?
            .into_iter()
            .filter(|record| {
                record.status != MaintenanceStatus::WarrantyExpired
                    && record
                        .warranty_end_date
                        .map(|end| end >= today && end <= cutoff)
                        .unwrap_or(false)
            })
            .collect();
        expiring.sort_by(|a, b| a.warranty_end_date.cmp(&b.warranty_end_date));

        expiring
            .into_iter()
            .map(|record| {
                let room_info = self.store.room(&record.room_id)?;
                Ok(ExpiringWarranty { record, room_info })
            })
            .collect()
    }

    /// Per-room maintenance rollup, optionally restricted to one year
    /// (which also enables the month-by-month breakdown).
    pub fn get_room_stats(
        &self,
        room_id: &RoomId,
        year: Option<i32>,
    ) -> Result<RoomMaintenanceStats, ServiceError> {
        let mut records: Vec<MaintenanceRecord> = self
            .store
            .maintenance_records()?
            .into_iter()
            .filter(|record| &record.room_id == room_id)
            .filter(|record| year.map_or(true, |year| record.maintenance_date.year() == year))
            .collect();
        records.sort_by(|a, b| b.maintenance_date.cmp(&a.maintenance_date));

        let total_cost = round2(records.iter().map(|record| record.cost).sum());
        let mut type_stats: BTreeMap<String, TypeBucket> = BTreeMap::new();
        for record in &records {
            let bucket = type_stats.entry(record.maintenance_type.clone()).or_default();
            bucket.count += 1;
            bucket.cost = round2(bucket.cost + record.cost);
        }

        let monthly_stats = year.map(|_| {
            let mut months: BTreeMap<u32, TypeBucket> =
                (1..=12).map(|month| (month, TypeBucket::default())).collect();
            for record in &records {
                let bucket = months
                    .entry(record.maintenance_date.month())
                    .or_default();
                bucket.count += 1;
                bucket.cost = round2(bucket.cost + record.cost);
            }
            months
        });

        Ok(RoomMaintenanceStats {
            total_cost,
            record_count: records.len(),
            type_stats,
            monthly_stats,
            records,
        })
    }

    /// Cost rollup over an optional room and date window, grouped by
    /// room and by type. Feeds the income statistics.
    pub fn get_cost_stats(
        &self,
        query: MaintenanceCostQuery,
    ) -> Result<MaintenanceCostStats, ServiceError> {
        let mut records = self.store.maintenance_records()?;
        if let Some(room_id) = &query.room_id {
            records.retain(|record| &record.room_id == room_id);
        }
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            records.retain(|record| {
                record.maintenance_date >= start && record.maintenance_date <= end
            });
        }

        let total_cost = round2(records.iter().map(|record| record.cost).sum());
        let mut room_stats: BTreeMap<String, RoomBucket> = BTreeMap::new();
        let mut type_stats: BTreeMap<String, TypeBucket> = BTreeMap::new();
        for record in &records {
            let room_bucket = room_stats.entry(record.room_id.0.clone()).or_default();
            room_bucket.count += 1;
            room_bucket.cost = round2(room_bucket.cost + record.cost);

            let type_bucket = type_stats.entry(record.maintenance_type.clone()).or_default();
            type_bucket.count += 1;
            type_bucket.cost = round2(type_bucket.cost + record.cost);
        }

        Ok(MaintenanceCostStats {
            total_cost,
            record_count: records.len(),
            room_stats,
            type_stats,
        })
    }
}
