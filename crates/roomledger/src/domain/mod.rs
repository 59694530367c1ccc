//! Entities persisted in the document store, plus shared paging types.
//!
//! Ids are plain strings issued by the services (the store never invents
//! keys). Monetary amounts and meter readings are `f64` to match the
//! source data; calendar fields are `NaiveDate`, audit timestamps
//! `DateTime<Utc>`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(RoomId);
string_id!(TenantId);
string_id!(RentalId);
string_id!(UtilityRecordId);
string_id!(MaintenanceId);
string_id!(UserId);

/// Room occupancy state. `Rented` is only valid while
/// `current_rental_id` resolves to an active rental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Available,
    Rented,
    Maintenance,
}

impl RoomStatus {
    pub fn label(self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Rented => "rented",
            RoomStatus::Maintenance => "maintenance",
        }
    }
}

/// Meter readings and unit rates carried on the room document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomUtilities {
    #[serde(default)]
    pub electricity_reading: f64,
    #[serde(default)]
    pub water_reading: f64,
    #[serde(default = "RoomUtilities::default_electricity_rate")]
    pub electricity_rate: f64,
    #[serde(default = "RoomUtilities::default_water_rate")]
    pub water_rate: f64,
}

impl RoomUtilities {
    fn default_electricity_rate() -> f64 {
        0.5
    }

    fn default_water_rate() -> f64 {
        3.0
    }
}

impl Default for RoomUtilities {
    fn default() -> Self {
        Self {
            electricity_reading: 0.0,
            water_reading: 0.0,
            electricity_rate: Self::default_electricity_rate(),
            water_rate: Self::default_water_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub room_number: String,
    pub floor: i32,
    pub rent_price: f64,
    pub status: RoomStatus,
    /// Cached pointer to the active rental. A back-reference for fast
    /// lookup only; the rental's own `room_id` + `status` stay the
    /// source of truth.
    pub current_rental_id: Option<RentalId>,
    pub utilities: RoomUtilities,
    pub create_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub id_card: String,
    pub phone: String,
    pub status: TenantStatus,
    pub create_date: DateTime<Utc>,
}

/// Rental lifecycle. `Active` is the sole non-terminal state; renewal
/// completes the old row and inserts a fresh one rather than reusing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalStatus {
    Active,
    Completed,
    Terminated,
}

impl RentalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RentalStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rental {
    pub id: RentalId,
    pub room_id: RoomId,
    pub tenant_id: TenantId,
    pub rent_price: f64,
    pub deposit: f64,
    pub rent_start_date: NaiveDate,
    pub rent_end_date: NaiveDate,
    pub status: RentalStatus,
    pub utilities_included: bool,
    pub electricity_start_reading: f64,
    pub water_start_reading: f64,
    pub contract_notes: String,
    #[serde(default)]
    pub is_renewal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_rental_id: Option<RentalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
    pub create_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Overdue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilityRecord {
    pub id: UtilityRecordId,
    pub rental_id: RentalId,
    pub room_id: RoomId,
    pub tenant_id: TenantId,
    pub billing_year: i32,
    pub billing_month: u32,
    pub record_date: NaiveDate,
    pub electricity_reading: f64,
    pub water_reading: f64,
    pub previous_electricity_reading: f64,
    pub previous_water_reading: f64,
    pub electricity_usage: f64,
    pub water_usage: f64,
    pub electricity_fee: f64,
    pub water_fee: f64,
    pub total_fee: f64,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub notes: String,
    pub create_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    Pending,
    InProgress,
    Completed,
    WarrantyExpired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: MaintenanceId,
    pub room_id: RoomId,
    pub maintenance_date: NaiveDate,
    pub maintenance_type: String,
    pub description: String,
    pub cost: f64,
    pub maintenance_company: String,
    pub contact_phone: String,
    /// Warranty window in days from `maintenance_date`.
    pub warranty_period: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warranty_end_date: Option<NaiveDate>,
    pub status: MaintenanceStatus,
    pub notes: String,
    pub create_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Stored in plaintext for compatibility with the legacy data. A
    /// known defect, not a feature.
    pub password: String,
    pub name: String,
    pub role: UserRole,
    pub status: UserStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_update_date: Option<DateTime<Utc>>,
    pub create_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
}

/// Paging parameters shared by every list action.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    #[serde(rename = "pageSize", default = "PageParams::default_page_size")]
    pub page_size: usize,
    #[serde(rename = "pageNum", default = "PageParams::default_page_num")]
    pub page_num: usize,
}

impl PageParams {
    fn default_page_size() -> usize {
        20
    }

    fn default_page_num() -> usize {
        1
    }

    pub fn offset(&self) -> usize {
        self.page_num.saturating_sub(1) * self.page_size
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page_size: Self::default_page_size(),
            page_num: Self::default_page_num(),
        }
    }
}

/// One page of results plus the unpaged total.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub list: Vec<T>,
    pub total: usize,
    #[serde(rename = "pageNum")]
    pub page_num: usize,
    #[serde(rename = "pageSize")]
    pub page_size: usize,
}

impl<T> Page<T> {
    /// Applies paging over an already filtered and sorted set.
    pub fn slice(items: Vec<T>, params: PageParams) -> Self {
        let total = items.len();
        let list = items
            .into_iter()
            .skip(params.offset())
            .take(params.page_size)
            .collect();
        Self {
            list,
            total,
            page_num: params.page_num,
            page_size: params.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_slice_respects_bounds() {
        let params = PageParams {
            page_size: 2,
            page_num: 2,
        };
        let page = Page::slice(vec![1, 2, 3, 4, 5], params);
        assert_eq!(page.list, vec![3, 4]);
        assert_eq!(page.total, 5);
        assert_eq!(page.page_num, 2);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let params = PageParams {
            page_size: 10,
            page_num: 4,
        };
        let page = Page::slice(vec![1, 2], params);
        assert!(page.list.is_empty());
        assert_eq!(page.total, 2);
    }

    #[test]
    fn room_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(RoomStatus::Available).expect("serialize"),
            serde_json::json!("available")
        );
        assert_eq!(RoomStatus::Rented.label(), "rented");
    }
}
