//! Monthly utility billing.
//!
//! Usage is the delta between the current reading and the previous one
//! (prior month's record, or the rental's start readings when the period
//! is the first), clamped at zero so a meter reset never produces a
//! negative invoice. Rates come from the room document.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Page, PageParams, PaymentStatus, Rental, RentalId, RentalStatus, Room, RoomId, Tenant,
    TenantId, UtilityRecord, UtilityRecordId,
};
use crate::error::ServiceError;
use crate::store::Store;

static UTILITY_RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_record_id() -> UtilityRecordId {
    let id = UTILITY_RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    UtilityRecordId(format!("bill-{id:06}"))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Deserialize)]
pub struct AddUtilityRecordParams {
    pub rental_id: RentalId,
    pub billing_year: i32,
    pub billing_month: u32,
    #[serde(default)]
    pub electricity_reading: f64,
    #[serde(default)]
    pub water_reading: f64,
    pub record_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedUtilityRecord {
    pub record_id: UtilityRecordId,
    pub total_fee: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UtilityRecordQuery {
    pub rental_id: Option<RentalId>,
    pub room_id: Option<RoomId>,
    pub tenant_id: Option<TenantId>,
    pub billing_year: Option<i32>,
    pub payment_status: Option<PaymentStatus>,
    #[serde(flatten)]
    pub page: PageParams,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentParams {
    pub record_id: UtilityRecordId,
    pub payment_status: PaymentStatus,
    pub payment_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthlyBillQuery {
    pub rental_id: Option<RentalId>,
    pub billing_year: Option<i32>,
    pub billing_month: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UtilityRecordView {
    #[serde(flatten)]
    pub record: UtilityRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_info: Option<Room>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_info: Option<Tenant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rental_info: Option<Rental>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct MonthlyBillSummary {
    pub total_records: usize,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub unpaid_amount: f64,
    pub overdue_amount: f64,
    pub paid_count: usize,
    pub unpaid_count: usize,
    pub overdue_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyBills {
    pub summary: MonthlyBillSummary,
    pub records: Vec<UtilityRecord>,
}

pub struct BillingService<S> {
    store: Arc<S>,
}

impl<S: Store> BillingService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn add_monthly_record(
        &self,
        params: AddUtilityRecordParams,
    ) -> Result<CreatedUtilityRecord, ServiceError> {
        if !(1..=12).contains(&params.billing_month) {
            return Err(ServiceError::validation("无效的账单月份"));
        }

        let rental = self
            .store
            .rental(&params.rental_id)?
            .ok_or_else(|| ServiceError::not_found("租赁关系不存在"))?;
        if rental.status != RentalStatus::Active {
            return Err(ServiceError::validation("租赁关系已终止"));
        }

        if self
            .store
            .utility_record_for_period(&params.rental_id, params.billing_year, params.billing_month)?
            .is_some()
        {
            return Err(ServiceError::validation(format!(
                "{}年{}月的水电费记录已存在",
                params.billing_year, params.billing_month
            )));
        }

        let room = self
            .store
            .room(&rental.room_id)?
            .ok_or_else(|| ServiceError::not_found("房间不存在"))?;

        // Previous readings: the prior month's record wins, the rental's
        // start readings are the fallback for the first period.
        let (prev_year, prev_month) = if params.billing_month == 1 {
            (params.billing_year - 1, 12)
        } else {
            (params.billing_year, params.billing_month - 1)
        };
        let (previous_electricity, previous_water) = match self
            .store
            .utility_record_for_period(&params.rental_id, prev_year, prev_month)?
        {
            Some(previous) => (previous.electricity_reading, previous.water_reading),
            None => (
                rental.electricity_start_reading,
                rental.water_start_reading,
            ),
        };

        let electricity_usage = (params.electricity_reading - previous_electricity).max(0.0);
        let water_usage = (params.water_reading - previous_water).max(0.0);
        let electricity_fee = round2(electricity_usage * room.utilities.electricity_rate);
        let water_fee = round2(water_usage * room.utilities.water_rate);
        let total_fee = round2(electricity_fee + water_fee);

        // Payment is due on the 5th of the following billing month.
        let (due_year, due_month) = if params.billing_month == 12 {
            (params.billing_year + 1, 1)
        } else {
            (params.billing_year, params.billing_month + 1)
        };
        let due_date = NaiveDate::from_ymd_opt(due_year, due_month, 5)
            .ok_or_else(|| ServiceError::validation("无效的账单周期"))?;

        let now = Utc::now();
        let record = UtilityRecord {
            id: next_record_id(),
            rental_id: rental.id.clone(),
            room_id: rental.room_id.clone(),
            tenant_id: rental.tenant_id.clone(),
            billing_year: params.billing_year,
            billing_month: params.billing_month,
            record_date: params.record_date.unwrap_or_else(|| now.date_naive()),
            electricity_reading: params.electricity_reading,
            water_reading: params.water_reading,
            previous_electricity_reading: previous_electricity,
            previous_water_reading: previous_water,
            electricity_usage,
            water_usage,
            electricity_fee,
            water_fee,
            total_fee,
            payment_status: PaymentStatus::Unpaid,
            payment_date: None,
            due_date,
            notes: params.notes.unwrap_or_default(),
            create_date: now,
        };
        let record = self.store.insert_utility_record(record)?;

        // Advance the room's meters so the next ad-hoc reading starts
        // from here.
        let mut room = room;
        room.utilities.electricity_reading = params.electricity_reading;
        room.utilities.water_reading = params.water_reading;
        room.update_date = now;
        self.store.update_room(&room)?;

        Ok(CreatedUtilityRecord {
            record_id: record.id,
            total_fee,
        })
    }

    pub fn get_utility_records(
        &self,
        query: UtilityRecordQuery,
    ) -> Result<Page<UtilityRecordView>, ServiceError> {
        let mut records = self.store.utility_records()?;
        if let Some(rental_id) = &query.rental_id {
            records.retain(|record| &record.rental_id == rental_id);
        }
        if let Some(room_id) = &query.room_id {
            records.retain(|record| &record.room_id == room_id);
        }
        if let Some(tenant_id) = &query.tenant_id {
            records.retain(|record| &record.tenant_id == tenant_id);
        }
        if let Some(billing_year) = query.billing_year {
            records.retain(|record| record.billing_year == billing_year);
        }
        if let Some(payment_status) = query.payment_status {
            records.retain(|record| record.payment_status == payment_status);
        }
        records.sort_by(|a, b| {
            (b.billing_year, b.billing_month).cmp(&(a.billing_year, a.billing_month))
        });

        let total = records.len();
        let list = records
            .into_iter()
            .skip(query.page.offset())
            .take(query.page.page_size)
            .map(|record| self.with_details(record))
            .collect::<Result<Vec<UtilityRecordView>, ServiceError>>()?;

        Ok(Page {
            list,
            total,
            page_num: query.page.page_num,
            page_size: query.page.page_size,
        })
    }

    pub fn update_payment(&self, params: UpdatePaymentParams) -> Result<(), ServiceError> {
        let mut record = self
            .store
            .utility_record(&params.record_id)?
            .ok_or_else(|| ServiceError::not_found("水电费记录不存在"))?;

        record.payment_status = params.payment_status;
        if params.payment_status == PaymentStatus::Paid {
            record.payment_date = Some(
                params
                    .payment_date
                    .unwrap_or_else(|| Utc::now().date_naive()),
            );
        }
        self.store.update_utility_record(&record)?;
        Ok(())
    }

    pub fn get_monthly_bills(
        &self,
        query: MonthlyBillQuery,
        today: NaiveDate,
    ) -> Result<MonthlyBills, ServiceError> {
        let mut records = self.store.utility_records()?;
        if let Some(rental_id) = &query.rental_id {
            records.retain(|record| &record.rental_id == rental_id);
        }
        if let Some(billing_year) = query.billing_year {
            records.retain(|record| record.billing_year == billing_year);
        }
        if let Some(billing_month) = query.billing_month {
            records.retain(|record| record.billing_month == billing_month);
        }

        let mut summary = MonthlyBillSummary {
            total_records: records.len(),
            ..Default::default()
        };
        for record in &records {
            summary.total_amount += record.total_fee;
            match record.payment_status {
                PaymentStatus::Paid => {
                    summary.paid_amount += record.total_fee;
                    summary.paid_count += 1;
                }
                // Unpaid records past their due date count as overdue
                // even before the sweep has flipped them.
                PaymentStatus::Overdue => {
                    summary.overdue_amount += record.total_fee;
                    summary.overdue_count += 1;
                }
                PaymentStatus::Unpaid if record.due_date < today => {
                    summary.overdue_amount += record.total_fee;
                    summary.overdue_count += 1;
                }
                PaymentStatus::Unpaid => {
                    summary.unpaid_amount += record.total_fee;
                    summary.unpaid_count += 1;
                }
            }
        }
        summary.total_amount = round2(summary.total_amount);
        summary.paid_amount = round2(summary.paid_amount);
        summary.unpaid_amount = round2(summary.unpaid_amount);
        summary.overdue_amount = round2(summary.overdue_amount);

        Ok(MonthlyBills { summary, records })
    }

    /// Sweep flipping unpaid records past their due date to overdue.
    /// Returns the number of records updated.
    pub fn check_overdue_payments(&self, today: NaiveDate) -> Result<usize, ServiceError> {
        let mut flipped = 0;
        for mut record in self.store.utility_records()? {
            if record.payment_status == PaymentStatus::Unpaid && record.due_date < today {
                record.payment_status = PaymentStatus::Overdue;
                self.store.update_utility_record(&record)?;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    fn with_details(&self, record: UtilityRecord) -> Result<UtilityRecordView, ServiceError> {
        let room_info = self.store.room(&record.room_id)?;
        let tenant_info = self.store.tenant(&record.tenant_id)?;
        let rental_info = self.store.rental(&record.rental_id)?;
        Ok(UtilityRecordView {
            record,
            room_info,
            tenant_info,
            rental_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rentals::{CreateRentalParams, RentalService};
    use crate::rooms::{AddRoomParams, RoomService};
    use crate::store::MemoryStore;
    use crate::tenants::{AddTenantParams, TenantService};

    struct Fixture {
        store: Arc<MemoryStore>,
        billing: BillingService<MemoryStore>,
        rental_id: RentalId,
        room_id: RoomId,
    }

    /// Room with default rates (0.5 / 3.0) and an active rental whose
    /// start readings are 100 / 100.
    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let rooms = RoomService::new(store.clone());
        let tenants = TenantService::new(store.clone());
        let rentals = RentalService::new(store.clone());

        let room = rooms
            .add_room(AddRoomParams {
                room_number: "101".to_string(),
                floor: 1,
                rent_price: 1200.0,
                status: None,
                utilities: None,
            })
            .expect("add room");
        let tenant = tenants
            .add_tenant(AddTenantParams {
                name: "张三".to_string(),
                id_card: format!("id-{}", room.id),
                phone: String::new(),
                status: None,
            })
            .expect("add tenant");
        let created = rentals
            .create_rental(CreateRentalParams {
                room_id: room.id.clone(),
                tenant_id: tenant.id,
                rent_price: 1200.0,
                deposit: 1200.0,
                rent_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid"),
                rent_end_date: NaiveDate::from_ymd_opt(2024, 12, 31).expect("valid"),
                utilities_included: false,
                electricity_start_reading: 100.0,
                water_start_reading: 100.0,
                contract_notes: String::new(),
            })
            .expect("create rental");

        Fixture {
            billing: BillingService::new(store.clone()),
            store,
            rental_id: created.rental_id,
            room_id: room.id,
        }
    }

    fn record_for(fixture: &Fixture, month: u32, electricity: f64, water: f64) -> UtilityRecord {
        let created = fixture
            .billing
            .add_monthly_record(AddUtilityRecordParams {
                rental_id: fixture.rental_id.clone(),
                billing_year: 2024,
                billing_month: month,
                electricity_reading: electricity,
                water_reading: water,
                record_date: None,
                notes: None,
            })
            .expect("add record");
        fixture
            .store
            .utility_record(&created.record_id)
            .expect("get")
            .expect("record")
    }

    #[test]
    fn first_period_bills_against_rental_start_readings() {
        let fixture = fixture();
        let record = record_for(&fixture, 2, 150.0, 110.0);

        assert_eq!(record.previous_electricity_reading, 100.0);
        assert_eq!(record.electricity_usage, 50.0);
        assert_eq!(record.electricity_fee, 25.0);
        assert_eq!(record.water_usage, 10.0);
        assert_eq!(record.water_fee, 30.0);
        assert_eq!(record.total_fee, 55.0);
        assert_eq!(record.payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn second_period_bills_against_prior_record() {
        let fixture = fixture();
        record_for(&fixture, 2, 150.0, 110.0);
        let record = record_for(&fixture, 3, 180.0, 115.0);

        assert_eq!(record.previous_electricity_reading, 150.0);
        assert_eq!(record.electricity_usage, 30.0);
        assert_eq!(record.water_usage, 5.0);
    }

    #[test]
    fn meter_reset_clamps_usage_to_zero() {
        let fixture = fixture();
        let record = record_for(&fixture, 2, 40.0, 20.0);

        assert_eq!(record.electricity_usage, 0.0);
        assert_eq!(record.water_usage, 0.0);
        assert_eq!(record.total_fee, 0.0);
    }

    #[test]
    fn duplicate_period_is_rejected() {
        let fixture = fixture();
        record_for(&fixture, 2, 150.0, 110.0);

        let err = fixture
            .billing
            .add_monthly_record(AddUtilityRecordParams {
                rental_id: fixture.rental_id.clone(),
                billing_year: 2024,
                billing_month: 2,
                electricity_reading: 160.0,
                water_reading: 120.0,
                record_date: None,
                notes: None,
            })
            .expect_err("duplicate period");
        assert!(err.to_string().contains("已存在"));
    }

    #[test]
    fn due_date_is_fifth_of_following_month() {
        let fixture = fixture();
        let record = record_for(&fixture, 12, 150.0, 110.0);
        assert_eq!(
            record.due_date,
            NaiveDate::from_ymd_opt(2025, 1, 5).expect("valid")
        );
    }

    #[test]
    fn billing_advances_room_meters() {
        let fixture = fixture();
        record_for(&fixture, 2, 150.0, 110.0);

        let room = fixture
            .store
            .room(&fixture.room_id)
            .expect("get")
            .expect("room");
        assert_eq!(room.utilities.electricity_reading, 150.0);
        assert_eq!(room.utilities.water_reading, 110.0);
    }

    #[test]
    fn overdue_sweep_flips_only_past_due_unpaid_records() {
        let fixture = fixture();
        let record = record_for(&fixture, 2, 150.0, 110.0);

        // Due 2024-03-05; not yet due on the 4th.
        let untouched = fixture
            .billing
            .check_overdue_payments(NaiveDate::from_ymd_opt(2024, 3, 4).expect("valid"))
            .expect("sweep");
        assert_eq!(untouched, 0);

        let flipped = fixture
            .billing
            .check_overdue_payments(NaiveDate::from_ymd_opt(2024, 3, 6).expect("valid"))
            .expect("sweep");
        assert_eq!(flipped, 1);

        let stored = fixture
            .store
            .utility_record(&record.id)
            .expect("get")
            .expect("record");
        assert_eq!(stored.payment_status, PaymentStatus::Overdue);

        // Second sweep finds nothing left to flip.
        let again = fixture
            .billing
            .check_overdue_payments(NaiveDate::from_ymd_opt(2024, 3, 7).expect("valid"))
            .expect("sweep");
        assert_eq!(again, 0);
    }

    #[test]
    fn terminated_rental_cannot_be_billed() {
        let fixture = fixture();
        let rentals = RentalService::new(fixture.store.clone());
        rentals
            .terminate_rental(crate::rentals::TerminateRentalParams {
                rental_id: fixture.rental_id.clone(),
                termination_reason: None,
            })
            .expect("terminate");

        let err = fixture
            .billing
            .add_monthly_record(AddUtilityRecordParams {
                rental_id: fixture.rental_id.clone(),
                billing_year: 2024,
                billing_month: 2,
                electricity_reading: 150.0,
                water_reading: 110.0,
                record_date: None,
                notes: None,
            })
            .expect_err("terminated rental");
        assert!(err.to_string().contains("租赁关系已终止"));
    }
}
