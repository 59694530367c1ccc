//! Income, occupancy, and dashboard statistics.
//!
//! Rent income is pro-rated by the share of the month the rental covers.
//! Utility income counts paid records only; maintenance costs are the
//! expense side. All currency figures are rounded to two decimals.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::{RentalStatus, RoomStatus};
use crate::error::ServiceError;
use crate::store::Store;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), ServiceError> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ServiceError::validation("无效的统计周期"))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| ServiceError::validation("无效的统计周期"))?;
    Ok((start, next - Duration::days(1)))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncomeStatsKind {
    #[default]
    Monthly,
    Yearly,
}

#[derive(Debug, Default, Deserialize)]
pub struct IncomeStatsParams {
    pub year: Option<i32>,
    pub month: Option<u32>,
    #[serde(rename = "type", default)]
    pub kind: IncomeStatsKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyIncome {
    pub period: String,
    pub rent_income: f64,
    pub utility_income: f64,
    pub maintenance_expenses: f64,
    pub total_income: f64,
    pub net_income: f64,
    pub active_rentals_count: usize,
    pub utility_records_count: usize,
    pub maintenance_records_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyIncomePoint {
    pub month: u32,
    #[serde(flatten)]
    pub income: MonthlyIncome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct YearTotals {
    pub rent_income: f64,
    pub utility_income: f64,
    pub maintenance_expenses: f64,
    pub total_income: f64,
    pub net_income: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearlyIncome {
    pub period: String,
    pub monthly_data: Vec<MonthlyIncomePoint>,
    pub year_totals: YearTotals,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IncomeStatistics {
    Monthly(MonthlyIncome),
    Yearly(YearlyIncome),
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomStatusCounts {
    pub total: usize,
    pub available: usize,
    pub rented: usize,
    pub maintenance: usize,
    /// Whole-percent occupancy, rented over total.
    pub occupancy_rate: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RentalActivity {
    pub new_rentals_this_month: usize,
    pub expiring_soon: usize,
    pub overdue: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OccupancyStatistics {
    pub room_status: RoomStatusCounts,
    pub rental_activity: RentalActivity,
    pub period: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    /// `YYYY-MM`.
    pub month: String,
    pub rent_income: f64,
    pub utility_income: f64,
    pub maintenance_expenses: f64,
    pub net_income: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStatistics {
    pub current_month_income: MonthlyIncome,
    pub room_occupancy: OccupancyStatistics,
    pub income_trend: Vec<TrendPoint>,
}

pub struct StatsService<S> {
    store: Arc<S>,
}

impl<S: Store> StatsService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn income_statistics(
        &self,
        params: IncomeStatsParams,
        today: NaiveDate,
    ) -> Result<IncomeStatistics, ServiceError> {
        let year = params.year.unwrap_or_else(|| today.year());
        let month = params.month.unwrap_or_else(|| today.month());
        match params.kind {
            IncomeStatsKind::Monthly => {
                Ok(IncomeStatistics::Monthly(self.monthly_income(year, month)?))
            }
            IncomeStatsKind::Yearly => Ok(IncomeStatistics::Yearly(self.yearly_income(year)?)),
        }
    }

    pub fn monthly_income(&self, year: i32, month: u32) -> Result<MonthlyIncome, ServiceError> {
        let (start, end) = month_bounds(year, month)?;
        let days_in_month = (end - start).num_days() + 1;

        // Rent: active rentals overlapping the month, pro-rated by the
        // covered share of the month.
        let active_rentals: Vec<_> = self
            .store
            .rentals()?
            .into_iter()
            .filter(|rental| {
                rental.status == RentalStatus::Active
                    && rental.rent_start_date <= end
                    && rental.rent_end_date >= start
            })
            .collect();
        let rent_income: f64 = active_rentals
            .iter()
            .map(|rental| {
                let overlap_start = rental.rent_start_date.max(start);
                let overlap_end = rental.rent_end_date.min(end);
                let rental_days = (overlap_end - overlap_start).num_days() + 1;
                let ratio = (rental_days as f64 / days_in_month as f64).min(1.0);
                rental.rent_price * ratio
            })
            .sum();

        let paid_utility_records: Vec<_> = self
            .store
            .utility_records()?
            .into_iter()
            .filter(|record| {
                record.billing_year == year
                    && record.billing_month == month
                    && record.payment_status == crate::domain::PaymentStatus::Paid
            })
            .collect();
        let utility_income: f64 = paid_utility_records
            .iter()
            .map(|record| record.total_fee)
            .sum();

        let maintenance_records: Vec<_> = self
            .store
            .maintenance_records()?
            .into_iter()
            .filter(|record| record.maintenance_date >= start && record.maintenance_date <= end)
            .collect();
        let maintenance_expenses: f64 =
            maintenance_records.iter().map(|record| record.cost).sum();

        let total_income = rent_income + utility_income;
        Ok(MonthlyIncome {
            period: format!("{year}年{month}月"),
            rent_income: round2(rent_income),
            utility_income: round2(utility_income),
            maintenance_expenses: round2(maintenance_expenses),
            total_income: round2(total_income),
            net_income: round2(total_income - maintenance_expenses),
            active_rentals_count: active_rentals.len(),
            utility_records_count: paid_utility_records.len(),
            maintenance_records_count: maintenance_records.len(),
        })
    }

    pub fn yearly_income(&self, year: i32) -> Result<YearlyIncome, ServiceError> {
        let mut monthly_data = Vec::with_capacity(12);
        let mut totals = YearTotals::default();
        for month in 1..=12 {
            let income = self.monthly_income(year, month)?;
            totals.rent_income += income.rent_income;
            totals.utility_income += income.utility_income;
            totals.maintenance_expenses += income.maintenance_expenses;
            totals.total_income += income.total_income;
            totals.net_income += income.net_income;
            monthly_data.push(MonthlyIncomePoint { month, income });
        }
        totals.rent_income = round2(totals.rent_income);
        totals.utility_income = round2(totals.utility_income);
        totals.maintenance_expenses = round2(totals.maintenance_expenses);
        totals.total_income = round2(totals.total_income);
        totals.net_income = round2(totals.net_income);

        Ok(YearlyIncome {
            period: format!("{year}年"),
            monthly_data,
            year_totals: totals,
        })
    }

    pub fn occupancy(&self, today: NaiveDate) -> Result<OccupancyStatistics, ServiceError> {
        let rooms = self.store.rooms()?;
        let total = rooms.len();
        let mut available = 0;
        let mut rented = 0;
        let mut maintenance = 0;
        for room in &rooms {
            match room.status {
                RoomStatus::Available => available += 1,
                RoomStatus::Rented => rented += 1,
                RoomStatus::Maintenance => maintenance += 1,
            }
        }
        let occupancy_rate = if total > 0 {
            ((rented as f64 / total as f64) * 100.0).round() as u32
        } else {
            0
        };

        let (month_start, month_end) = month_bounds(today.year(), today.month())?;
        let cutoff = today + Duration::days(30);
        let rentals = self.store.rentals()?;
        let new_rentals_this_month = rentals
            .iter()
            .filter(|rental| {
                let created = rental.create_date.date_naive();
                created >= month_start && created <= month_end
            })
            .count();
        let expiring_soon = rentals
            .iter()
            .filter(|rental| {
                rental.status == RentalStatus::Active
                    && rental.rent_end_date >= today
                    && rental.rent_end_date <= cutoff
            })
            .count();
        let overdue = rentals
            .iter()
            .filter(|rental| {
                rental.status == RentalStatus::Active && rental.rent_end_date < today
            })
            .count();

        Ok(OccupancyStatistics {
            room_status: RoomStatusCounts {
                total,
                available,
                rented,
                maintenance,
                occupancy_rate,
            },
            rental_activity: RentalActivity {
                new_rentals_this_month,
                expiring_soon,
                overdue,
            },
            period: format!("{}年{}月", today.year(), today.month()),
        })
    }

    /// Month-by-month income for the six months ending at `today`'s
    /// month, oldest first.
    pub fn income_trend(&self, today: NaiveDate) -> Result<Vec<TrendPoint>, ServiceError> {
        let mut points = Vec::with_capacity(6);
        for offset in (0..6).rev() {
            let mut year = today.year();
            let mut month = today.month() as i32 - offset;
            while month < 1 {
                month += 12;
                year -= 1;
            }
            let month = month as u32;
            let income = self.monthly_income(year, month)?;
            points.push(TrendPoint {
                month: format!("{year}-{month:02}"),
                rent_income: income.rent_income,
                utility_income: income.utility_income,
                maintenance_expenses: income.maintenance_expenses,
                net_income: income.net_income,
            });
        }
        Ok(points)
    }

    pub fn dashboard(&self, today: NaiveDate) -> Result<DashboardStatistics, ServiceError> {
        Ok(DashboardStatistics {
            current_month_income: self.monthly_income(today.year(), today.month())?,
            room_occupancy: self.occupancy(today)?,
            income_trend: self.income_trend(today)?,
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

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let rooms = RoomService::new(store.clone());
        let tenants = TenantService::new(store.clone());
        let rentals = RentalService::new(store.clone());

        let room = rooms
            .add_room(AddRoomParams {
                room_number: "101".to_string(),
                floor: 1,
                rent_price: 3000.0,
                status: None,
                utilities: None,
            })
            .expect("add room");
        let tenant = tenants
            .add_tenant(AddTenantParams {
                name: "张三".to_string(),
                id_card: "stats-tenant".to_string(),
                phone: String::new(),
                status: None,
            })
            .expect("add tenant");
        rentals
            .create_rental(CreateRentalParams {
                room_id: room.id,
                tenant_id: tenant.id,
                rent_price: 3000.0,
                deposit: 3000.0,
                rent_start_date: ymd(2024, 4, 16),
                rent_end_date: ymd(2025, 4, 15),
                utilities_included: false,
                electricity_start_reading: 0.0,
                water_start_reading: 0.0,
                contract_notes: String::new(),
            })
            .expect("create rental");
        store
    }

    #[test]
    fn rent_income_is_pro_rated_by_overlap() {
        let stats = StatsService::new(seeded_store());

        // April 2024 has 30 days; the rental covers the 16th through
        // the 30th, fifteen days.
        let income = stats.monthly_income(2024, 4).expect("monthly");
        assert_eq!(income.rent_income, 1500.0);
        assert_eq!(income.active_rentals_count, 1);

        // A fully-covered month bills the whole price.
        let full = stats.monthly_income(2024, 5).expect("monthly");
        assert_eq!(full.rent_income, 3000.0);
    }

    #[test]
    fn months_without_overlap_report_zero() {
        let stats = StatsService::new(seeded_store());
        let income = stats.monthly_income(2024, 3).expect("monthly");
        assert_eq!(income.rent_income, 0.0);
        assert_eq!(income.active_rentals_count, 0);
        assert_eq!(income.total_income, 0.0);
    }

    #[test]
    fn occupancy_counts_and_rate() {
        let store = seeded_store();
        let rooms = RoomService::new(store.clone());
        rooms
            .add_room(AddRoomParams {
                room_number: "102".to_string(),
                floor: 1,
                rent_price: 2000.0,
                status: None,
                utilities: None,
            })
            .expect("add room");

        let stats = StatsService::new(store);
        let occupancy = stats.occupancy(ymd(2024, 6, 1)).expect("occupancy");
        assert_eq!(occupancy.room_status.total, 2);
        assert_eq!(occupancy.room_status.rented, 1);
        assert_eq!(occupancy.room_status.available, 1);
        assert_eq!(occupancy.room_status.occupancy_rate, 50);
        assert_eq!(occupancy.rental_activity.overdue, 0);
        assert_eq!(occupancy.period, "2024年6月");
    }

    #[test]
    fn overdue_counts_active_rentals_past_end_date() {
        let stats = StatsService::new(seeded_store());
        let occupancy = stats.occupancy(ymd(2025, 5, 1)).expect("occupancy");
        assert_eq!(occupancy.rental_activity.overdue, 1);
        assert_eq!(occupancy.rental_activity.expiring_soon, 0);
    }

    #[test]
    fn trend_spans_six_months_across_year_boundary() {
        let stats = StatsService::new(seeded_store());
        let trend = stats.income_trend(ymd(2024, 2, 15)).expect("trend");
        let months: Vec<&str> = trend.iter().map(|point| point.month.as_str()).collect();
        assert_eq!(
            months,
            vec!["2023-09", "2023-10", "2023-11", "2023-12", "2024-01", "2024-02"]
        );
    }

    #[test]
    fn yearly_totals_sum_the_months() {
        let stats = StatsService::new(seeded_store());
        let yearly = stats.yearly_income(2024).expect("yearly");
        assert_eq!(yearly.monthly_data.len(), 12);
        let summed: f64 = yearly
            .monthly_data
            .iter()
            .map(|point| point.income.rent_income)
            .sum();
        assert_eq!(yearly.year_totals.rent_income, round2(summed));
        assert_eq!(yearly.period, "2024年");
    }
}
