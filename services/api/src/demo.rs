use crate::infra::bootstrap_store;
use chrono::{Datelike, Duration, Local, NaiveDate};
use clap::Args;
use roomledger::billing::{AddUtilityRecordParams, BillingService};
use roomledger::consistency::ConsistencyEngine;
use roomledger::domain::RoomStatus;
use roomledger::error::AppError;
use roomledger::rentals::{CreateRentalParams, RentalService, RenewRentalParams};
use roomledger::store::Store;
use roomledger::tenants::{AddTenantParams, TenantService};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reference date for the walkthrough (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

/// Walks through the whole lifecycle on an in-memory store: rental
/// creation, a utility bill, a renewal, and a consistency audit/repair
/// after injected drift.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let store = bootstrap_store()?;

    let tenants = TenantService::new(store.clone());
    let rentals = RentalService::new(store.clone());
    let billing = BillingService::new(store.clone());
    let consistency = ConsistencyEngine::new(store.clone());

    println!("== 租赁全流程演示 ({today}) ==");

    let tenant = tenants.add_tenant(AddTenantParams {
        name: "张三".to_string(),
        id_card: "410102199001011234".to_string(),
        phone: "13800000000".to_string(),
        status: None,
    })?;
    println!("租户已登记: {} ({})", tenant.name, tenant.id);

    let room = store
        .room_by_number("101")?
        .ok_or_else(|| roomledger::error::ServiceError::not_found("房间不存在"))?;
    let created = rentals.create_rental(CreateRentalParams {
        room_id: room.id.clone(),
        tenant_id: tenant.id.clone(),
        rent_price: 1200.0,
        deposit: 1200.0,
        rent_start_date: today,
        rent_end_date: today + Duration::days(365),
        utilities_included: false,
        electricity_start_reading: 100.0,
        water_start_reading: 50.0,
        contract_notes: String::new(),
    })?;
    println!("租赁已创建: {} -> 房间101转为已租", created.rental_id);

    let bill = billing.add_monthly_record(AddUtilityRecordParams {
        rental_id: created.rental_id.clone(),
        billing_year: today.year(),
        billing_month: today.month(),
        electricity_reading: 150.0,
        water_reading: 60.0,
        record_date: Some(today),
        notes: None,
    })?;
    println!(
        "水电费账单 {} 已生成, 合计 {:.2} 元",
        bill.record_id, bill.total_fee
    );

    let renewed = rentals.renew_rental(RenewRentalParams {
        rental_id: created.rental_id,
        new_rent_end_date: today + Duration::days(730),
        new_rent_price: Some(1300.0),
        electricity_reading: 150.0,
        water_reading: 60.0,
        contract_notes: None,
    })?;
    println!(
        "续租完成: 新租赁 {} (原 {})",
        renewed.new_rental_id, renewed.previous_rental_id
    );

    // Fabricate drift so the audit has something to find: room 102 is
    // marked rented without a rental behind it.
    if let Some(mut drifting) = store.room_by_number("102")? {
        drifting.status = RoomStatus::Rented;
        drifting.current_rental_id = None;
        store.update_room(&drifting)?;
        println!("人为制造漂移: 房间102标记为已租但无租赁记录");
    }

    let audit = consistency.audit()?;
    println!("审计发现 {} 处不一致:", audit.inconsistencies.len());
    for issue in &audit.inconsistencies {
        println!("  - 房间{}: {}", issue.room_number, issue.issue);
    }

    let repair = consistency.fix_inconsistencies()?;
    println!("修复完成, 共 {} 项:", repair.fixes_applied);
    for fix in &repair.fixes {
        println!("  - {}", fix.action);
    }

    let verify = consistency.fix_inconsistencies()?;
    println!("再次修复: {} 项 (应为0)", verify.fixes_applied);

    Ok(())
}
