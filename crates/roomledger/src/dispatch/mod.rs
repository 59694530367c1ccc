//! Command dispatch: the typed action vocabulary and the envelope every
//! handler answers with.
//!
//! Requests arrive as `{action, data}` and are decoded into one of the
//! command enums below, so an unknown action or a malformed payload is
//! rejected before any handler runs. Responses always carry `code` 0 or
//! -1; transport-level status stays 200.

use std::sync::Arc;

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::billing::{
    AddUtilityRecordParams, BillingService, MonthlyBillQuery, UpdatePaymentParams,
    UtilityRecordQuery,
};
use crate::consistency::ConsistencyEngine;
use crate::error::ServiceError;
use crate::maintenance::{
    AddMaintenanceParams, ExpiringWarrantyQuery, MaintenanceCostQuery, MaintenanceIdParams,
    MaintenanceQuery, MaintenanceService, RoomStatsParams, UpdateMaintenanceParams,
};
use crate::rentals::{
    CreateRentalParams, ExpiringQuery, RenewRentalParams, RentalIdParams, RentalQuery,
    RentalService, RoomRentalsParams, TerminateRentalParams,
};
use crate::rooms::{AddRoomParams, RoomIdParams, RoomQuery, RoomService, UpdateRoomParams};
use crate::stats::{IncomeStatsParams, StatsService};
use crate::store::Store;
use crate::tenants::{
    AddTenantParams, TenantIdParams, TenantQuery, TenantService, UpdateTenantParams,
};
use crate::users::{
    ChangePasswordParams, CreateUserParams, LoginParams, UpdateUserParams, UserIdParams,
    UserQuery, UserService, VerifyTokenParams,
};

mod router;

pub use router::handler_router;

/// Placeholder payload for actions that take no parameters. Clients may
/// send `{}`, `null`, or omit `data` entirely.
#[derive(Debug, Default, Deserialize)]
pub struct EmptyParams {}

/// Every action the property endpoint understands.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum PropertyCommand {
    #[serde(rename = "getRooms")]
    GetRooms(RoomQuery),
    #[serde(rename = "getRoomById")]
    GetRoomById(RoomIdParams),
    #[serde(rename = "addRoom")]
    AddRoom(AddRoomParams),
    #[serde(rename = "updateRoom")]
    UpdateRoom(UpdateRoomParams),
    #[serde(rename = "deleteRoom")]
    DeleteRoom(RoomIdParams),

    #[serde(rename = "getTenants")]
    GetTenants(TenantQuery),
    #[serde(rename = "addTenant")]
    AddTenant(AddTenantParams),
    #[serde(rename = "updateTenant")]
    UpdateTenant(UpdateTenantParams),
    #[serde(rename = "deleteTenant")]
    DeleteTenant(TenantIdParams),

    #[serde(rename = "createRental")]
    CreateRental(CreateRentalParams),
    #[serde(rename = "getRentals")]
    GetRentals(RentalQuery),
    #[serde(rename = "getRentalsByRoom")]
    GetRentalsByRoom(RoomRentalsParams),
    #[serde(rename = "terminateRental")]
    TerminateRental(TerminateRentalParams),
    #[serde(rename = "renewRental")]
    RenewRental(RenewRentalParams),
    #[serde(rename = "getRentalInfo")]
    GetRentalInfo(RentalIdParams),
    #[serde(rename = "getExpiringRentals")]
    GetExpiringRentals(ExpiringQuery),

    #[serde(rename = "addMonthlyUtilityRecord")]
    AddMonthlyUtilityRecord(AddUtilityRecordParams),
    #[serde(rename = "getUtilityRecords")]
    GetUtilityRecords(UtilityRecordQuery),
    #[serde(rename = "updateUtilityPayment")]
    UpdateUtilityPayment(UpdatePaymentParams),
    #[serde(rename = "getMonthlyBills")]
    GetMonthlyBills(MonthlyBillQuery),
    #[serde(rename = "checkOverduePayments")]
    CheckOverduePayments(Option<EmptyParams>),

    #[serde(rename = "addMaintenanceRecord")]
    AddMaintenanceRecord(AddMaintenanceParams),
    #[serde(rename = "getMaintenanceRecords")]
    GetMaintenanceRecords(MaintenanceQuery),
    #[serde(rename = "updateMaintenanceRecord")]
    UpdateMaintenanceRecord(UpdateMaintenanceParams),
    #[serde(rename = "deleteMaintenanceRecord")]
    DeleteMaintenanceRecord(MaintenanceIdParams),
    #[serde(rename = "getRoomMaintenanceStats")]
    GetRoomMaintenanceStats(RoomStatsParams),
    #[serde(rename = "getExpiringWarranties")]
    GetExpiringWarranties(ExpiringWarrantyQuery),
    #[serde(rename = "getMaintenanceCostStats")]
    GetMaintenanceCostStats(MaintenanceCostQuery),

    #[serde(rename = "getIncomeStatistics")]
    GetIncomeStatistics(IncomeStatsParams),
    #[serde(rename = "getRoomOccupancyStatistics")]
    GetRoomOccupancyStatistics(Option<EmptyParams>),
    #[serde(rename = "getIncomeTrend")]
    GetIncomeTrend(Option<EmptyParams>),
    #[serde(rename = "getDashboardStatistics")]
    GetDashboardStatistics(Option<EmptyParams>),

    #[serde(rename = "debugDatabase")]
    DebugDatabase(Option<EmptyParams>),
    #[serde(rename = "fixDataInconsistencies")]
    FixDataInconsistencies(Option<EmptyParams>),
}

/// Actions on the user endpoint.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum UserCommand {
    #[serde(rename = "login")]
    Login(LoginParams),
    #[serde(rename = "verifyToken")]
    VerifyToken(VerifyTokenParams),
    #[serde(rename = "changePassword")]
    ChangePassword(ChangePasswordParams),
    #[serde(rename = "getUserInfo")]
    GetUserInfo(UserIdParams),
    #[serde(rename = "createUser")]
    CreateUser(CreateUserParams),
    #[serde(rename = "updateUser")]
    UpdateUser(UpdateUserParams),
    #[serde(rename = "deleteUser")]
    DeleteUser(UserIdParams),
    #[serde(rename = "getUsers")]
    GetUsers(UserQuery),
}

/// Uniform handler envelope. `code` is 0 on success and -1 on any
/// rejection; failures never change the transport status.
#[derive(Debug, Serialize)]
pub struct Response {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    pub fn ok<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                code: 0,
                data: Some(value),
                message: None,
            },
            Err(err) => Self::fail(err.to_string()),
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            code: 0,
            data: None,
            message: None,
        }
    }

    pub fn ok_message(message: impl Into<String>) -> Self {
        Self {
            code: 0,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn ok_with_message<T: Serialize>(data: T, message: impl Into<String>) -> Self {
        let mut response = Self::ok(data);
        if response.code == 0 {
            response.message = Some(message.into());
        }
        response
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            code: -1,
            data: None,
            message: Some(message.into()),
        }
    }
}

fn respond<T: Serialize>(result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(data) => Response::ok(data),
        Err(err) => Response::fail(err.to_string()),
    }
}

fn respond_message(result: Result<(), ServiceError>, message: &str) -> Response {
    match result {
        Ok(()) => Response::ok_message(message),
        Err(err) => Response::fail(err.to_string()),
    }
}

/// All services behind the two endpoints, sharing one store.
pub struct Handlers<S> {
    rooms: RoomService<S>,
    tenants: TenantService<S>,
    rentals: RentalService<S>,
    billing: BillingService<S>,
    maintenance: MaintenanceService<S>,
    stats: StatsService<S>,
    users: UserService<S>,
    consistency: ConsistencyEngine<S>,
}

impl<S: Store> Handlers<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            rooms: RoomService::new(store.clone()),
            tenants: TenantService::new(store.clone()),
            rentals: RentalService::new(store.clone()),
            billing: BillingService::new(store.clone()),
            maintenance: MaintenanceService::new(store.clone()),
            stats: StatsService::new(store.clone()),
            users: UserService::new(store.clone()),
            consistency: ConsistencyEngine::new(store),
        }
    }

    pub fn dispatch_property(&self, command: PropertyCommand) -> Response {
        let today = Local::now().date_naive();
        match command {
            PropertyCommand::GetRooms(query) => respond(self.rooms.get_rooms(query)),
            PropertyCommand::GetRoomById(params) => respond(self.rooms.get_room_by_id(&params.id)),
            PropertyCommand::AddRoom(params) => respond(self.rooms.add_room(params)),
            PropertyCommand::UpdateRoom(params) => respond(self.rooms.update_room(params)),
            PropertyCommand::DeleteRoom(params) => match self.rooms.delete_room(&params.id) {
                Ok(()) => Response::ok_empty(),
                Err(err) => Response::fail(err.to_string()),
            },

            PropertyCommand::GetTenants(query) => respond(self.tenants.get_tenants(query)),
            PropertyCommand::AddTenant(params) => respond(self.tenants.add_tenant(params)),
            PropertyCommand::UpdateTenant(params) => respond(self.tenants.update_tenant(params)),
            PropertyCommand::DeleteTenant(params) => match self.tenants.delete_tenant(&params.id) {
                Ok(()) => Response::ok_empty(),
                Err(err) => Response::fail(err.to_string()),
            },

            PropertyCommand::CreateRental(params) => respond(self.rentals.create_rental(params)),
            PropertyCommand::GetRentals(query) => respond(self.rentals.get_rentals(query)),
            PropertyCommand::GetRentalsByRoom(params) => {
                respond(self.rentals.get_rentals_by_room(&params.room_id))
            }
            PropertyCommand::TerminateRental(params) => respond_message(
                self.rentals.terminate_rental(params),
                "租赁关系已终止",
            ),
            PropertyCommand::RenewRental(params) => match self.rentals.renew_rental(params) {
                Ok(renewed) => Response::ok_with_message(renewed, "续租成功"),
                Err(err) => Response::fail(err.to_string()),
            },
            PropertyCommand::GetRentalInfo(params) => {
                respond(self.rentals.get_rental_info(&params.rental_id))
            }
            PropertyCommand::GetExpiringRentals(query) => {
                respond(self.rentals.get_expiring_rentals(query, today))
            }

            PropertyCommand::AddMonthlyUtilityRecord(params) => {
                respond(self.billing.add_monthly_record(params))
            }
            PropertyCommand::GetUtilityRecords(query) => {
                respond(self.billing.get_utility_records(query))
            }
            PropertyCommand::UpdateUtilityPayment(params) => match self.billing.update_payment(params)
            {
                Ok(()) => Response::ok_empty(),
                Err(err) => Response::fail(err.to_string()),
            },
            PropertyCommand::GetMonthlyBills(query) => {
                respond(self.billing.get_monthly_bills(query, today))
            }
            PropertyCommand::CheckOverduePayments(_) => {
                match self.billing.check_overdue_payments(today) {
                    Ok(count) => Response::ok_message(format!("更新了{count}條逾期记录")),
                    Err(err) => Response::fail(err.to_string()),
                }
            }

            PropertyCommand::AddMaintenanceRecord(params) => {
                respond(self.maintenance.add_record(params))
            }
            PropertyCommand::GetMaintenanceRecords(query) => {
                respond(self.maintenance.get_records(query))
            }
            PropertyCommand::UpdateMaintenanceRecord(params) => {
                respond(self.maintenance.update_record(params))
            }
            PropertyCommand::DeleteMaintenanceRecord(params) => {
                match self.maintenance.delete_record(&params.id) {
                    Ok(()) => Response::ok_empty(),
                    Err(err) => Response::fail(err.to_string()),
                }
            }
            PropertyCommand::GetRoomMaintenanceStats(params) => {
                respond(self.maintenance.get_room_stats(&params.room_id, params.year))
            }
            PropertyCommand::GetExpiringWarranties(query) => {
                respond(self.maintenance.get_expiring_warranties(query, today))
            }
            PropertyCommand::GetMaintenanceCostStats(query) => {
                respond(self.maintenance.get_cost_stats(query))
            }

            PropertyCommand::GetIncomeStatistics(params) => {
                respond(self.stats.income_statistics(params, today))
            }
            PropertyCommand::GetRoomOccupancyStatistics(_) => respond(self.stats.occupancy(today)),
            PropertyCommand::GetIncomeTrend(_) => respond(self.stats.income_trend(today)),
            PropertyCommand::GetDashboardStatistics(_) => respond(self.stats.dashboard(today)),

            PropertyCommand::DebugDatabase(_) => respond(self.consistency.audit()),
            PropertyCommand::FixDataInconsistencies(_) => {
                respond(self.consistency.fix_inconsistencies())
            }
        }
    }

    pub fn dispatch_user(&self, command: UserCommand) -> Response {
        match command {
            UserCommand::Login(params) => match self.users.login(params) {
                Ok(result) => Response::ok_with_message(result, "登录成功"),
                Err(err) => Response::fail(err.to_string()),
            },
            UserCommand::VerifyToken(params) => {
                match self.users.verify_token(params, chrono::Utc::now()) {
                    Ok(verified) => Response::ok_with_message(verified, "Token验证成功"),
                    Err(err) => Response::fail(err.to_string()),
                }
            }
            UserCommand::ChangePassword(params) => {
                respond_message(self.users.change_password(params), "密码修改成功")
            }
            UserCommand::GetUserInfo(params) => respond(self.users.get_user_info(&params.user_id)),
            UserCommand::CreateUser(params) => match self.users.create_user(params) {
                Ok(created) => Response::ok_with_message(created, "用户创建成功"),
                Err(err) => Response::fail(err.to_string()),
            },
            UserCommand::UpdateUser(params) => {
                respond_message(self.users.update_user(params), "用户信息更新成功")
            }
            UserCommand::DeleteUser(params) => respond_message(
                self.users.delete_user(&params.user_id),
                "用户删除成功",
            ),
            UserCommand::GetUsers(query) => respond(self.users.get_users(query)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_decode_camel_case_actions() {
        let command: PropertyCommand = serde_json::from_value(json!({
            "action": "getRooms",
            "data": {"pageSize": 5, "pageNum": 2}
        }))
        .expect("decode");
        match command {
            PropertyCommand::GetRooms(query) => {
                assert_eq!(query.page.page_size, 5);
                assert_eq!(query.page.page_num, 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn data_less_actions_accept_empty_or_missing_payloads() {
        for payload in [
            json!({"action": "debugDatabase"}),
            json!({"action": "debugDatabase", "data": {}}),
            json!({"action": "debugDatabase", "data": null}),
        ] {
            let command: PropertyCommand =
                serde_json::from_value(payload).expect("decode data-less action");
            assert!(matches!(command, PropertyCommand::DebugDatabase(_)));
        }
    }

    #[test]
    fn unknown_action_fails_to_decode() {
        let result: Result<PropertyCommand, _> = serde_json::from_value(json!({
            "action": "selfDestruct",
            "data": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn failure_envelope_keeps_code_minus_one() {
        let response = Response::fail("出错了");
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["code"], -1);
        assert_eq!(value["message"], "出错了");
        assert!(value.get("data").is_none());
    }
}
