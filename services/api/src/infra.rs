use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use roomledger::domain::UserRole;
use roomledger::error::ServiceError;
use roomledger::rooms::{AddRoomParams, RoomService};
use roomledger::store::MemoryStore;
use roomledger::users::{CreateUserParams, UserService};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Fresh in-memory store with the bootstrap admin account and a small
/// set of rooms, so the service answers commands right after start.
pub(crate) fn bootstrap_store() -> Result<Arc<MemoryStore>, ServiceError> {
    let store = Arc::new(MemoryStore::new());

    let users = UserService::new(store.clone());
    users.create_user(CreateUserParams {
        username: "admin".to_string(),
        password: "admin123".to_string(),
        name: "管理员".to_string(),
        role: UserRole::Admin,
    })?;
    warn!("bootstrap admin account created with the default password; change it before exposing the service");

    let rooms = RoomService::new(store.clone());
    for (number, floor, rent) in [("101", 1, 1200.0), ("102", 1, 1200.0), ("201", 2, 1500.0)] {
        rooms.add_room(AddRoomParams {
            room_number: number.to_string(),
            floor,
            rent_price: rent,
            status: None,
            utilities: None,
        })?;
    }

    Ok(store)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
