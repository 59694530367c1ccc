use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use roomledger::dispatch::{handler_router, Handlers};
use roomledger::store::MemoryStore;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let store = Arc::new(MemoryStore::new());
    handler_router(Arc::new(Handlers::new(store)))
}

async fn post(app: &Router, path: &str, payload: Value) -> Value {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds");

    let response = app.clone().oneshot(request).await.expect("request served");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    serde_json::from_slice(&bytes).expect("body is json")
}

async fn room_command(app: &Router, action: &str, data: Value) -> Value {
    post(
        app,
        "/api/v1/room-management",
        json!({"action": action, "data": data}),
    )
    .await
}

async fn user_command(app: &Router, action: &str, data: Value) -> Value {
    post(
        app,
        "/api/v1/user-management",
        json!({"action": action, "data": data}),
    )
    .await
}

#[tokio::test]
async fn get_rooms_returns_the_paged_envelope() {
    let app = app();
    let added = room_command(
        &app,
        "addRoom",
        json!({"room_number": "101", "floor": 1, "rent_price": 1200.0}),
    )
    .await;
    assert_eq!(added["code"], 0);

    let body = room_command(&app, "getRooms", json!({})).await;
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["list"][0]["room_number"], "101");
    assert_eq!(body["data"]["list"][0]["status"], "available");
}

#[tokio::test]
async fn unknown_action_yields_minus_one_without_http_error() {
    let app = app();
    let body = room_command(&app, "selfDestruct", json!({})).await;
    assert_eq!(body["code"], -1);
    assert!(body["message"]
        .as_str()
        .expect("message present")
        .contains("未知操作"));
}

#[tokio::test]
async fn rental_lifecycle_over_http() {
    let app = app();
    let room = room_command(
        &app,
        "addRoom",
        json!({"room_number": "R101", "floor": 1, "rent_price": 1200.0}),
    )
    .await;
    let room_id = room["data"]["id"].as_str().expect("room id").to_string();

    let tenant = room_command(
        &app,
        "addTenant",
        json!({"name": "张三", "id_card": "A-001"}),
    )
    .await;
    let tenant_id = tenant["data"]["id"].as_str().expect("tenant id").to_string();

    let created = room_command(
        &app,
        "createRental",
        json!({
            "room_id": room_id,
            "tenant_id": tenant_id,
            "rent_price": 1200.0,
            "deposit": 1200.0,
            "rent_start_date": "2024-01-01",
            "rent_end_date": "2024-12-31"
        }),
    )
    .await;
    assert_eq!(created["code"], 0);
    let rental_id = created["data"]["rental_id"]
        .as_str()
        .expect("rental id")
        .to_string();

    // Same tenant, second lease: rejected with the duplicate-tenant
    // message.
    let second_room = room_command(
        &app,
        "addRoom",
        json!({"room_number": "R102", "floor": 1, "rent_price": 900.0}),
    )
    .await;
    let rejected = room_command(
        &app,
        "createRental",
        json!({
            "room_id": second_room["data"]["id"],
            "tenant_id": tenant["data"]["id"],
            "rent_price": 900.0,
            "rent_start_date": "2024-02-01",
            "rent_end_date": "2024-12-31"
        }),
    )
    .await;
    assert_eq!(rejected["code"], -1);
    assert!(rejected["message"]
        .as_str()
        .expect("message present")
        .contains("该租户已有活跃租赁关系"));

    let terminated = room_command(
        &app,
        "terminateRental",
        json!({"rental_id": rental_id}),
    )
    .await;
    assert_eq!(terminated["code"], 0);
    assert_eq!(terminated["message"], "租赁关系已终止");

    let rooms = room_command(&app, "getRooms", json!({"searchKeyword": "R101"})).await;
    assert_eq!(rooms["data"]["list"][0]["status"], "available");
}

#[tokio::test]
async fn audit_and_repair_commands_round_trip() {
    let app = app();
    room_command(
        &app,
        "addRoom",
        json!({"room_number": "101", "floor": 1, "rent_price": 1000.0, "status": "rented"}),
    )
    .await;

    let audit = room_command(&app, "debugDatabase", json!({})).await;
    assert_eq!(audit["code"], 0);
    assert_eq!(audit["data"]["inconsistencies"][0]["type"], "missing_rental_id");

    let repair = room_command(&app, "fixDataInconsistencies", json!({})).await;
    assert_eq!(repair["code"], 0);
    assert_eq!(repair["data"]["fixes_applied"], 1);

    let again = room_command(&app, "fixDataInconsistencies", json!({})).await;
    assert_eq!(again["data"]["fixes_applied"], 0);
}

#[tokio::test]
async fn login_flow_over_http() {
    let app = app();
    let created = user_command(
        &app,
        "createUser",
        json!({"username": "admin", "password": "secret123", "name": "管理员", "role": "admin"}),
    )
    .await;
    assert_eq!(created["code"], 0);
    assert_eq!(created["message"], "用户创建成功");

    let denied = user_command(
        &app,
        "login",
        json!({"username": "admin", "password": "wrong"}),
    )
    .await;
    assert_eq!(denied["code"], -1);
    assert_eq!(denied["message"], "密码错误");

    let login = user_command(
        &app,
        "login",
        json!({"username": "admin", "password": "secret123"}),
    )
    .await;
    assert_eq!(login["code"], 0);
    assert_eq!(login["message"], "登录成功");
    let token = login["data"]["token"].as_str().expect("token").to_string();
    assert!(login["data"]["userInfo"].get("password").is_none());

    let verified = user_command(&app, "verifyToken", json!({"token": token})).await;
    assert_eq!(verified["code"], 0);
    assert_eq!(verified["data"]["userInfo"]["username"], "admin");
}

#[tokio::test]
async fn billing_commands_compute_fees() {
    let app = app();
    let room = room_command(
        &app,
        "addRoom",
        json!({"room_number": "101", "floor": 1, "rent_price": 1200.0}),
    )
    .await;
    let tenant = room_command(
        &app,
        "addTenant",
        json!({"name": "张三", "id_card": "B-001"}),
    )
    .await;
    let created = room_command(
        &app,
        "createRental",
        json!({
            "room_id": room["data"]["id"],
            "tenant_id": tenant["data"]["id"],
            "rent_price": 1200.0,
            "rent_start_date": "2024-01-01",
            "rent_end_date": "2024-12-31",
            "electricity_start_reading": 100.0,
            "water_start_reading": 100.0
        }),
    )
    .await;

    let bill = room_command(
        &app,
        "addMonthlyUtilityRecord",
        json!({
            "rental_id": created["data"]["rental_id"],
            "billing_year": 2024,
            "billing_month": 2,
            "electricity_reading": 150.0,
            "water_reading": 100.0
        }),
    )
    .await;
    assert_eq!(bill["code"], 0);
    assert_eq!(bill["data"]["total_fee"], 25.0);

    let duplicate = room_command(
        &app,
        "addMonthlyUtilityRecord",
        json!({
            "rental_id": created["data"]["rental_id"],
            "billing_year": 2024,
            "billing_month": 2,
            "electricity_reading": 160.0,
            "water_reading": 100.0
        }),
    )
    .await;
    assert_eq!(duplicate["code"], -1);
    assert_eq!(duplicate["message"], "2024年2月的水电费记录已存在");
}
