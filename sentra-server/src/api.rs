//! REST status and configuration surface.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, put},
    Router,
};
use sentra_model::{AlertRule, HealthCheck};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;
use crate::ws;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::websocket_handler))
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/topics", get(list_topics))
        .route("/api/v1/state/{topic}", get(get_topic_state))
        .route("/api/v1/collectors", get(list_collectors))
        .route(
            "/api/v1/collectors/{name}/enable",
            axum::routing::post(enable_collector),
        )
        .route(
            "/api/v1/collectors/{name}/disable",
            axum::routing::post(disable_collector),
        )
        .route("/api/v1/collectors/{name}/interval", put(update_interval))
        .route(
            "/api/v1/health-checks",
            get(list_checks).post(create_check),
        )
        .route("/api/v1/health-checks/status", get(check_statuses))
        .route("/api/v1/health-checks/history", get(check_history))
        .route(
            "/api/v1/health-checks/{id}",
            get(get_check).put(update_check).delete(delete_check),
        )
        .route("/api/v1/alert-rules", get(list_rules).post(create_rule))
        .route("/api/v1/alert-rules/status", get(rule_statuses))
        .route(
            "/api/v1/alert-rules/{id}",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn get_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "hostname": state.config.hostname,
        "started_at": state.started_at,
        "uptime_secs": (chrono::Utc::now() - state.started_at).num_seconds(),
        "websocket_clients": state.hub.client_count(),
        "mqtt": state.mqtt.status(),
        "topics": state.bus.topics(),
    }))
}

async fn list_topics(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.bus.topics())
}

/// Cache read-through: the latest record on a topic.
async fn get_topic_state(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = state
        .bus
        .cache()
        .latest(&topic)
        .ok_or_else(|| ApiError::not_found(format!("topic {topic:?} has never published")))?;
    Ok(Json(serde_json::to_value(&*record).map_err(|err| {
        ApiError::internal(err.to_string())
    })?))
}

async fn list_collectors(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "collectors": state.collectors.all_status().await }))
}

async fn enable_collector(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    state.collectors.enable(&name).await?;
    Ok(Json(json!({ "status": state.collectors.status(&name).await? })))
}

async fn disable_collector(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    state.collectors.disable(&name).await?;
    Ok(Json(json!({ "status": state.collectors.status(&name).await? })))
}

#[derive(Debug, Deserialize)]
struct IntervalBody {
    interval_secs: u64,
}

async fn update_interval(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<IntervalBody>,
) -> ApiResult<Json<Value>> {
    state
        .collectors
        .update_interval(&name, body.interval_secs)
        .await?;
    Ok(Json(json!({ "status": state.collectors.status(&name).await? })))
}

async fn list_checks(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "checks": state.check_store.all() }))
}

async fn create_check(
    State(state): State<AppState>,
    Json(check): Json<HealthCheck>,
) -> ApiResult<Json<HealthCheck>> {
    Ok(Json(state.check_store.create(check)?))
}

async fn get_check(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<HealthCheck>> {
    state
        .check_store
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("health check {id:?} not found")))
}

async fn update_check(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut check): Json<HealthCheck>,
) -> ApiResult<Json<HealthCheck>> {
    check.id = id;
    Ok(Json(state.check_store.update(check)?))
}

async fn delete_check(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.check_store.delete(&id)?;
    Ok(Json(json!({ "deleted": id })))
}

async fn check_statuses(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "statuses": state.watchdog.statuses() }))
}

async fn check_history(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "events": state.watchdog.history() }))
}

async fn list_rules(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "rules": state.rule_store.all() }))
}

async fn create_rule(
    State(state): State<AppState>,
    Json(rule): Json<AlertRule>,
) -> ApiResult<Json<AlertRule>> {
    Ok(Json(state.rule_store.create(rule)?))
}

async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AlertRule>> {
    state
        .rule_store
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("alert rule {id:?} not found")))
}

async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut rule): Json<AlertRule>,
) -> ApiResult<Json<AlertRule>> {
    rule.id = id;
    Ok(Json(state.rule_store.update(rule)?))
}

async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.rule_store.delete(&id)?;
    Ok(Json(json!({ "deleted": id })))
}

async fn rule_statuses(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "statuses": state.alerts.statuses() }))
}
