//! HTTP/JSON API over the opportunity store, the source repository, and the
//! manager's manual fetch trigger.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use seer_core::report::Generator;
use seer_storage::{
    OpportunityFilter, OpportunityStore, SourceRecord, SourceRepository, StoredOpportunity,
};
use seer_sync::Manager;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    store: OpportunityStore,
    repo: SourceRepository,
    manager: Arc<Manager>,
}

impl AppState {
    pub fn new(pool: SqlitePool, manager: Arc<Manager>) -> Self {
        Self {
            store: OpportunityStore::new(pool.clone()),
            repo: SourceRepository::new(pool),
            manager,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/opportunities", get(list_opportunities))
        .route("/opportunities/stats", get(opportunity_stats))
        .route("/opportunities/{id}", get(get_opportunity))
        .route("/sources", get(list_sources).post(create_source))
        .route("/sources/types", get(source_types))
        .route(
            "/sources/{id}",
            get(get_source).put(update_source).delete(delete_source),
        )
        .route("/sources/{id}/toggle", post(toggle_source))
        .route("/sources/fetch", post(trigger_fetch))
        .route("/reports/generate", post(generate_report));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    info!(host, port, "http server listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

// ---- wire shapes ----

#[derive(Debug, Serialize)]
struct OpportunityResponse {
    id: i64,
    title: String,
    description: String,
    source_type: String,
    source_url: String,
    source_id_external: String,
    score: i64,
    signals: Vec<String>,
    detected_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<StoredOpportunity> for OpportunityResponse {
    fn from(row: StoredOpportunity) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            source_type: row.source_type,
            source_url: row.source_url,
            source_id_external: row.external_id,
            score: row.score,
            signals: row.signals,
            detected_at: row.detected_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct SourceResponse {
    id: i64,
    #[serde(rename = "type")]
    source_type: String,
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    url: String,
    enabled: bool,
    is_builtin: bool,
    created_at: DateTime<Utc>,
}

impl From<SourceRecord> for SourceResponse {
    fn from(record: SourceRecord) -> Self {
        Self {
            id: record.id,
            source_type: record.source_type,
            name: record.name,
            url: record.url,
            enabled: record.enabled,
            is_builtin: record.is_builtin,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SourceRequest {
    #[serde(rename = "type", default)]
    source_type: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    config: Option<HashMap<String, String>>,
    #[serde(default)]
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    source: Option<String>,
    min_score: Option<i64>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct StatsQuery {
    source: Option<String>,
    min_score: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportQuery {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReportResponse {
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    opportunity_count: usize,
    content_human: String,
    content_prompt: String,
}

// ---- handlers ----

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_opportunities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let filter = OpportunityFilter {
        source_type: query.source,
        min_score: query.min_score.unwrap_or(0),
        limit: query.limit.unwrap_or(0),
        offset: query.offset.unwrap_or(0),
    };
    match state.store.list(&filter).await {
        Ok(rows) => {
            let body: Vec<OpportunityResponse> =
                rows.into_iter().map(OpportunityResponse::from).collect();
            Json(body).into_response()
        }
        Err(err) => internal_error(err),
    }
}

async fn get_opportunity(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.store.get(id).await {
        Ok(Some(row)) => Json(OpportunityResponse::from(row)).into_response(),
        Ok(None) => not_found("opportunity not found"),
        Err(err) => internal_error(err),
    }
}

async fn opportunity_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Response {
    match state
        .store
        .stats(query.source.as_deref(), query.min_score.unwrap_or(0))
        .await
    {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn list_sources(State(state): State<Arc<AppState>>) -> Response {
    match state.repo.get_all().await {
        Ok(records) => {
            let body: Vec<SourceResponse> =
                records.into_iter().map(SourceResponse::from).collect();
            Json(body).into_response()
        }
        Err(err) => internal_error(err),
    }
}

async fn source_types() -> Json<Vec<&'static str>> {
    Json(seer_adapters::available_types().to_vec())
}

async fn get_source(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.repo.get_by_id(id).await {
        Ok(Some(record)) => Json(SourceResponse::from(record)).into_response(),
        Ok(None) => not_found("source not found"),
        Err(err) => internal_error(err),
    }
}

async fn create_source(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SourceRequest>,
) -> Response {
    if !seer_adapters::available_types().contains(&request.source_type.as_str()) {
        return bad_request("invalid source type");
    }
    if request.name.is_empty() {
        return bad_request("name is required");
    }

    let config = request
        .config
        .as_ref()
        .and_then(|map| serde_json::to_string(map).ok())
        .unwrap_or_else(|| "{}".to_string());

    let mut record = SourceRecord {
        id: 0,
        source_type: request.source_type,
        name: request.name,
        url: request.url,
        config,
        enabled: request.enabled.unwrap_or(true),
        is_builtin: false,
        created_at: Utc::now(),
    };

    match state.repo.create(&mut record).await {
        Ok(()) => (StatusCode::CREATED, Json(SourceResponse::from(record))).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn update_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<SourceRequest>,
) -> Response {
    let mut record = match state.repo.get_by_id(id).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found("source not found"),
        Err(err) => return internal_error(err),
    };
    if record.is_builtin {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "builtin sources cannot be modified"})),
        )
            .into_response();
    }

    if !request.name.is_empty() {
        record.name = request.name;
    }
    if !request.url.is_empty() {
        record.url = request.url;
    }
    if let Some(config) = &request.config {
        if let Ok(encoded) = serde_json::to_string(config) {
            record.config = encoded;
        }
    }
    if let Some(enabled) = request.enabled {
        record.enabled = enabled;
    }

    match state.repo.update(&record).await {
        Ok(()) => Json(SourceResponse::from(record)).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn delete_source(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.repo.delete(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        // the repository reports one combined "not found or builtin" failure
        Err(err) => (StatusCode::NOT_FOUND, Json(json!({"error": err.to_string()})))
            .into_response(),
    }
}

async fn toggle_source(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    let record = match state.repo.get_by_id(id).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found("source not found"),
        Err(err) => return internal_error(err),
    };

    let enabled = !record.enabled;
    match state.repo.set_enabled(id, enabled).await {
        Ok(()) => Json(json!({"id": id, "enabled": enabled})).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn trigger_fetch(State(state): State<Arc<AppState>>) -> Response {
    // Fire-and-forget: the fetch keeps running after this response is sent.
    Arc::clone(&state.manager).spawn_fetch();
    Json(json!({
        "status": "started",
        "message": "Fetching opportunities from all enabled sources",
    }))
    .into_response()
}

async fn generate_report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Response {
    let period_end = match parse_date(query.end.as_deref()) {
        Some(date) => end_of_day(date),
        None => Utc::now(),
    };
    let period_start = match parse_date(query.start.as_deref()) {
        Some(date) => date.and_time(NaiveTime::MIN).and_utc(),
        None => period_end - Duration::hours(24),
    };

    let rows = match state.store.range(period_start, period_end).await {
        Ok(rows) => rows,
        Err(err) => return internal_error(err),
    };
    let items: Vec<_> = rows.iter().map(StoredOpportunity::to_report_item).collect();
    let report = Generator::new().generate(&items, period_start, period_end);

    Json(ReportResponse {
        period_start: report.period_start,
        period_end: report.period_end,
        opportunity_count: report.opportunity_count,
        content_human: report.content_human,
        content_prompt: report.content_prompt,
    })
    .into_response()
}

// ---- helpers ----

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|value| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc() + Duration::hours(24) - Duration::seconds(1)
}

fn internal_error(err: anyhow::Error) -> Response {
    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
        .into_response()
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": message}))).into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use seer_adapters::Registry;
    use seer_core::Opportunity;
    use tower::ServiceExt;

    async fn test_app() -> (Router, AppState) {
        let pool = seer_storage::connect_in_memory().await.unwrap();
        seer_storage::migrate(&pool).await.unwrap();
        // empty registry keeps every code path off the network
        let manager = Arc::new(Manager::new(pool.clone(), 60).with_registry(Registry::new()));
        let state = AppState::new(pool, manager);
        (app(state.clone()), state)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn seed_opportunity(state: &AppState, external_id: &str, score: i64) {
        let opp = Opportunity {
            title: format!("Opportunity {external_id}"),
            description: "desc".into(),
            source_type: "hackernews".into(),
            source_url: format!("https://news.ycombinator.com/item?id={external_id}"),
            external_id: external_id.into(),
            detected_at: Utc::now(),
            metadata: serde_json::Map::new(),
        };
        state
            .store
            .upsert(1, &opp, score, &["technical".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _) = test_app().await;
        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn empty_store_lists_as_empty_array_not_error() {
        let (app, _) = test_app().await;
        let response = app
            .clone()
            .oneshot(get_request("/api/opportunities"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));

        let response = app
            .oneshot(get_request("/api/opportunities/stats"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn opportunities_serialize_the_wire_contract() {
        let (app, state) = test_app().await;
        state.repo.seed().await.unwrap();
        seed_opportunity(&state, "900", 75).await;

        let response = app
            .clone()
            .oneshot(get_request("/api/opportunities?min_score=50"))
            .await
            .unwrap();
        let body = body_json(response).await;
        let row = &body[0];
        assert_eq!(row["source_type"], "hackernews");
        assert_eq!(row["source_id_external"], "900");
        assert_eq!(row["score"], 75);
        assert_eq!(row["signals"], json!(["technical"]));
        assert!(row["detected_at"].as_str().unwrap().contains('T'));

        let id = row["id"].as_i64().unwrap();
        let response = app
            .oneshot(get_request(&format!("/api/opportunities/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_opportunity_is_404() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(get_request("/api/opportunities/12345"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn source_crud_and_builtin_protection() {
        let (app, state) = test_app().await;
        state.repo.seed().await.unwrap();

        // create
        let response = app
            .clone()
            .oneshot(post_request(
                "/api/sources",
                json!({"type": "rss", "name": "My Feed", "url": "https://ex/feed.xml"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["type"], "rss");

        // list contains 4 builtin + 1 custom
        let response = app.clone().oneshot(get_request("/api/sources")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 5);

        // invalid type rejected
        let response = app
            .clone()
            .oneshot(post_request(
                "/api/sources",
                json!({"type": "telegraph", "name": "Nope"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // builtin update is forbidden
        let builtin_id = state.repo.get_all().await.unwrap()[0].id;
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/api/sources/{builtin_id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"name": "Hijacked"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // builtin delete reports not found or builtin
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/sources/{builtin_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // custom rows delete cleanly
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/sources/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // toggling a builtin is allowed
        let response = app
            .oneshot(post_request(
                &format!("/api/sources/{builtin_id}/toggle"),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["enabled"], false);
    }

    #[tokio::test]
    async fn source_types_lists_the_build_time_set() {
        let (app, _) = test_app().await;
        let response = app.oneshot(get_request("/api/sources/types")).await.unwrap();
        let body = body_json(response).await;
        let types = body.as_array().unwrap();
        assert_eq!(types.len(), 8);
        assert!(types.contains(&json!("hackernews")));
        assert!(types.contains(&json!("custom")));
    }

    #[tokio::test]
    async fn manual_fetch_returns_started_immediately() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(post_request("/api/sources/fetch", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "started");
    }

    #[tokio::test]
    async fn report_generation_covers_the_requested_window() {
        let (app, state) = test_app().await;
        state.repo.seed().await.unwrap();
        seed_opportunity(&state, "1", 80).await;
        seed_opportunity(&state, "2", 20).await;

        let response = app
            .clone()
            .oneshot(post_request("/api/reports/generate", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["opportunity_count"], 2);
        assert!(body["content_human"]
            .as_str()
            .unwrap()
            .starts_with("# Seer Opportunity Report"));
        assert!(body["content_prompt"]
            .as_str()
            .unwrap()
            .contains("=== OPPORTUNITIES ==="));

        // explicit period outside the data yields an empty digest
        let response = app
            .oneshot(post_request(
                "/api/reports/generate?start=2000-01-01&end=2000-01-02",
                json!({}),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["opportunity_count"], 0);
        assert!(body["content_human"]
            .as_str()
            .unwrap()
            .contains("No opportunities found"));
    }
}
