use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Extension, Json,
};
use tracing::debug;
use utoipa::OpenApi;

use super::{
    correlation::CorrelationId,
    dto::{ErrorBody, ReadParams, ReadingPayload, ReadingsResponse, SensorReadingDto, SubmitResponse},
    errors::ApiError,
    AppState,
};

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Store a batch of readings from a probe.
///
/// The batch is stored atomically: if any `(sensor, recorded_timestamp)` pair
/// already exists nothing is stored and `409` is returned, so a probe can
/// safely resubmit after a lost response.
#[utoipa::path(
    post,
    path = "/sense",
    request_body = Vec<ReadingPayload>,
    responses(
        (status = 200, description = "Readings stored", body = SubmitResponse),
        (status = 409, description = "Possible duplicate", body = ErrorBody),
        (status = 422, description = "Malformed readings", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody),
    ),
    tag = "readings"
)]
pub async fn submit_readings(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    payload: Result<Json<Vec<ReadingPayload>>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(readings) = payload?;
    debug!(count = readings.len(), "POST /sense");

    let current_timestamp = state.readings.submit(readings).await?;

    Ok(Json(SubmitResponse {
        id: correlation.to_string(),
        description: "ok".to_owned(),
        description_key: "ok".to_owned(),
        current_timestamp,
    }))
}

/// Fetch readings that arrived in `(start_timestamp, start_timestamp + period]`,
/// ordered by `received_timestamp ASC`. Without `start_timestamp` the window
/// is the last `period` seconds.
#[utoipa::path(
    get,
    path = "/read",
    params(
        ("start_timestamp" = Option<i64>, Query, description = "Exclusive start of the arrival window (Unix seconds). Defaults to now - period"),
        ("period"          = Option<i64>, Query, description = "Window length in seconds. Defaults to 600"),
        ("limit"           = Option<i64>, Query, description = "Maximum number of readings. Defaults to 100"),
    ),
    responses(
        (status = 200, description = "Readings in the window", body = ReadingsResponse),
        (status = 422, description = "Invalid query parameters", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody),
    ),
    tag = "readings"
)]
pub async fn read_readings(
    State(state): State<AppState>,
    params: Result<Query<ReadParams>, QueryRejection>,
) -> Result<Json<ReadingsResponse>, ApiError> {
    let Query(params) = params?;

    let page = state.readings.query(params).await?;

    Ok(Json(ReadingsResponse {
        readings: page.readings.into_iter().map(SensorReadingDto::from).collect(),
        current_timestamp: page.current_timestamp,
    }))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// Fallback for unmatched routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(submit_readings, read_readings, health),
    components(schemas(ReadingPayload, SensorReadingDto, SubmitResponse, ReadingsResponse, ErrorBody)),
    tags(
        (name = "readings", description = "Probe ingestion and windowed retrieval"),
        (name = "system",   description = "System endpoints"),
    ),
    info(
        title = "Push Monitor API",
        version = "0.1.0",
        description = "Collects sensor readings pushed by probes"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, routing::get};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use sqlx::PgPool;

    use super::ApiError;
    use crate::api::{instrument, router, routes, AppState};
    use crate::readings::QueryDefaults;

    fn state(pool: PgPool) -> AppState {
        AppState::new(pool, QueryDefaults::default())
    }

    fn test_server(pool: PgPool) -> TestServer {
        TestServer::new(router(state(pool))).unwrap()
    }

    async fn count(pool: &PgPool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM sensor_readings")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn reading(sensor: &str, recorded_timestamp: i64, value: f64) -> Value {
        json!({
            "sensor": sensor,
            "unit": "C",
            "value": value,
            "recorded_timestamp": recorded_timestamp,
        })
    }

    // -----------------------------------------------------------------------
    // POST /sense
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn sense_returns_ok_envelope(pool: PgPool) {
        let server = test_server(pool.clone());
        let before = chrono::Utc::now().timestamp();

        let resp = server
            .post("/sense")
            .json(&json!([reading("s1", 1000, 5.0)]))
            .await;
        resp.assert_status_ok();

        let correlation = resp.header("x-correlation-id");
        let body: Value = resp.json();
        assert_eq!(body["description"], "ok");
        assert_eq!(body["description_key"], "ok");
        assert_eq!(body["id"], correlation.to_str().unwrap());
        assert!(body["current_timestamp"].as_i64().unwrap() >= before);
        assert_eq!(count(&pool).await, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sense_resubmission_is_conflict(pool: PgPool) {
        let server = test_server(pool.clone());
        let batch = json!([reading("s1", 1000, 5.0)]);

        server.post("/sense").json(&batch).await.assert_status_ok();

        let resp = server.post("/sense").json(&batch).await;
        resp.assert_status(StatusCode::CONFLICT);
        let body: Value = resp.json();
        assert_eq!(body["description"], "Possible duplicate");

        assert_eq!(count(&pool).await, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sense_missing_value_is_422_and_stores_nothing(pool: PgPool) {
        let server = test_server(pool.clone());

        let resp = server
            .post("/sense")
            .json(&json!([
                reading("s1", 1000, 5.0),
                { "sensor": "s1", "unit": "C", "recorded_timestamp": 1001 },
            ]))
            .await;
        resp.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = resp.json();
        assert_eq!(body["description_key"], "validation.error");

        assert_eq!(count(&pool).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sense_non_array_body_is_422(pool: PgPool) {
        let server = test_server(pool);
        let resp = server.post("/sense").json(&json!({ "bad": "json" })).await;
        resp.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sense_wrong_types_are_422(pool: PgPool) {
        let server = test_server(pool);
        let resp = server
            .post("/sense")
            .json(&json!([{
                "sensor": "s1",
                "unit": "C",
                "value": "warm",
                "recorded_timestamp": 1000,
            }]))
            .await;
        resp.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sense_accepts_whole_float_timestamp(pool: PgPool) {
        let server = test_server(pool.clone());
        let resp = server
            .post("/sense")
            .json(&json!([{
                "sensor": "s1",
                "unit": "C",
                "value": 5,
                "recorded_timestamp": 1000.0,
            }]))
            .await;
        resp.assert_status_ok();

        let stored: i64 = sqlx::query_scalar(
            "SELECT recorded_timestamp FROM sensor_readings WHERE sensor = 's1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(stored, 1000);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sense_fractional_timestamp_is_422(pool: PgPool) {
        let server = test_server(pool.clone());
        let resp = server
            .post("/sense")
            .json(&json!([{
                "sensor": "s1",
                "unit": "C",
                "value": 5,
                "recorded_timestamp": 1000.5,
            }]))
            .await;
        resp.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        let body: Value = resp.json();
        assert_eq!(body["description_key"], "validation.error");
        assert_eq!(count(&pool).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sense_empty_batch_is_422(pool: PgPool) {
        let server = test_server(pool);
        let resp = server.post("/sense").json(&json!([])).await;
        resp.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    // -----------------------------------------------------------------------
    // GET /read
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn read_round_trips_submitted_reading(pool: PgPool) {
        let server = test_server(pool);
        let before = chrono::Utc::now().timestamp();

        server
            .post("/sense")
            .json(&json!([reading("s1", 1000, 21.5)]))
            .await
            .assert_status_ok();

        let resp = server
            .get("/read")
            .add_query_param("start_timestamp", before - 1)
            .add_query_param("period", 600)
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        let readings = body["readings"].as_array().unwrap();
        assert_eq!(readings.len(), 1);
        let r = &readings[0];
        assert_eq!(r["sensor"], "s1");
        assert_eq!(r["unit"], "C");
        assert_eq!(r["value"], 21.5);
        assert_eq!(r["recorded_timestamp"], 1000);
        assert!(r["received_timestamp"].as_i64().unwrap() >= before);
        assert!(body["current_timestamp"].as_i64().is_some());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn read_defaults_cover_recent_arrivals(pool: PgPool) {
        let server = test_server(pool);
        server
            .post("/sense")
            .json(&json!([reading("s1", 1, 1.0), reading("s2", 1, 2.0)]))
            .await
            .assert_status_ok();

        let body: Value = server.get("/read").await.json();
        assert_eq!(body["readings"].as_array().unwrap().len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn read_respects_limit(pool: PgPool) {
        let server = test_server(pool);
        let batch: Vec<Value> = (0..150).map(|i| reading("s1", i, i as f64)).collect();
        server.post("/sense").json(&batch).await.assert_status_ok();

        let body: Value = server
            .get("/read")
            .add_query_param("limit", 100)
            .await
            .json();
        let readings = body["readings"].as_array().unwrap();
        assert_eq!(readings.len(), 100);
        // One batch shares a received_timestamp, so arrival order decides.
        assert_eq!(readings[0]["recorded_timestamp"], 0);
        assert_eq!(readings[99]["recorded_timestamp"], 99);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn read_invalid_params_are_422(pool: PgPool) {
        let server = test_server(pool);

        server
            .get("/read")
            .add_query_param("period", "soon")
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        server
            .get("/read")
            .add_query_param("limit", -5)
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    // -----------------------------------------------------------------------
    // Routing and fault isolation
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_route_is_404(pool: PgPool) {
        let server = test_server(pool);
        let resp = server.post("/blah").json(&json!({ "bad": "json" })).await;
        resp.assert_status_not_found();
        let body: Value = resp.json();
        assert_eq!(body["description_key"], "not.found");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unhandled_error_is_generic_500(pool: PgPool) {
        async fn failing() -> Result<(), ApiError> {
            Err(anyhow::anyhow!("secret table layout leaked").into())
        }
        let app = instrument(routes(state(pool)).route("/testexception", get(failing)));
        let server = TestServer::new(app).unwrap();

        let resp = server.get("/testexception").await;
        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let correlation = resp.header("x-correlation-id");
        let text = resp.text();
        assert!(!text.contains("secret"));
        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["id"], correlation.to_str().unwrap());
        assert_eq!(body["description_key"], "internal.server.error");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn panicking_handler_is_generic_500(pool: PgPool) {
        async fn panicking() -> &'static str {
            panic!("index out of bounds in secret module")
        }
        let app = instrument(routes(state(pool)).route("/testpanic", get(panicking)));
        let server = TestServer::new(app).unwrap();

        let resp = server.get("/testpanic").await;
        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let correlation = resp.header("x-correlation-id");
        let text = resp.text();
        assert!(!text.contains("secret"));
        assert!(!text.contains("panicked"));
        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["id"], correlation.to_str().unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn each_request_gets_its_own_correlation_id(pool: PgPool) {
        let server = test_server(pool);
        let a = server.get("/health").await.header("x-correlation-id");
        let b = server.get("/health").await.header("x-correlation-id");
        assert_ne!(a, b);
    }

    // -----------------------------------------------------------------------
    // GET /health, GET /api-docs/openapi.json
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn health_returns_ok(pool: PgPool) {
        let server = test_server(pool);
        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["status"], "ok");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn openapi_spec_is_served(pool: PgPool) {
        let server = test_server(pool);
        let resp = server.get("/api-docs/openapi.json").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["info"]["title"], "Push Monitor API");
        assert!(body["paths"]["/sense"].is_object());
        assert!(body["paths"]["/read"].is_object());
    }
}
