//! API routes

pub mod hos;

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    dto::hos::{
        AggregatesResponse, CorrectionBody, CorrectionResponse, ErrorResponse, RecomputeResponse,
        RuleLimitResponse, RuleSetResponse, SegmentResponse, SplitSleeperResponse, TransitionBody,
        TransitionResponse, ViolationResponse,
    },
    handlers, AppState,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::hos::transition_handler,
        handlers::hos::aggregates_handler,
        handlers::hos::violations_handler,
        handlers::hos::recompute_handler,
        handlers::hos::correct_segment_handler,
        handlers::hos::ruleset_handler,
        health_handler
    ),
    components(
        schemas(
            TransitionBody, TransitionResponse, SegmentResponse, ViolationResponse,
            AggregatesResponse, RecomputeResponse, CorrectionBody, CorrectionResponse,
            RuleSetResponse, RuleLimitResponse, SplitSleeperResponse, ErrorResponse
        )
    ),
    tags(
        (name = "hos", description = "Duty-status log and Hours-of-Service queries"),
        (name = "maintenance", description = "Recompute and correction"),
        (name = "health", description = "Health check endpoints")
    ),
    info(
        title = "HaulAPI",
        version = "0.1.0",
        description = "Hours-of-Service compliance engine for the HaulWatch fleet platform",
        contact(
            name = "HaulWatch Team"
        )
    )
)]
pub struct ApiDoc;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(hos::routes())
        .route("/health", axum::routing::get(health_handler))
        .with_state(state)
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = String)
    ),
    tag = "health"
)]
async fn health_handler() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use haulwatch_domain::hos::{DriverId, HosConfig, HosService, RuleSet, VehicleId, HOUR};
    use haulwatch_domain::memory::{InMemoryDvirRegistry, InMemoryLogStore};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::backend::{GateBackend, LogBackend};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn test_app() -> Router {
        let store = InMemoryLogStore::new();
        store.register_driver(DriverId::new("drv-1"));
        let registry = InMemoryDvirRegistry::new();
        registry.certify(VehicleId::new("truck-1"), t(0));

        let service = HosService::new(
            LogBackend::Memory(store),
            GateBackend::Memory(registry),
            RuleSet::us_federal(),
            HosConfig::default(),
        );
        create_router(AppState {
            hos_service: Arc::new(service),
        })
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn transition(status: &str, at: i64) -> Request<Body> {
        let vehicle = (status == "driving").then_some("truck-1");
        post_json(
            "/hos/transitions",
            json!({
                "driver_id": "drv-1",
                "vehicle_id": vehicle,
                "status": status,
                "timestamp": t(at),
            }),
        )
    }

    /// Off duty at 0, driving from 10h to 22h
    async fn twelve_hour_drive(app: &Router) {
        for (status, at) in [("off_duty", 0), ("driving", 10 * HOUR), ("off_duty", 22 * HOUR)] {
            let resp = app.clone().oneshot(transition(status, at)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::CREATED);
        }
    }

    #[tokio::test]
    async fn test_health() {
        let resp = test_app().oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let resp = test_app().oneshot(get("/api-docs/openapi.json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let doc = body_json(resp).await;
        assert!(doc["paths"]["/hos/transitions"]["post"].is_object());
    }

    #[tokio::test]
    async fn test_transition_returns_201_with_closed_segment() {
        let app = test_app();
        app.clone().oneshot(transition("off_duty", 0)).await.unwrap();

        let resp = app.oneshot(transition("driving", 10 * HOUR)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body = body_json(resp).await;
        assert_eq!(body["segment"]["status"], "driving");
        assert_eq!(body["segment"]["vehicle_id"], "truck-1");
        assert!(body["segment"]["end_time"].is_null());
        assert_eq!(body["closed"]["status"], "off_duty");
        assert_eq!(body["violations"], json!([]));
    }

    #[tokio::test]
    async fn test_drive_without_rest_returns_409() {
        let app = test_app();
        app.clone().oneshot(transition("off_duty", 0)).await.unwrap();

        let resp = app.oneshot(transition("driving", 8 * HOUR)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let body = body_json(resp).await;
        assert_eq!(body["code"], "ERR_NO_QUALIFYING_REST");
    }

    #[tokio::test]
    async fn test_transition_for_unknown_driver_returns_409() {
        let resp = test_app()
            .oneshot(post_json(
                "/hos/transitions",
                json!({"driver_id": "drv-9", "status": "off_duty", "timestamp": t(0)}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(resp).await["code"], "ERR_UNKNOWN_DRIVER");

        let resp = test_app()
            .oneshot(get("/hos/drivers/drv-9/aggregates"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_status_returns_400() {
        let resp = test_app()
            .oneshot(post_json(
                "/hos/transitions",
                json!({"driver_id": "drv-1", "status": "napping", "timestamp": t(0)}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "ERR_INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_aggregates_at_instant() {
        let app = test_app();
        app.clone().oneshot(transition("off_duty", 0)).await.unwrap();
        app.clone()
            .oneshot(transition("driving", 10 * HOUR))
            .await
            .unwrap();

        let uri = format!("/hos/drivers/drv-1/aggregates?as_of={}", t(13 * HOUR).format("%Y-%m-%dT%H:%M:%SZ"));
        let resp = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["rule_set"], "us-federal");
        assert_eq!(body["driving_secs"], 3 * HOUR);
        assert_eq!(body["duty_elapsed_secs"], 3 * HOUR);
        assert_eq!(body["findings"], json!([]));
    }

    #[tokio::test]
    async fn test_violations_in_detection_order() {
        let app = test_app();
        twelve_hour_drive(&app).await;

        let resp = app.oneshot(get("/hos/drivers/drv-1/violations")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        let records = body.as_array().unwrap();
        assert!(records
            .iter()
            .any(|v| v["rule_id"] == "DRIVE_11H" && v["severity"] == "violation"));

        let detected: Vec<&str> = records
            .iter()
            .map(|v| v["detected_at"].as_str().unwrap())
            .collect();
        let mut sorted = detected.clone();
        sorted.sort();
        assert_eq!(detected, sorted);
    }

    #[tokio::test]
    async fn test_recompute_reproduces_stored_findings() {
        let app = test_app();
        twelve_hour_drive(&app).await;

        let stored = body_json(
            app.clone()
                .oneshot(get("/hos/drivers/drv-1/violations"))
                .await
                .unwrap(),
        )
        .await;

        let resp = app
            .oneshot(post_json("/hos/recompute/drv-1", json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let report = body_json(resp).await;
        assert_eq!(report["policy"], "retroactive");
        assert_eq!(report["unchanged"], stored.as_array().unwrap().len());
        assert_eq!(report["added"], json!([]));
    }

    #[tokio::test]
    async fn test_correct_segment_stores_new_revision() {
        let app = test_app();
        twelve_hour_drive(&app).await;

        let resp = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/hos/drivers/drv-1/segments/2024-01-01T10:00:00Z")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"location":"Reno, NV"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["segment"]["revision"], 1);
        assert_eq!(body["segment"]["start_location"], "Reno, NV");
        assert_eq!(body["segment"]["status"], "driving");
    }

    #[tokio::test]
    async fn test_empty_correction_returns_400() {
        let app = test_app();
        twelve_hour_drive(&app).await;

        let resp = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/hos/drivers/drv-1/segments/2024-01-01T10:00:00Z")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ruleset_lists_federal_limits() {
        let resp = test_app().oneshot(get("/hos/ruleset")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["name"], "us-federal");
        assert_eq!(body["qualifying_rest_secs"], 10 * HOUR);
        assert_eq!(body["rules"].as_array().unwrap().len(), 5);
    }
}
