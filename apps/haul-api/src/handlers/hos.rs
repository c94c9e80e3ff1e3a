//! Hours-of-Service handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use haulwatch_domain::hos::DriverId;
use tracing::info;

use super::ApiError;
use crate::{
    dto::hos::{
        AggregatesResponse, AsOfQuery, CorrectionBody, CorrectionResponse, ErrorResponse,
        FromQuery, RecomputeResponse, RuleSetResponse, SinceQuery, TransitionBody,
        TransitionResponse, ViolationResponse,
    },
    AppState,
};

/// Record a duty-status change
#[utoipa::path(
    post,
    path = "/hos/transitions",
    request_body = TransitionBody,
    responses(
        (status = 201, description = "Transition recorded", body = TransitionResponse),
        (status = 400, description = "Unknown duty status", body = ErrorResponse),
        (status = 409, description = "Unknown driver, rejected by a precondition, a timestamp that does not continue the log, or a busy driver lock", body = ErrorResponse),
        (status = 503, description = "Log store or DVIR gate unavailable", body = ErrorResponse)
    ),
    tag = "hos"
)]
pub async fn transition_handler(
    State(state): State<AppState>,
    Json(payload): Json<TransitionBody>,
) -> Result<(StatusCode, Json<TransitionResponse>), ApiError> {
    info!(driver_id = %payload.driver_id, status = %payload.status, "Received transition request");

    let request = payload.into_request()?;
    let outcome = state
        .hos_service
        .transition(request)
        .await
        .map_err(ApiError::from_transition)?;
    Ok((StatusCode::CREATED, Json(TransitionResponse::from(outcome))))
}

/// Rolling-window aggregates for a driver
#[utoipa::path(
    get,
    path = "/hos/drivers/{driver_id}/aggregates",
    params(
        ("driver_id" = String, Path, description = "Driver identifier"),
        AsOfQuery
    ),
    responses(
        (status = 200, description = "Aggregates at the requested instant", body = AggregatesResponse),
        (status = 404, description = "Unknown driver", body = ErrorResponse)
    ),
    tag = "hos"
)]
pub async fn aggregates_handler(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<AggregatesResponse>, ApiError> {
    let standing = state
        .hos_service
        .standing(&DriverId::new(driver_id), query.as_of)
        .await?;
    Ok(Json(AggregatesResponse::from(standing)))
}

/// Violations recorded for a driver, in detection order
#[utoipa::path(
    get,
    path = "/hos/drivers/{driver_id}/violations",
    params(
        ("driver_id" = String, Path, description = "Driver identifier"),
        SinceQuery
    ),
    responses(
        (status = 200, description = "Effective violation records", body = [ViolationResponse]),
        (status = 404, description = "Unknown driver", body = ErrorResponse)
    ),
    tag = "hos"
)]
pub async fn violations_handler(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
    Query(query): Query<SinceQuery>,
) -> Result<Json<Vec<ViolationResponse>>, ApiError> {
    let records = state
        .hos_service
        .violations(&DriverId::new(driver_id), query.since)
        .await?;
    Ok(Json(records.iter().map(ViolationResponse::from).collect()))
}

/// Replay a driver's history and reconcile stored findings
#[utoipa::path(
    post,
    path = "/hos/recompute/{driver_id}",
    params(
        ("driver_id" = String, Path, description = "Driver identifier"),
        FromQuery
    ),
    responses(
        (status = 200, description = "Recompute report", body = RecomputeResponse),
        (status = 404, description = "Unknown driver", body = ErrorResponse),
        (status = 409, description = "Driver lock busy", body = ErrorResponse)
    ),
    tag = "maintenance"
)]
pub async fn recompute_handler(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
    Query(query): Query<FromQuery>,
) -> Result<Json<RecomputeResponse>, ApiError> {
    info!(driver_id = %driver_id, "Received recompute request");

    let report = state
        .hos_service
        .recompute(&DriverId::new(driver_id), query.from)
        .await?;
    Ok(Json(RecomputeResponse::from(report)))
}

/// Correct a stored segment and recompute from it
#[utoipa::path(
    put,
    path = "/hos/drivers/{driver_id}/segments/{start_time}",
    params(
        ("driver_id" = String, Path, description = "Driver identifier"),
        ("start_time" = String, Path, description = "RFC 3339 start time of the segment to correct")
    ),
    request_body = CorrectionBody,
    responses(
        (status = 200, description = "Correction stored", body = CorrectionResponse),
        (status = 400, description = "Empty correction or unknown duty status", body = ErrorResponse),
        (status = 404, description = "Unknown driver or segment", body = ErrorResponse),
        (status = 409, description = "Correction would leave a driving segment without a vehicle", body = ErrorResponse)
    ),
    tag = "maintenance"
)]
pub async fn correct_segment_handler(
    State(state): State<AppState>,
    Path((driver_id, start_time)): Path<(String, DateTime<Utc>)>,
    Json(payload): Json<CorrectionBody>,
) -> Result<Json<CorrectionResponse>, ApiError> {
    info!(driver_id = %driver_id, start_time = %start_time, "Received segment correction");

    let correction = payload.into_correction()?;
    let outcome = state
        .hos_service
        .correct_segment(&DriverId::new(driver_id), start_time, correction)
        .await?;
    Ok(Json(CorrectionResponse::from(outcome)))
}

/// The active rule set
#[utoipa::path(
    get,
    path = "/hos/ruleset",
    responses(
        (status = 200, description = "Limits in force", body = RuleSetResponse)
    ),
    tag = "hos"
)]
pub async fn ruleset_handler(State(state): State<AppState>) -> Json<RuleSetResponse> {
    Json(RuleSetResponse::from(state.hos_service.rules()))
}
