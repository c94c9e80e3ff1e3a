//! Hours-of-Service routes

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{
    handlers::hos::{
        aggregates_handler, correct_segment_handler, recompute_handler, ruleset_handler,
        transition_handler, violations_handler,
    },
    AppState,
};

/// Create HOS routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/hos/transitions", post(transition_handler))
        .route("/hos/drivers/:driver_id/aggregates", get(aggregates_handler))
        .route("/hos/drivers/:driver_id/violations", get(violations_handler))
        .route(
            "/hos/drivers/:driver_id/segments/:start_time",
            put(correct_segment_handler),
        )
        .route("/hos/recompute/:driver_id", post(recompute_handler))
        .route("/hos/ruleset", get(ruleset_handler))
}
