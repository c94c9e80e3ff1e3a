//! HaulAPI - Hours-of-Service Service
//!
//! HTTP front for the HaulWatch compliance engine. Records duty-status
//! transitions, answers rolling-window and violation queries, and exposes the
//! recompute and correction maintenance paths.

mod backend;
mod config;
mod dto;
mod handlers;
mod routes;

use anyhow::Result;
use haulwatch_domain::hos::HosService;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::backend::{GateBackend, LogBackend};
use crate::config::AppConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub hos_service: Arc<HosService<LogBackend, GateBackend>>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("HOS_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before the subscriber reads RUST_LOG
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting HaulAPI service");

    let config = AppConfig::from_env()?;
    let rules = config.rule_set()?;
    info!(rule_set = %rules.name, policy = %config.recompute_policy, "Loaded rule set");

    let (store, gate) = backend::build(&config).await?;
    let service = HosService::new(store, gate, rules, config.hos_config());

    let state = AppState {
        hos_service: Arc::new(service),
    };

    // Build HTTP router
    let app = routes::create_router(state);

    let addr = config.addr();
    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
