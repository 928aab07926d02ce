// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// External API version reported by `/v1/version`.
pub const API_VERSION: &str = "1.0.0";

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness response with registry status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// "ok" or "unavailable".
    pub status: String,
    /// Number of loaded root wallets.
    pub roots: usize,
    /// Fresh derivations since startup.
    pub derivations: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VersionResponse {
    /// External API version.
    pub version: String,
    /// Server build version.
    pub server: String,
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 503 once the registry has been flushed for shutdown or when no
/// root wallet is loaded.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let roots = state.registry.roots().len();
    let ready = roots > 0 && !state.registry.is_shut_down();

    let response = ReadyResponse {
        status: if ready { "ok" } else { "unavailable" }.to_string(),
        roots,
        derivations: state.registry.derivations(),
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

#[utoipa::path(
    get,
    path = "/v1/version",
    tag = "Service",
    responses(
        (status = 200, description = "API version", body = VersionResponse)
    )
)]
pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: API_VERSION.to_string(),
        server: env!("CARGO_PKG_VERSION").to_string(),
    })
}
