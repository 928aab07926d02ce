// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{
    audit::{AuditEvent, AuditEventType},
    error::ApiError,
    protocol::{authenticate, unix_now, AuthRequest, Envelope},
    state::AppState,
};

/// Admin handshake.
///
/// The caller signs the fixed challenge hash with an admin key of `root`.
/// On success the service public key comes back sealed to the caller.
#[utoipa::path(
    post,
    path = "/v1/auth",
    tag = "Auth",
    request_body = AuthRequest,
    responses(
        (status = 200, description = "Sealed service key", body = Envelope),
        (status = 401, description = "Bad signature or untrusted admin"),
        (status = 404, description = "Unknown root wallet")
    )
)]
pub async fn handshake(
    State(state): State<AppState>,
    Json(request): Json<AuthRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let result = authenticate(&state.registry, &state.identity, &request, unix_now());

    let event_type = if result.is_ok() {
        AuditEventType::AuthSuccess
    } else {
        AuditEventType::AuthFailure
    };
    AuditEvent::new(event_type)
        .with_actor(request.admin)
        .with_root(request.root)
        .outcome(&result)
        .emit();

    Ok(Json(result?))
}
