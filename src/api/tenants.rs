// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tenant registration endpoints.
//!
//! `POST /v1/tenants` is the plain route used by trusted in-cluster callers.
//! `POST /v1/secure/tenants` carries the same operation inside an admin
//! envelope.

use alloy::primitives::Address;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    audit::{AuditEvent, AuditEventType},
    error::ApiError,
    keys::{parse_tenant_id, AccountInfo},
    protocol::{
        messages::{RegisterTenant, TenantRegistered},
        open_request, seal_response, unix_now, Envelope, SecureRequest,
    },
    state::AppState,
};

/// Plain registration request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTenantRequest {
    /// Decimal tenant identifier.
    pub user_id: String,
    /// Root wallet; defaults to the configured or only loaded root.
    #[schema(value_type = Option<String>)]
    #[serde(default)]
    pub root: Option<Address>,
}

/// Register a tenant, deriving its account on first use.
///
/// Registering an existing tenant returns the same account.
#[utoipa::path(
    post,
    path = "/v1/tenants",
    tag = "Tenants",
    request_body = RegisterTenantRequest,
    responses(
        (status = 200, description = "Tenant account", body = AccountInfo),
        (status = 400, description = "Invalid tenant identifier"),
        (status = 404, description = "Unknown root wallet"),
        (status = 422, description = "Derivation path collision")
    )
)]
pub async fn register_tenant(
    State(state): State<AppState>,
    Json(request): Json<RegisterTenantRequest>,
) -> Result<Json<AccountInfo>, ApiError> {
    let tenant_id = parse_tenant_id(&request.user_id)?;
    let root = state.root_for(request.root)?;

    let result = state.registry.resolve_or_create(root, tenant_id);
    let mut event = AuditEvent::new(AuditEventType::TenantRegistered)
        .with_actor("plain")
        .with_root(root)
        .with_tenant(tenant_id)
        .outcome(&result);
    if let Ok(info) = &result {
        event = event.with_details(serde_json::json!({ "address": info.address, "path": info.path }));
    }
    event.emit();

    Ok(Json(result?))
}

/// Register a tenant through an admin envelope.
///
/// The envelope payload is an RLP `RegisterTenant`; the sealed reply carries
/// an RLP `TenantRegistered`.
#[utoipa::path(
    post,
    path = "/v1/secure/tenants",
    tag = "Tenants",
    request_body = SecureRequest,
    responses(
        (status = 200, description = "Sealed registration reply", body = Envelope),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Bad signature, stale envelope or undecryptable payload"),
        (status = 404, description = "Unknown root wallet")
    )
)]
pub async fn secure_register_tenant(
    State(state): State<AppState>,
    Json(request): Json<SecureRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let now = unix_now();
    let opened = open_request(&state.registry, &state.identity, &state.policy, &request, now)?;
    let message = RegisterTenant::decode(&opened.payload)?;

    let result = state.registry.resolve_or_create(request.root, message.tenant_id);
    AuditEvent::new(AuditEventType::TenantRegistered)
        .with_actor(opened.admin)
        .with_root(request.root)
        .with_tenant(message.tenant_id)
        .outcome(&result)
        .emit();
    let info = result?;

    let reply = TenantRegistered {
        tenant_id: info.tenant_id,
        address: info.address,
    };
    let envelope = seal_response(&state.identity, &opened, &reply.encode(), now)?;
    Ok(Json(envelope))
}
