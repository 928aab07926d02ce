// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction signing endpoints.

use alloy::primitives::Address;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    audit::{AuditEvent, AuditEventType},
    error::{ApiError, KeyServiceResult},
    keys::parse_tenant_id,
    protocol::{open_request, seal_response, unix_now, Envelope, SecureRequest},
    signing::{sign_for_tenant, SignRequest, SignedTransaction, TxParams},
    state::AppState,
};

/// Plain signing request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionRequest {
    /// Decimal tenant identifier.
    pub user_id: String,
    #[schema(value_type = Option<String>)]
    #[serde(default)]
    pub root: Option<Address>,
    pub tx: TxParams,
}

fn audit_signing(
    actor: impl ToString,
    root: Address,
    tenant_id: u64,
    result: &KeyServiceResult<SignedTransaction>,
) {
    let mut event = AuditEvent::new(AuditEventType::TransactionSigned)
        .with_actor(actor)
        .with_root(root)
        .with_tenant(tenant_id)
        .outcome(result);
    if let Ok(signed) = result {
        event = event.with_details(serde_json::json!({
            "hash": signed.hash,
            "from": signed.from,
            "payer": signed.payer,
        }));
    }
    event.emit();
}

/// Sign a transaction with a tenant key, co-signing for the fee payer when
/// one is named.
#[utoipa::path(
    post,
    path = "/v1/sign",
    tag = "Signing",
    request_body = SignTransactionRequest,
    responses(
        (status = 200, description = "Signed transaction", body = SignedTransaction),
        (status = 400, description = "Invalid tenant identifier"),
        (status = 404, description = "Unknown root wallet or fee payer")
    )
)]
pub async fn sign_transaction(
    State(state): State<AppState>,
    Json(request): Json<SignTransactionRequest>,
) -> Result<Json<SignedTransaction>, ApiError> {
    let tenant_id = parse_tenant_id(&request.user_id)?;
    let root = state.root_for(request.root)?;

    let result = sign_for_tenant(&state.registry, root, tenant_id, &request.tx);
    audit_signing("plain", root, tenant_id, &result);
    Ok(Json(result?))
}

/// Sign through an admin envelope.
///
/// The payload is an RLP `SignRequest`; the sealed reply carries the raw
/// signed transaction bytes.
#[utoipa::path(
    post,
    path = "/v1/secure/sign",
    tag = "Signing",
    request_body = SecureRequest,
    responses(
        (status = 200, description = "Sealed raw transaction", body = Envelope),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Bad signature, stale envelope or undecryptable payload"),
        (status = 404, description = "Unknown root wallet or fee payer")
    )
)]
pub async fn secure_sign_transaction(
    State(state): State<AppState>,
    Json(request): Json<SecureRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let now = unix_now();
    let opened = open_request(&state.registry, &state.identity, &state.policy, &request, now)?;
    let sign_request = SignRequest::decode(&opened.payload)?;

    let result = sign_for_tenant(
        &state.registry,
        request.root,
        sign_request.tenant_id,
        &sign_request.params,
    );
    audit_signing(opened.admin, request.root, sign_request.tenant_id, &result);
    let signed = result?;

    let envelope = seal_response(&state.identity, &opened, &signed.raw, now)?;
    Ok(Json(envelope))
}
