// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::{
    audit::{AuditEvent, AuditEventType},
    keys::AccountInfo,
    protocol::{AuthRequest, Envelope, SecureRequest},
    signing::{SignedTransaction, TxParams},
    state::AppState,
};

pub mod auth;
pub mod health;
pub mod sign;
pub mod tenants;

/// Build the service router.
///
/// The plain `/v1/tenants` and `/v1/sign` routes carry no authentication and
/// are only mounted when `AppState::plain_routes` is set.
pub fn router(state: AppState) -> Router {
    let mut v1_routes = Router::new()
        .route("/version", get(health::version))
        .route("/auth", post(auth::handshake))
        .route("/secure/tenants", post(tenants::secure_register_tenant))
        .route("/secure/sign", post(sign::secure_sign_transaction));

    if state.plain_routes {
        tracing::warn!("Unauthenticated plain routes enabled");
        v1_routes = v1_routes
            .route("/tenants", post(tenants::register_tenant))
            .route("/sign", post(sign::sign_transaction));
    }

    Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/api-doc/openapi.json", get(openapi_json))
        .nest("/v1", v1_routes)
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        health::readiness,
        health::version,
        tenants::register_tenant,
        tenants::secure_register_tenant,
        auth::handshake,
        sign::sign_transaction,
        sign::secure_sign_transaction
    ),
    components(
        schemas(
            health::HealthResponse,
            health::ReadyResponse,
            health::VersionResponse,
            tenants::RegisterTenantRequest,
            sign::SignTransactionRequest,
            AccountInfo,
            AuthRequest,
            SecureRequest,
            Envelope,
            TxParams,
            SignedTransaction,
            AuditEvent,
            AuditEventType
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Service", description = "Service metadata"),
        (name = "Tenants", description = "Tenant account registration"),
        (name = "Auth", description = "Admin envelope handshake"),
        (name = "Signing", description = "Tenant transaction signing with optional fee payer")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use alloy::primitives::{Address, U256};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use k256::ecdsa::SigningKey;
    use tower::ServiceExt;

    use crate::config::RootConfig;
    use crate::keys::{MasterKey, Registry};
    use crate::protocol::{
        messages::{RegisterTenant, TenantRegistered},
        unix_now, AdminSession, EnvelopePolicy,
    };
    use crate::signing::{PayerTransaction, SignRequest};
    use crate::storage::MemoryStore;

    struct Fixture {
        state: AppState,
        root: Address,
        payer: Address,
        admin: SigningKey,
    }

    fn fixture() -> Fixture {
        let root_key = MasterKey::new(SigningKey::from_slice(&[0x61; 32]).unwrap());
        let payer_key = MasterKey::new(SigningKey::from_slice(&[0x62; 32]).unwrap());
        let admin = SigningKey::from_slice(&[0x63; 32]).unwrap();
        let admin_address = MasterKey::new(admin.clone()).address();
        let (root, payer) = (root_key.address(), payer_key.address());

        let registry = Registry::initialize(
            &[root_key, payer_key],
            &[RootConfig {
                root,
                admins: vec![admin_address],
            }],
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        let state = AppState::new(Arc::new(registry), EnvelopePolicy::default())
            .with_default_root(Some(root))
            .with_plain_routes(true);

        Fixture {
            state,
            root,
            payer,
            admin,
        }
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn handshake(app: &Router, session: &mut AdminSession) {
        let request = session.auth_request().unwrap();
        let response = post_json(
            app.clone(),
            "/v1/auth",
            serde_json::to_value(&request).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let reply: Envelope = json_body(response).await;
        session.complete_handshake(&reply).unwrap();
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(fixture().state);
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn plain_routes_are_off_by_default() {
        let fixture = fixture();
        let app = router(fixture.state.clone().with_plain_routes(false));

        let response = post_json(
            app.clone(),
            "/v1/tenants",
            serde_json::json!({ "userId": "42" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = post_json(
            app,
            "/v1/sign",
            serde_json::json!({
                "userId": "42",
                "tx": { "nonce": 0, "value": "0x0", "gasPrice": "0x1", "gasLimit": 21000, "chainId": 1 }
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(fixture.state.registry.resolve(fixture.root, 42).unwrap().is_none());

        let state = AppState::new(fixture.state.registry.clone(), EnvelopePolicy::default());
        assert!(!state.plain_routes);
    }

    #[tokio::test]
    async fn version_and_request_id() {
        let app = router(fixture().state);
        let response = app
            .oneshot(Request::get("/v1/version").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body: serde_json::Value = json_body(response).await;
        assert_eq!(body["version"], health::API_VERSION);
    }

    #[tokio::test]
    async fn readiness_reports_loaded_roots() {
        let fixture = fixture();
        let app = router(fixture.state.clone());
        let response = app
            .clone()
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        fixture.state.registry.shutdown();
        let response = app
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn openapi_document_lists_routes() {
        let app = router(fixture().state);
        let response = app
            .oneshot(
                Request::get("/api-doc/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let doc: serde_json::Value = json_body(response).await;
        assert!(doc["paths"]["/v1/secure/sign"].is_object());
        assert!(doc["paths"]["/v1/tenants"].is_object());
    }

    #[tokio::test]
    async fn plain_registration_is_idempotent() {
        let fixture = fixture();
        let app = router(fixture.state);
        let body = serde_json::json!({ "userId": "18682003824" });

        let first: AccountInfo = json_body(post_json(app.clone(), "/v1/tenants", body.clone()).await).await;
        let second: AccountInfo = json_body(post_json(app, "/v1/tenants", body).await).await;

        assert_eq!(first, second);
        assert_eq!(first.root, fixture.root);
        assert_eq!(first.tenant_id, 18682003824);
    }

    #[tokio::test]
    async fn invalid_identifier_returns_error_json() {
        let app = router(fixture().state);
        let response = post_json(app, "/v1/tenants", serde_json::json!({ "userId": "12ab" })).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = json_body(response).await;
        assert_eq!(body["error_code"], "invalid_identifier");
    }

    #[tokio::test]
    async fn unknown_root_is_not_found() {
        let app = router(fixture().state);
        let response = post_json(
            app,
            "/v1/tenants",
            serde_json::json!({ "userId": "7", "root": Address::repeat_byte(0x09) }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn untrusted_admin_handshake_is_rejected() {
        let fixture = fixture();
        let app = router(fixture.state);
        let stranger = SigningKey::from_slice(&[0x64; 32]).unwrap();
        let session = AdminSession::new(stranger, fixture.root);

        let request = session.auth_request().unwrap();
        let response = post_json(app, "/v1/auth", serde_json::to_value(&request).unwrap()).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = json_body(response).await;
        assert_eq!(body["error_code"], "bad_signature");
    }

    #[tokio::test]
    async fn secure_registration_matches_plain_route() {
        let fixture = fixture();
        let app = router(fixture.state);
        let mut session = AdminSession::new(fixture.admin.clone(), fixture.root);
        handshake(&app, &mut session).await;

        let payload = RegisterTenant { tenant_id: 42 }.encode();
        let request = session.seal_request(&payload, unix_now()).unwrap();
        let response = post_json(
            app.clone(),
            "/v1/secure/tenants",
            serde_json::to_value(&request).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let reply: Envelope = json_body(response).await;
        let registered = TenantRegistered::decode(&session.open_response(&reply).unwrap()).unwrap();

        let plain: AccountInfo = json_body(
            post_json(app, "/v1/tenants", serde_json::json!({ "userId": "42" })).await,
        )
        .await;
        assert_eq!(registered.address, plain.address);
    }

    #[tokio::test]
    async fn secure_sign_returns_dual_signed_transaction() {
        let fixture = fixture();
        let app = router(fixture.state.clone());
        let mut session = AdminSession::new(fixture.admin.clone(), fixture.root);
        handshake(&app, &mut session).await;

        let sign_request = SignRequest {
            tenant_id: 7,
            params: TxParams {
                nonce: 3,
                to: Some(Address::repeat_byte(0x22)),
                value: U256::from(1_000u64),
                gas_price: U256::from(2u64),
                gas_limit: 21_000,
                chain_id: 1337,
                fee: Some(U256::from(50u64)),
                payer: Some(fixture.payer),
                ..Default::default()
            },
        };
        let request = session
            .seal_request(&sign_request.encode(), unix_now())
            .unwrap();
        let response = post_json(
            app,
            "/v1/secure/sign",
            serde_json::to_value(&request).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let reply: Envelope = json_body(response).await;
        let raw = session.open_response(&reply).unwrap();
        let tx = PayerTransaction::decode(&raw).unwrap();
        let tenant = fixture
            .state
            .registry
            .resolve(fixture.root, 7)
            .unwrap()
            .unwrap();

        assert_eq!(tx.recover_sender().unwrap(), tenant.address);
        assert_eq!(tx.recover_payer().unwrap(), fixture.payer);
    }

    #[tokio::test]
    async fn stale_secure_request_is_rejected() {
        let fixture = fixture();
        let app = router(fixture.state);
        let mut session = AdminSession::new(fixture.admin.clone(), fixture.root);
        handshake(&app, &mut session).await;

        let payload = RegisterTenant { tenant_id: 1 }.encode();
        let request = session.seal_request(&payload, unix_now() - 3_600).unwrap();
        let response = post_json(
            app,
            "/v1/secure/tenants",
            serde_json::to_value(&request).unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = json_body(response).await;
        assert_eq!(body["error_code"], "stale_envelope");
    }

    #[tokio::test]
    async fn plain_sign_with_unknown_payer_fails_cleanly() {
        let fixture = fixture();
        let app = router(fixture.state.clone());
        let response = post_json(
            app,
            "/v1/sign",
            serde_json::json!({
                "userId": "9",
                "tx": {
                    "nonce": 0,
                    "value": "0x0",
                    "gasPrice": "0x1",
                    "gasLimit": 21000,
                    "chainId": 1,
                    "payer": Address::repeat_byte(0x33),
                }
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(fixture.state.registry.resolve(fixture.root, 9).unwrap().is_none());
    }
}
