// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, error::Error, net::SocketAddr, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tenant_keyservice::{
    api::router,
    audit::{AuditEvent, AuditEventType},
    config::{ServiceConfig, Settings, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV},
    keys::{MasterKey, Registry},
    keystore::{Keystore, PemKeystore},
    protocol::EnvelopePolicy,
    state::AppState,
    storage::RedbStore,
};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn load_master_keys(settings: &Settings) -> Result<Vec<MasterKey>, Box<dyn Error>> {
    let keystore = PemKeystore;
    let mut keys = Vec::new();

    if let Some(dir) = &settings.keystore_dir {
        keys.extend(keystore.load_dir(dir)?);
    }
    if let Some(file) = &settings.keystore_file {
        let key = keystore.load(file)?;
        info!(address = %key.address(), file = %file.display(), "Master key loaded");
        keys.push(key);
    }
    if keys.is_empty() {
        warn!("No master keys loaded; the service will report not ready");
    }
    Ok(keys)
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!(error = %e, "Key service failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let settings = Settings::from_env()?;
    let config = ServiceConfig::load(&settings.config_path)?;
    let settings = settings.with_config(&config);

    let master_keys = load_master_keys(&settings)?;
    let store = RedbStore::open(&settings.database_path())?;
    let registry = Arc::new(Registry::initialize(
        &master_keys,
        &config.admins,
        Arc::new(store),
    )?);
    drop(master_keys);

    let policy = EnvelopePolicy::from_max_age_secs(settings.envelope_max_age_secs);
    let state = AppState::new(registry.clone(), policy)
        .with_default_root(config.default_root)
        .with_plain_routes(settings.plain_routes);
    info!(
        service_address = %state.identity.address(),
        roots = registry.roots().len(),
        "Service identity generated"
    );

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    AuditEvent::new(AuditEventType::ServiceStarted)
        .with_details(serde_json::json!({
            "addr": addr.to_string(),
            "roots": registry.roots(),
            "database": settings.database_path().display().to_string(),
        }))
        .emit();
    info!(%addr, "Tenant key service listening (OpenAPI at /api-doc/openapi.json)");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutting down...");
        signal_token.cancel();
    });

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    if let Some(report) = registry.shutdown() {
        let event = AuditEvent::new(AuditEventType::RegistryFlushed).with_details(
            serde_json::json!({
                "roots": report.roots,
                "records_written": report.records_written,
                "failures": report.failures,
            }),
        );
        if report.failures > 0 {
            event.failed("some registry entries could not be flushed").emit();
        } else {
            event.emit();
        }
    }
    Ok(())
}
