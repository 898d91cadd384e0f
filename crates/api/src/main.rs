use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use warden_infra::{AccessControl, AccessStore, InMemoryAccessStore, WardenConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warden_observability::init();

    let config = WardenConfig::load().context("failed to load configuration")?;
    let bind = config.server.bind.clone();

    let store: Arc<dyn AccessStore> = Arc::new(InMemoryAccessStore::new());
    let service = AccessControl::new(store, config).context("failed to initialise access control")?;

    let report = service.bootstrap().context("bootstrap failed")?;
    tracing::info!(
        permissions_created = report.permissions_created,
        admin_created = report.admin_user.is_some(),
        "seed data in place"
    );
    if let Err(e) = service.load_reference() {
        // Resolution falls back to built-in labels.
        tracing::warn!(error = %e, "reference data not loaded");
    }

    let app = warden_api::app::build_app(Arc::new(service));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
