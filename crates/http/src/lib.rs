//! HTTP facade: axum server bootstrap, error envelope, identity extractor,
//! and pagination helpers.

use anyhow::Context;
use axum::{routing::get, Router};

use biblio_kernel::settings::Settings;
use biblio_kernel::ModuleRegistry;

pub mod error;
pub mod extractor;
pub mod pagination;
pub mod router;

use router::RouterBuilder;

/// Bind and serve until the listener fails or the process is stopped.
pub async fn start_server(registry: &ModuleRegistry, settings: &Settings) -> anyhow::Result<()> {
    let app = build_router(registry, settings);
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}

fn build_router(registry: &ModuleRegistry, settings: &Settings) -> Router {
    let mut builder = RouterBuilder::new().route("/healthz", get(|| async { "ok" }));

    for module in registry.modules() {
        tracing::info!(module = module.name(), "mounting /api/{}", module.name());
        builder = builder.mount_module(module.name(), module.routes());
    }

    builder
        .with_middleware(&settings.server)
        .with_openapi(registry)
        .build()
}
