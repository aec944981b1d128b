use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use storefront_cart::config::Config;
use storefront_cart::pricing::{Catalog, PricingEngine};
use storefront_cart::router::create_app_router;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    // Initialize the pricing engine from the product catalog
    let path = &config.catalog_path;
    let catalog = Catalog::load(path)
        .await
        .with_context(|| format!("loading catalog from {}", path.display()))?;
    let engine = Arc::new(PricingEngine::new(catalog, config.pricing));

    // Build application router with all routes and middleware
    let app = create_app_router(engine);

    // Configure the server address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Pricing authority running on http://{}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
