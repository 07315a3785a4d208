use std::sync::Arc;

use anyhow::Context;
use tower_http::services::ServeDir;

use routemarket::MarketContext;
use routemarket_axum::RouteMarket;
use routemarket_core::db::adapter::Adapter;
use routemarket_core::{env, MarketplaceOptions};
use routemarket_memory::MemoryAdapter;
use routemarket_sqlx::SqlxAdapter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env::init_logger();

    let options = MarketplaceOptions::from_env().context("invalid configuration")?;

    let adapter: Arc<dyn Adapter> = match options.database_url.as_deref() {
        Some(url) => Arc::new(SqlxAdapter::connect(url).await.context("database connection failed")?),
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            Arc::new(MemoryAdapter::new())
        }
    };

    let upload_dir = options.storage.directory.clone();
    let ctx = MarketContext::init(options, adapter).await.context("marketplace initialization failed")?;

    let app = RouteMarket::from_context(ctx)
        .router_with_cors()
        .nest_service("/uploads", ServeDir::new(upload_dir));

    let addr = env::var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "routemarket listening");

    axum::serve(listener, app).await?;
    Ok(())
}
