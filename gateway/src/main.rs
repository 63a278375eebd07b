use anyhow::Result;
use axum::{routing::get, Json, Router};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod routes;

use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sitemap_gateway=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = AppState::new();
    tracing::info!("   Session {} ready", state.session_id);

    let api_routes = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", routes::session_routes(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Static file serving for the map UI (if present)
    let ui_dir =
        std::env::var("SITEMAP_UI_DIR").unwrap_or_else(|_| "ui/map-dashboard".to_string());
    let ui_path = std::path::Path::new(&ui_dir);
    let app = if ui_path.exists() {
        tracing::info!("   Serving UI from {}", ui_path.display());
        api_routes.nest_service("/", ServeDir::new(ui_path))
    } else {
        tracing::warn!("   UI directory {} not found - API only", ui_path.display());
        api_routes
    };

    let port = std::env::var("SITEMAP_GATEWAY_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "18650".to_string());
    let addr = format!("0.0.0.0:{}", port);

    tracing::info!("📍 Sitemap Gateway starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "sitemap-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
