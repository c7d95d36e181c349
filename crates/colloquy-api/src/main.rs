// Colloquy API server
// Decision: Gemini is the only wired backend for now; the chat route only
// sees the ModelBackend trait, so more providers slot in behind AppState.

mod chat;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::{extract::State, routing::get, Json, Router};
use colloquy_core::ToolRegistry;
use colloquy_gemini::GeminiBackend;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: String,
}

async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.model.clone(),
    })
}

/// State for health endpoint
#[derive(Clone)]
struct HealthState {
    model: String,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(chat::chat),
    components(
        schemas(
            chat::ChatRequest,
            chat::ErrorBody,
            colloquy_core::Message,
            colloquy_core::MessageRole,
            colloquy_core::MessagePart,
        )
    ),
    tags(
        (name = "chat", description = "Streaming chat endpoint (SSE)")
    ),
    info(
        title = "Colloquy API",
        version = "0.1.0",
        description = "Streaming chat gateway over a tool-calling model backend",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colloquy_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("colloquy-api starting...");

    // Backend configuration from environment
    let api_key =
        std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY environment variable required")?;
    let model =
        std::env::var("COLLOQUY_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string());

    let backend = match std::env::var("GEMINI_BASE_URL") {
        Ok(base_url) if !base_url.is_empty() => {
            tracing::info!(base_url = %base_url, "Using custom Gemini endpoint");
            GeminiBackend::with_base_url(api_key, &model, base_url)
        }
        _ => GeminiBackend::new(api_key, &model),
    };
    tracing::info!(model = %model, "Gemini backend configured");

    let state = chat::AppState {
        backend: Arc::new(backend),
        registry: ToolRegistry::with_defaults(),
    };
    let health_state = HealthState {
        model: model.clone(),
    };

    // Load CORS allowed origins from environment (optional)
    // Example: CORS_ALLOWED_ORIGINS="https://app.example.com,https://admin.example.com"
    let cors_origins: Vec<HeaderValue> = std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();

    if cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
    }

    // Build main router
    let app = Router::new()
        .route("/health", get(health).with_state(health_state))
        .merge(chat::routes(state));

    // Add Swagger UI
    let app =
        app.merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    // Add CORS layer only if origins are configured
    let app = if !cors_origins.is_empty() {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::CACHE_CONTROL]),
        )
    } else {
        app
    };

    // Add tracing
    let app = app.layer(TraceLayer::new_for_http());

    // Start server
    let port = std::env::var("PORT").unwrap_or_else(|_| "9000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
