pub mod error;
pub mod proxy;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;

use axum::{
    Router,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{any, get},
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::backend::BackendStatus;
use crate::error::LauncherError;

use self::state::AppState;

/// Build the full axum router: launcher routes, `/api` forwarding, and the
/// built frontend as a fallback.
pub fn build_router(state: AppState, frontend_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    // API and status responses are never cached
    let no_cache = SetResponseHeaderLayer::if_not_present(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );

    let api = Router::new()
        .route("/health", get(health))
        .route("/launcher/backend", get(backend_status))
        .route("/api", any(proxy::forward_to_backend))
        .route("/api/{*path}", any(proxy::forward_to_backend))
        .layer(no_cache);

    let mut app = api.layer(cors).with_state(state);

    // Serve frontend SPA if the build exists
    match frontend_dir {
        Some(frontend) if frontend.join("index.html").exists() => {
            let index_path = frontend.join("index.html");
            // Unmatched routes get index.html so client-side routing works
            app = app.fallback_service(
                ServeDir::new(frontend).fallback(ServeFile::new(&index_path)),
            );
        }
        Some(frontend) => {
            log::warn!(
                "[Server] No frontend build at {}; only /api and /health are served. \
                 Build a static export (`output: 'export'`) or point \
                 COMFYDASH_FRONTEND_DIR at the exported directory",
                frontend.display()
            );
            app = app.fallback(frontend_missing);
        }
        None => {
            app = app.fallback(frontend_missing);
        }
    }

    app
}

/// Bind the dashboard listener on all interfaces.
pub async fn bind(port: u16) -> Result<tokio::net::TcpListener, LauncherError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| LauncherError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Serve `app` on `listener` until `shutdown` resolves, then stop accepting
/// and drain in-flight requests.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: F,
) -> Result<(), LauncherError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("[Server] > Ready on http://localhost:{}", addr.port());
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(LauncherError::Serve)?;

    log::info!("[Server] Frontend server closed");
    Ok(())
}

// ─── Route handlers ─────────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy"
    }))
}

#[derive(Serialize)]
struct BackendStatusResponse {
    #[serde(flatten)]
    status: BackendStatus,
    healthy: bool,
    url: String,
}

async fn backend_status(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<BackendStatusResponse> {
    let status = state.backend().status().await;
    let healthy = if status.pid.is_some() {
        state.backend().health_check().await
    } else {
        false
    };

    Json(BackendStatusResponse {
        status,
        healthy,
        url: state.backend_url().to_string(),
    })
}

async fn frontend_missing() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "detail": "Frontend build not found; build a static export or set COMFYDASH_FRONTEND_DIR"
        })),
    )
}
