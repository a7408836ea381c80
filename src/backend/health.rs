//! Backend Health Checks
//!
//! Probes the backend's `/api/health/` route.

use std::time::Duration;
use serde::Deserialize;

/// Health response from the backend
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Check whether the backend at `base_url` answers its health route.
///
/// The backend reports `{"status": "running"}`; `"healthy"` is accepted too.
pub async fn health_check(base_url: &str) -> bool {
    let url = format!("{}/api/health/", base_url.trim_end_matches('/'));

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(c) => c,
        Err(_) => return false,
    };

    match client.get(&url).send().await {
        Ok(response) => {
            if response.status().is_success() {
                match response.json::<HealthResponse>().await {
                    Ok(health) => health.status == "running" || health.status == "healthy",
                    Err(_) => false,
                }
            } else {
                false
            }
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn running_backend_is_healthy() {
        let router = Router::new().route(
            "/api/health/",
            get(|| async {
                Json(serde_json::json!({
                    "status": "running",
                    "message": "ComfyDash API server is running"
                }))
            }),
        );
        let base = serve(router).await;
        assert!(health_check(&base).await);
        assert!(health_check(&format!("{}/", base)).await);
    }

    #[tokio::test]
    async fn unexpected_status_is_unhealthy() {
        let router = Router::new().route(
            "/api/health/",
            get(|| async { Json(serde_json::json!({"status": "degraded"})) }),
        );
        let base = serve(router).await;
        assert!(!health_check(&base).await);
    }

    #[tokio::test]
    async fn unreachable_backend_is_unhealthy() {
        // Grab a free port, then release it so nothing listens there
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!health_check(&format!("http://127.0.0.1:{}", port)).await);
    }
}
