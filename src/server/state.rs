use std::sync::Arc;
use std::time::Duration;

use crate::backend::BackendManager;

/// Shared application state available to all axum handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Supervisor of the Python backend
    backend: Arc<BackendManager>,
    /// Base URL `/api` requests are forwarded to (e.g. http://127.0.0.1:8618)
    backend_url: String,
    /// Client used for forwarding
    http: reqwest::Client,
}

impl AppState {
    pub fn new(backend: Arc<BackendManager>, backend_url: impl Into<String>) -> Self {
        let backend_url: String = backend_url.into();

        // No overall timeout: installs and downloads behind /api can run for minutes
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            // Redirects go back to the browser untouched
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|e| {
                log::warn!("[Server] Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            inner: Arc::new(AppStateInner {
                backend,
                backend_url: backend_url.trim_end_matches('/').to_string(),
                http,
            }),
        }
    }

    /// Get the backend manager.
    pub fn backend(&self) -> &BackendManager {
        &self.inner.backend
    }

    /// Get the backend base URL (no trailing slash).
    pub fn backend_url(&self) -> &str {
        &self.inner.backend_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }
}
