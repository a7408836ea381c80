//! Startup Orchestrator
//!
//! Runs the launch sequence: clear the build cache, install backend
//! dependencies, start the supervised backend, serve the dashboard, and tear
//! everything down on a termination signal.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::process::install_spec;
use crate::backend::{install_dependencies, BackendManager, ProcessSpec};
use crate::cache::clear_build_cache;
use crate::config::Config;
use crate::error::LauncherError;
use crate::server::{self, state::AppState};

pub struct Orchestrator {
    config: Config,
    installer: ProcessSpec,
    backend: Arc<BackendManager>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        let installer = install_spec(&config);
        let backend = BackendManager::from_config(&config);
        Self::with_parts(config, installer, backend)
    }

    /// Build from explicit parts instead of the commands derived from `config`.
    pub fn with_parts(config: Config, installer: ProcessSpec, backend: BackendManager) -> Self {
        Self {
            config,
            installer,
            backend: Arc::new(backend),
        }
    }

    pub fn backend(&self) -> &Arc<BackendManager> {
        &self.backend
    }

    /// Run until `shutdown_signal` resolves.
    ///
    /// A failed dependency install returns before the backend or the
    /// listener is started. A bind failure stops the backend again and
    /// returns the error.
    pub async fn run<F>(self, shutdown_signal: F) -> Result<(), LauncherError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        clear_build_cache(&self.config.cache_dir);

        if let Err(e) = install_dependencies(&self.installer).await {
            log::error!("[Startup] Failed to start backend: {}", e);
            return Err(e);
        }

        self.backend.start().await;

        let listener = match server::bind(self.config.port).await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("[Server] {}", e);
                self.backend.shutdown().await;
                return Err(e);
            }
        };

        let state = AppState::new(Arc::clone(&self.backend), self.config.backend_url());
        let app = server::build_router(state, Some(self.config.frontend_dir.as_path()));

        // Signal -> kill backend -> close listener
        let listener_closed = CancellationToken::new();
        {
            let backend = Arc::clone(&self.backend);
            let listener_closed = listener_closed.clone();
            tokio::spawn(async move {
                shutdown_signal.await;
                log::info!("[Startup] Shutting down servers...");
                backend.shutdown().await;
                listener_closed.cancel();
            });
        }

        let served = server::serve(listener, app, listener_closed.clone().cancelled_owned()).await;

        // Listener gone for any reason: the backend goes with it
        self.backend.shutdown().await;
        served
    }
}

/// Resolves on Ctrl+C / SIGINT, or SIGTERM on Unix.
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[Startup] Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("[Startup] Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::backend::{BackendPhase, SupervisorOptions};

    fn test_config(root: &std::path::Path) -> Config {
        let mut config = Config::for_root(root);
        config.port = 0;
        config
    }

    fn backend(body: &str) -> BackendManager {
        BackendManager::new(
            ProcessSpec::new("sh", &["-c", body], "."),
            SupervisorOptions {
                restart_delay: Duration::from_millis(50),
                startup_timeout: Duration::from_secs(5),
                health_interval: None,
                backend_url: "http://127.0.0.1:9".to_string(),
                env_defaults: None,
            },
        )
    }

    #[tokio::test]
    async fn install_failure_stops_before_backend_and_listener() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        std::fs::create_dir_all(&config.cache_dir).unwrap();

        let orchestrator = Orchestrator::with_parts(
            config.clone(),
            ProcessSpec::new("sh", &["-c", "exit 1"], "."),
            backend("echo started server; sleep 30"),
        );
        let manager = Arc::clone(orchestrator.backend());

        let result = orchestrator.run(std::future::pending::<()>()).await;

        assert!(matches!(result, Err(LauncherError::Install { code: Some(1) })));
        let status = manager.status().await;
        assert_eq!(status.phase, BackendPhase::Idle);
        assert_eq!(status.launches, 0);
        // The cache step still ran first
        assert!(!config.cache_dir.exists());
    }

    #[tokio::test]
    async fn shutdown_kills_backend_and_closes_listener() {
        let tmp = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::with_parts(
            test_config(tmp.path()),
            ProcessSpec::new("sh", &["-c", "true"], "."),
            backend("echo 'INFO:     Uvicorn running on http://0.0.0.0:8618'; sleep 30"),
        );
        let manager = Arc::clone(orchestrator.backend());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let run = tokio::spawn(orchestrator.run(async move {
            let _ = rx.await;
        }));

        let start = Instant::now();
        let pid = loop {
            let status = manager.status().await;
            if status.ready {
                break status.pid.expect("ready backend has a pid");
            }
            assert!(start.elapsed() < Duration::from_secs(5), "backend never became ready");
            tokio::time::sleep(Duration::from_millis(20)).await;
        };

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("orchestrator should exit")
            .unwrap();

        assert!(result.is_ok());
        let status = manager.status().await;
        assert_eq!(status.phase, BackendPhase::Stopped);
        let alive = std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        assert!(!alive);
    }

    #[tokio::test]
    async fn bind_failure_is_fatal_and_stops_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let taken = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
        let mut config = test_config(tmp.path());
        config.port = taken.local_addr().unwrap().port();

        let orchestrator = Orchestrator::with_parts(
            config,
            ProcessSpec::new("sh", &["-c", "true"], "."),
            backend("sleep 30"),
        );
        let manager = Arc::clone(orchestrator.backend());

        let result = orchestrator.run(std::future::pending::<()>()).await;

        assert!(matches!(result, Err(LauncherError::Bind { .. })));
        assert!(!manager.is_running().await);
    }
}
