//! Backend Manager
//!
//! Supervises the FastAPI backend as a child process: launches it, watches
//! its output for a readiness marker, restarts it after a crash, and kills it
//! on shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::Child;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::env_file::ensure_env_file;
use super::health::health_check;
use super::process::{
    backend_spec, kill_process_tree, pump_output, spawn_child, OutputStream, ProcessSpec,
};
use crate::config::Config;

/// Where the supervisor currently is.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BackendPhase {
    /// `start()` has not been called yet
    Idle,
    /// Child spawned, no readiness marker seen yet
    Starting,
    /// Readiness marker seen
    Running,
    /// Child crashed; waiting out the restart delay
    RestartPending,
    /// Child exited with code 0; not restarted
    Exited,
    /// Child could not be spawned at all; not restarted
    SpawnFailed(String),
    /// Killed by `shutdown()`
    Stopped,
}

/// Snapshot of the supervisor state, served on the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub phase: BackendPhase,
    pub pid: Option<u32>,
    /// Number of successful spawns so far
    pub launches: u32,
    /// The current child printed a readiness marker
    pub ready: bool,
    /// The current child missed the startup deadline
    pub startup_timed_out: bool,
    pub last_exit_code: Option<i32>,
    pub last_started_at: Option<DateTime<Utc>>,
}

impl Default for BackendStatus {
    fn default() -> Self {
        Self {
            phase: BackendPhase::Idle,
            pid: None,
            launches: 0,
            ready: false,
            startup_timed_out: false,
            last_exit_code: None,
            last_started_at: None,
        }
    }
}

/// Timing knobs for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Fixed delay before relaunching a crashed child
    pub restart_delay: Duration,
    /// Deadline for the readiness marker
    pub startup_timeout: Duration,
    /// Health probe period once ready; `None` disables probing
    pub health_interval: Option<Duration>,
    /// Base URL probed by the health check
    pub backend_url: String,
    /// Contents written to a missing `.env`; `None` skips the bootstrap
    pub env_defaults: Option<String>,
}

impl SupervisorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            restart_delay: config.restart_delay,
            startup_timeout: config.startup_timeout,
            health_interval: Some(config.health_interval),
            backend_url: config.backend_url(),
            env_defaults: Some(config.default_env_contents()),
        }
    }
}

/// How a single child run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Shutdown,
    SpawnFailed,
    CleanExit,
    Crashed,
}

/// Backend manager state
pub struct BackendManager {
    inner: Arc<Supervisor>,
    /// The supervision task, present once started
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Supervisor {
    spec: ProcessSpec,
    options: SupervisorOptions,
    status: Mutex<BackendStatus>,
    shutdown: CancellationToken,
}

impl BackendManager {
    pub fn new(spec: ProcessSpec, options: SupervisorOptions) -> Self {
        Self {
            inner: Arc::new(Supervisor {
                spec,
                options,
                status: Mutex::new(BackendStatus::default()),
                shutdown: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Manager for `python3 run_server.py` with the configured timings.
    pub fn from_config(config: &Config) -> Self {
        Self::new(backend_spec(config), SupervisorOptions::from_config(config))
    }

    /// Start supervising the backend. Returns immediately; readiness, crashes
    /// and restarts are handled in the background.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            log::info!("[Backend] Already running");
            return;
        }
        if self.inner.shutdown.is_cancelled() {
            log::warn!("[Backend] Not starting: manager already shut down");
            return;
        }

        log::info!("[Backend] Starting Python backend server...");
        let supervisor = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move { supervisor.supervise().await }));
    }

    /// Kill the current child (no grace period) and stop restarting.
    ///
    /// Terminal: a manager that was shut down cannot be started again.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::error!("[Backend] Supervisor task failed: {}", e);
            }
        }
    }

    /// Current supervisor snapshot.
    pub async fn status(&self) -> BackendStatus {
        self.inner.status.lock().await.clone()
    }

    /// Check if a backend child is alive right now
    pub async fn is_running(&self) -> bool {
        self.inner.status.lock().await.pid.is_some()
    }

    /// Probe the backend's health route
    pub async fn health_check(&self) -> bool {
        health_check(&self.inner.options.backend_url).await
    }
}

impl Supervisor {
    /// Launch, wait, relaunch. Ends on shutdown, a clean exit, or a spawn error.
    async fn supervise(self: Arc<Self>) {
        loop {
            match self.run_once().await {
                RunOutcome::Shutdown | RunOutcome::SpawnFailed | RunOutcome::CleanExit => break,
                RunOutcome::Crashed => {
                    let delay = self.options.restart_delay;
                    log::info!(
                        "[Backend] Attempting to restart backend server in {:?}...",
                        delay
                    );
                    self.status.lock().await.phase = BackendPhase::RestartPending;

                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            self.status.lock().await.phase = BackendPhase::Stopped;
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One child lifetime, from spawn to exit.
    async fn run_once(self: &Arc<Self>) -> RunOutcome {
        if let Some(defaults) = &self.options.env_defaults {
            ensure_env_file(&self.spec.cwd, defaults);
        }

        log::info!(
            "[Backend] Running backend with command: {} in directory {}",
            self.spec.display(),
            self.spec.cwd.display()
        );

        let mut child = match spawn_child(&self.spec) {
            Ok(child) => child,
            Err(e) => {
                log::error!("[Backend] Failed to start backend process: {}", e);
                log::info!("[Backend] Please check if Python is installed and in your PATH");
                self.status.lock().await.phase = BackendPhase::SpawnFailed(e.to_string());
                return RunOutcome::SpawnFailed;
            }
        };

        let pid = child.id();
        {
            let mut status = self.status.lock().await;
            status.phase = BackendPhase::Starting;
            status.pid = pid;
            status.launches += 1;
            status.ready = false;
            status.startup_timed_out = false;
            status.last_started_at = Some(Utc::now());
        }
        log::info!("[Backend] Spawned backend (PID: {:?})", pid);

        let mut ready_rx = self.watch_output(&mut child);

        let startup_deadline = tokio::time::sleep(self.options.startup_timeout);
        tokio::pin!(startup_deadline);
        // A late marker still counts; the deadline only warns
        let mut ready_seen = false;
        let mut deadline_armed = true;
        let mut health_task: Option<JoinHandle<()>> = None;

        let outcome = loop {
            tokio::select! {
                exit = child.wait() => {
                    break self.on_exit(exit).await;
                }
                _ = self.shutdown.cancelled() => {
                    self.kill(&mut child, pid).await;
                    break RunOutcome::Shutdown;
                }
                Some(()) = ready_rx.recv(), if !ready_seen => {
                    ready_seen = true;
                    deadline_armed = false;
                    {
                        let mut status = self.status.lock().await;
                        status.ready = true;
                        status.phase = BackendPhase::Running;
                    }
                    log::info!("[Backend] Backend server started successfully!");
                    health_task = self.spawn_health_probe();
                }
                _ = &mut startup_deadline, if deadline_armed => {
                    deadline_armed = false;
                    self.status.lock().await.startup_timed_out = true;
                    log::warn!("[Backend] Backend server failed to start within the expected time");
                    log::warn!("[Backend] Please check your backend configuration and try again");
                    log::warn!(
                        "[Backend] You may need to start the backend manually with: cd {} && {}",
                        self.spec.cwd.display(),
                        self.spec.display()
                    );
                }
            }
        };

        if let Some(task) = health_task {
            task.abort();
        }

        outcome
    }

    /// Stream stdout/stderr into the log; readiness markers arrive on the
    /// returned channel.
    fn watch_output(&self, child: &mut Child) -> mpsc::UnboundedReceiver<()> {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_output(
                stdout,
                "Backend",
                OutputStream::Stdout,
                Some(ready_tx.clone()),
            ));
        }
        // uvicorn logs its banners on stderr
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_output(
                stderr,
                "Backend",
                OutputStream::Stderr,
                Some(ready_tx),
            ));
        }

        ready_rx
    }

    async fn on_exit(&self, exit: std::io::Result<std::process::ExitStatus>) -> RunOutcome {
        let mut status = self.status.lock().await;
        status.pid = None;
        status.ready = false;

        let exit_status = match exit {
            Ok(s) => s,
            Err(e) => {
                log::error!("[Backend] Error waiting for backend process: {}", e);
                status.last_exit_code = None;
                return if self.shutdown.is_cancelled() {
                    status.phase = BackendPhase::Stopped;
                    RunOutcome::Shutdown
                } else {
                    RunOutcome::Crashed
                };
            }
        };

        status.last_exit_code = exit_status.code();
        log::info!("[Backend] Backend process exited with {}", exit_status);

        if self.shutdown.is_cancelled() {
            status.phase = BackendPhase::Stopped;
            RunOutcome::Shutdown
        } else if exit_status.success() {
            status.phase = BackendPhase::Exited;
            RunOutcome::CleanExit
        } else {
            RunOutcome::Crashed
        }
    }

    async fn kill(&self, child: &mut Child, pid: Option<u32>) {
        log::info!("[Backend] Killing backend process (PID: {:?})", pid);

        if self.spec.own_process_group {
            if let Some(pid) = pid {
                kill_process_tree(pid).await;
            }
        }
        if let Err(e) = child.start_kill() {
            // Already gone (e.g. the group kill got there first)
            log::debug!("[Backend] start_kill: {}", e);
        }

        let exit = child.wait().await;

        let mut status = self.status.lock().await;
        status.pid = None;
        status.ready = false;
        status.phase = BackendPhase::Stopped;
        if let Ok(exit) = exit {
            status.last_exit_code = exit.code();
        }
    }

    /// Periodic health probe for the current child. The first probe runs one
    /// full interval after readiness.
    fn spawn_health_probe(&self) -> Option<JoinHandle<()>> {
        let period = self.options.health_interval?;
        let url = self.options.backend_url.clone();

        Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately; skip that one
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !health_check(&url).await {
                    log::warn!("[Backend] Health check failed ({})", url);
                }
            }
        }))
    }
}
