//! ComfyDash launcher.
//!
//! Supervises the Python backend of the ComfyDash dashboard and serves the
//! web UI, forwarding `/api` requests to the backend.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod server;

pub use config::Config;
pub use error::LauncherError;
pub use orchestrator::{termination_signal, Orchestrator};
