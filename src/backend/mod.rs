//! Backend Management Module
//!
//! Installs the FastAPI backend's dependencies and runs it as a supervised
//! subprocess.

pub mod env_file;
pub mod health;
pub mod install;
pub mod manager;
pub mod process;

pub use install::install_dependencies;
pub use manager::{BackendManager, BackendPhase, BackendStatus, SupervisorOptions};
pub use process::ProcessSpec;
