//! Launcher Configuration
//!
//! Resolves the project layout, ports, and interpreter commands once at
//! startup. Every default lives in a named constant.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port the dashboard listens on when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 8619;

/// Port the Python backend listens on when `API_PORT` is not set.
pub const DEFAULT_API_PORT: u16 = 8618;

/// ComfyUI location written into a freshly generated backend `.env`.
pub const DEFAULT_COMFYUI_PATH: &str = "../../../";

/// Delay between a backend crash and the next launch.
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

/// How long the backend has to print a readiness marker before we warn.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between health probes once the backend is up.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Backend directory, relative to the project root.
pub const BACKEND_DIR: &str = "backend";

/// Frontend build cache, relative to the project root.
pub const CACHE_DIR: &str = ".next/cache";

/// Built frontend served by the listener, relative to the project root.
///
/// Needs a static export (`output: 'export'`); a standalone build has no
/// `out/`, so point `COMFYDASH_FRONTEND_DIR` elsewhere in that case.
pub const FRONTEND_DIR: &str = "out";

/// Backend entry point, relative to the backend directory.
pub const BACKEND_ENTRY: &str = "run_server.py";

/// Dependency manifest, relative to the backend directory.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Get the default Python interpreter command for this platform
pub fn default_python_command() -> String {
    if cfg!(target_os = "windows") {
        "python".to_string()
    } else {
        "python3".to_string()
    }
}

/// Get the default pip command for this platform
pub fn default_pip_command() -> String {
    if cfg!(target_os = "windows") {
        "pip".to_string()
    } else {
        "pip3".to_string()
    }
}

/// Everything the launcher needs to know, resolved once.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project root (the directory holding `backend/` and the frontend build)
    pub root_dir: PathBuf,
    /// Dashboard listener port
    pub port: u16,
    /// Backend API port, also written into a generated `.env`
    pub api_port: u16,
    /// ComfyUI location written into a generated `.env`
    pub comfyui_path: String,
    pub backend_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub frontend_dir: PathBuf,
    /// Python interpreter used to run the backend
    pub python: String,
    /// Package installer used for `requirements.txt`
    pub pip: String,
    pub restart_delay: Duration,
    pub startup_timeout: Duration,
    pub health_interval: Duration,
}

impl Config {
    /// Build the default configuration for a project rooted at `root`.
    pub fn for_root(root: &Path) -> Self {
        Self {
            root_dir: root.to_path_buf(),
            port: DEFAULT_PORT,
            api_port: DEFAULT_API_PORT,
            comfyui_path: DEFAULT_COMFYUI_PATH.to_string(),
            backend_dir: root.join(BACKEND_DIR),
            cache_dir: root.join(CACHE_DIR),
            frontend_dir: root.join(FRONTEND_DIR),
            python: default_python_command(),
            pip: default_pip_command(),
            restart_delay: RESTART_DELAY,
            startup_timeout: STARTUP_TIMEOUT,
            health_interval: HEALTH_INTERVAL,
        }
    }

    /// Load the configuration from the process environment.
    pub fn from_env() -> Self {
        let root = env::var_os("COMFYDASH_ROOT")
            .map(PathBuf::from)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = Self::for_root(&root);

        config.port = parse_port(env::var("PORT").ok().as_deref(), DEFAULT_PORT);
        config.api_port = parse_port(env::var("API_PORT").ok().as_deref(), DEFAULT_API_PORT);

        if let Ok(path) = env::var("COMFYUI_PATH") {
            if !path.trim().is_empty() {
                config.comfyui_path = path;
            }
        }
        if let Ok(python) = env::var("COMFYDASH_PYTHON") {
            if !python.trim().is_empty() {
                config.python = python;
            }
        }
        if let Ok(pip) = env::var("COMFYDASH_PIP") {
            if !pip.trim().is_empty() {
                config.pip = pip;
            }
        }
        if let Some(dir) = env::var_os("COMFYDASH_FRONTEND_DIR") {
            config.frontend_dir = PathBuf::from(dir);
        }

        config
    }

    /// Base URL of the backend API, as seen from this host.
    pub fn backend_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.api_port)
    }

    /// Default `.env` contents for the backend (exactly two lines).
    pub fn default_env_contents(&self) -> String {
        format!("API_PORT={}\nCOMFYUI_PATH={}", self.api_port, self.comfyui_path)
    }
}

/// Parse a port number, falling back to `default` when absent or invalid.
pub fn parse_port(value: Option<&str>, default: u16) -> u16 {
    match value.map(str::trim) {
        None | Some("") => default,
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) => port,
            Err(e) => {
                log::warn!("[Config] Ignoring invalid port {:?}: {}", raw, e);
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_for_root() {
        let config = Config::for_root(Path::new("/srv/comfydash"));
        assert_eq!(config.port, 8619);
        assert_eq!(config.api_port, 8618);
        assert_eq!(config.backend_dir, PathBuf::from("/srv/comfydash/backend"));
        assert_eq!(config.cache_dir, PathBuf::from("/srv/comfydash/.next/cache"));
        assert_eq!(config.restart_delay, Duration::from_secs(5));
        assert_eq!(config.startup_timeout, Duration::from_secs(10));
    }

    #[test]
    fn port_parsing_falls_back() {
        assert_eq!(parse_port(None, 8619), 8619);
        assert_eq!(parse_port(Some(""), 8619), 8619);
        assert_eq!(parse_port(Some("9000"), 8619), 9000);
        assert_eq!(parse_port(Some(" 9001 "), 8619), 9001);
        assert_eq!(parse_port(Some("not-a-port"), 8619), 8619);
        assert_eq!(parse_port(Some("70000"), 8619), 8619);
    }

    #[test]
    fn default_env_is_two_lines() {
        let config = Config::for_root(Path::new("."));
        let contents = config.default_env_contents();
        assert_eq!(contents, "API_PORT=8618\nCOMFYUI_PATH=../../../");
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn backend_url_uses_api_port() {
        let mut config = Config::for_root(Path::new("."));
        config.api_port = 9100;
        assert_eq!(config.backend_url(), "http://127.0.0.1:9100");
    }
}
