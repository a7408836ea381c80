//! Backend Process Spawning
//!
//! Builds the command lines for the backend and its installer, spawns them,
//! and streams their output into the log.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::config::{Config, BACKEND_ENTRY, REQUIREMENTS_FILE};
use crate::error::LauncherError;

/// Substrings in backend output that mean the server is accepting requests.
pub const READINESS_MARKERS: [&str; 3] = [
    "Application startup complete",
    "Uvicorn running on",
    "started server",
];

/// A program to run, where to run it, and with which extra environment.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    /// Run in a fresh process group (Unix) so the whole tree can be killed
    pub own_process_group: bool,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, args: &[&str], cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: cwd.into(),
            env: HashMap::new(),
            own_process_group: false,
        }
    }

    /// Human-readable command line, for logs.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// `python3 run_server.py` in the backend directory.
pub fn backend_spec(config: &Config) -> ProcessSpec {
    let mut spec = ProcessSpec::new(&config.python, &[BACKEND_ENTRY], &config.backend_dir);
    // Unbuffered output so readiness markers show up as soon as they are printed
    spec.env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
    // uvicorn runs with a reloader that forks the actual server
    spec.own_process_group = true;
    spec
}

/// `pip3 install -r requirements.txt` in the backend directory.
pub fn install_spec(config: &Config) -> ProcessSpec {
    ProcessSpec::new(
        &config.pip,
        &["install", "-r", REQUIREMENTS_FILE],
        &config.backend_dir,
    )
}

/// Whether a line of backend output announces that the server is up.
pub fn is_ready_line(line: &str) -> bool {
    READINESS_MARKERS.iter().any(|marker| line.contains(marker))
}

/// Spawn a child with piped stdout/stderr.
///
/// The child is killed if its handle is dropped.
pub fn spawn_child(spec: &ProcessSpec) -> Result<Child, LauncherError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    {
        if spec.own_process_group {
            cmd.process_group(0);
        }
    }

    // Windows-specific: hide console window
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    }

    cmd.spawn().map_err(|source| LauncherError::Spawn {
        program: spec.program.clone(),
        source,
    })
}

/// Kill a child spawned with `own_process_group` and everything in its
/// group. No grace period.
pub async fn kill_process_tree(pid: u32) {
    #[cfg(unix)]
    let mut cmd = {
        // Negative PID targets the whole group
        let mut cmd = Command::new("kill");
        cmd.args(["-9", &format!("-{}", pid)]);
        cmd
    };

    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("taskkill");
        cmd.args(["/pid", &pid.to_string(), "/T", "/F"]);
        cmd
    };

    #[cfg(any(unix, windows))]
    {
        if let Err(e) = cmd.output().await {
            log::debug!("[Backend] Process tree kill for PID {} failed: {}", pid, e);
        }
    }
}

/// Which stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Log every line of `reader` under `label`.
///
/// When `ready_tx` is set, a message is sent for each line carrying a
/// readiness marker. Returns when the stream closes.
pub async fn pump_output<R>(
    reader: R,
    label: &'static str,
    stream: OutputStream,
    ready_tx: Option<mpsc::UnboundedSender<()>>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.is_empty() {
                    continue;
                }
                match stream {
                    OutputStream::Stderr if looks_like_error(&line) => {
                        log::error!("[{} Error] {}", label, line);
                    }
                    _ => log::info!("[{}] {}", label, line),
                }
                if let Some(tx) = &ready_tx {
                    if is_ready_line(&line) {
                        let _ = tx.send(());
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("[{}] Output stream error: {}", label, e);
                break;
            }
        }
    }
}

fn looks_like_error(line: &str) -> bool {
    line.contains("ERROR") || line.contains("Traceback") || line.contains("Exception")
}
