use std::path::PathBuf;

/// Failures that stop the launcher.
///
/// Everything else (cache clearing, `.env` generation, backend crashes) is
/// logged and handled in place.
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    #[error("Failed to install dependencies (exit code {})", display_code(.code))]
    Install { code: Option<i32> },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none".to_string(),
    }
}
