//! Backend `.env` bootstrap.

use std::fs;
use std::path::{Path, PathBuf};

/// What `ensure_env_file` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFileOutcome {
    AlreadyPresent,
    CopiedFromExample,
    WroteDefaults,
    Failed(String),
}

/// Make sure `<backend_dir>/.env` exists.
///
/// Copies `.env.example` when there is one, otherwise writes
/// `default_contents`. Errors are logged and reported, never propagated.
pub fn ensure_env_file(backend_dir: &Path, default_contents: &str) -> EnvFileOutcome {
    let env_path = env_path(backend_dir);
    if env_path.exists() {
        return EnvFileOutcome::AlreadyPresent;
    }

    log::info!("[Backend] No .env file found in backend directory, creating a default one...");

    let example_path = backend_dir.join(".env.example");
    let result = if example_path.exists() {
        fs::copy(&example_path, &env_path).map(|_| EnvFileOutcome::CopiedFromExample)
    } else {
        fs::write(&env_path, default_contents).map(|_| EnvFileOutcome::WroteDefaults)
    };

    match result {
        Ok(outcome) => {
            match outcome {
                EnvFileOutcome::CopiedFromExample => {
                    log::info!("[Backend] Created .env file from .env.example")
                }
                _ => log::info!("[Backend] Created default .env file"),
            }
            outcome
        }
        Err(e) => {
            log::error!("[Backend] Error creating .env file {}: {}", env_path.display(), e);
            EnvFileOutcome::Failed(e.to_string())
        }
    }
}

fn env_path(backend_dir: &Path) -> PathBuf {
    backend_dir.join(".env")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: &str = "API_PORT=8618\nCOMFYUI_PATH=../../../";

    #[test]
    fn writes_two_default_lines() {
        let tmp = tempfile::tempdir().unwrap();

        let outcome = ensure_env_file(tmp.path(), DEFAULTS);

        assert_eq!(outcome, EnvFileOutcome::WroteDefaults);
        let written = fs::read_to_string(tmp.path().join(".env")).unwrap();
        assert_eq!(written.lines().collect::<Vec<_>>(), vec!["API_PORT=8618", "COMFYUI_PATH=../../../"]);
    }

    #[test]
    fn copies_example_template() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(".env.example"), "API_PORT=9000\nCIVITAI_API_KEY=\n").unwrap();

        let outcome = ensure_env_file(tmp.path(), DEFAULTS);

        assert_eq!(outcome, EnvFileOutcome::CopiedFromExample);
        let written = fs::read_to_string(tmp.path().join(".env")).unwrap();
        assert_eq!(written, "API_PORT=9000\nCIVITAI_API_KEY=\n");
    }

    #[test]
    fn leaves_existing_file_alone() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(".env"), "API_PORT=1234").unwrap();

        let outcome = ensure_env_file(tmp.path(), DEFAULTS);

        assert_eq!(outcome, EnvFileOutcome::AlreadyPresent);
        assert_eq!(fs::read_to_string(tmp.path().join(".env")).unwrap(), "API_PORT=1234");
    }

    #[test]
    fn missing_backend_dir_is_reported_not_raised() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = ensure_env_file(&tmp.path().join("absent"), DEFAULTS);
        assert!(matches!(outcome, EnvFileOutcome::Failed(_)));
    }
}
