//! Backend dependency installation.

use super::process::{pump_output, spawn_child, OutputStream, ProcessSpec};
use crate::error::LauncherError;

/// Run the package installer and wait for it.
///
/// Exit code 0 is success; anything else (including death by signal) is an
/// `Install` error.
pub async fn install_dependencies(spec: &ProcessSpec) -> Result<(), LauncherError> {
    log::info!("[Install] Installing Python dependencies...");
    log::info!(
        "[Install] Running {} in {}",
        spec.display(),
        spec.cwd.display()
    );

    let mut child = spawn_child(spec)?;

    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(pump_output(out, "Pip", OutputStream::Stdout, None)));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(pump_output(err, "Pip", OutputStream::Stderr, None)));

    let status = child.wait().await.map_err(|source| LauncherError::Io {
        path: spec.cwd.clone(),
        source,
    })?;

    // Drain the remaining output before reporting
    for pump in [stdout, stderr].into_iter().flatten() {
        let _ = pump.await;
    }

    if status.success() {
        log::info!("[Install] Python dependencies installed successfully");
        Ok(())
    } else {
        log::error!("[Install] {} exited with {}", spec.program, status);
        Err(LauncherError::Install {
            code: status.code(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_exit_succeeds() {
        let spec = ProcessSpec::new("sh", &["-c", "echo Successfully installed fastapi"], ".");
        assert!(install_dependencies(&spec).await.is_ok());
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let spec = ProcessSpec::new("sh", &["-c", "echo 'No matching distribution' >&2; exit 1"], ".");
        match install_dependencies(&spec).await {
            Err(LauncherError::Install { code }) => assert_eq!(code, Some(1)),
            other => panic!("expected install error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_installer_is_an_error() {
        let spec = ProcessSpec::new("/no/such/pip3", &["install"], ".");
        assert!(matches!(
            install_dependencies(&spec).await,
            Err(LauncherError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn runs_in_the_given_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("requirements.txt"), "fastapi\n").unwrap();
        let spec = ProcessSpec::new("sh", &["-c", "test -f requirements.txt"], tmp.path());
        assert!(install_dependencies(&spec).await.is_ok());
    }
}
