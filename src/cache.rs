//! Frontend build cache cleanup.

use std::fs;
use std::path::Path;

/// Delete the build cache directory if present.
///
/// Best-effort: a failure is logged and startup carries on.
pub fn clear_build_cache(cache_dir: &Path) {
    log::info!("[Startup] Clearing build cache...");

    if !cache_dir.exists() {
        log::info!("[Startup] No build cache found at {}", cache_dir.display());
        return;
    }

    match fs::remove_dir_all(cache_dir) {
        Ok(()) => log::info!("[Startup] Build cache cleared ({})", cache_dir.display()),
        Err(e) => log::error!(
            "[Startup] Error clearing build cache {}: {}",
            cache_dir.display(),
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_existing_cache_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path().join(".next").join("cache");
        fs::create_dir_all(cache.join("webpack")).unwrap();
        fs::write(cache.join("webpack").join("chunk.pack"), b"data").unwrap();

        clear_build_cache(&cache);

        assert!(!cache.exists());
        // Parent is left alone
        assert!(tmp.path().join(".next").exists());
    }

    #[test]
    fn missing_cache_is_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path().join("nope");
        clear_build_cache(&cache);
        assert!(!cache.exists());
    }
}
