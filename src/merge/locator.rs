//! Transcoder binary resolution
//!
//! Prefers a transcoder on `PATH`. When the crate is built with the
//! `bundled-ffmpeg` feature the embedded binary is written out to a temp
//! directory the first time it is needed and reused afterwards.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

use crate::error::MergeError;

#[cfg(windows)]
pub const TRANSCODER_PROGRAM: &str = "ffmpeg.exe";
#[cfg(not(windows))]
pub const TRANSCODER_PROGRAM: &str = "ffmpeg";

/// Subdirectory of the temp dir holding the materialized binary
pub const MATERIALIZE_DIR: &str = "live-recorder-ffmpeg";

#[cfg(feature = "bundled-ffmpeg")]
static BUNDLED_TRANSCODER: Option<&[u8]> = Some(include_bytes!(env!("LIVE_RECORDER_FFMPEG_BLOB")));
#[cfg(not(feature = "bundled-ffmpeg"))]
static BUNDLED_TRANSCODER: Option<&[u8]> = None;

/// Finds (or materializes) the transcoder, shared by every device worker
pub struct TranscoderLocator {
    program: String,
    bundled: Option<&'static [u8]>,
    materialize_dir: PathBuf,
    materialized: OnceCell<PathBuf>,
}

impl TranscoderLocator {
    /// Locator for `ffmpeg` with the compiled-in fallback, if any
    pub fn new() -> Self {
        Self::with_fallback(
            TRANSCODER_PROGRAM,
            BUNDLED_TRANSCODER,
            std::env::temp_dir().join(MATERIALIZE_DIR),
        )
    }

    pub fn with_fallback(
        program: impl Into<String>,
        bundled: Option<&'static [u8]>,
        materialize_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            bundled,
            materialize_dir: materialize_dir.into(),
            materialized: OnceCell::new(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Path of the transcoder to run
    pub async fn resolve(&self) -> Result<PathBuf, MergeError> {
        if let Some(path) = std::env::var_os("PATH").and_then(|p| find_in_path(&self.program, &p)) {
            return Ok(path);
        }

        let bytes = self
            .bundled
            .ok_or_else(|| MergeError::ToolNotFound(self.program.clone()))?;

        self.materialized
            .get_or_try_init(|| materialize(&self.materialize_dir, &self.program, bytes))
            .await
            .cloned()
    }
}

impl Default for TranscoderLocator {
    fn default() -> Self {
        Self::new()
    }
}

/// First executable `program` in a `PATH`-style list
pub fn find_in_path(program: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Write the bundled bytes to `dir/program`, reusing a complete earlier copy.
///
/// The bytes go to a unique partial file first and are renamed into place, so
/// two recorder processes racing on the same temp dir both end up with a
/// complete binary.
async fn materialize(dir: &Path, program: &str, bytes: &[u8]) -> Result<PathBuf, MergeError> {
    let target = dir.join(program);
    let err = |source| MergeError::Materialize {
        path: target.clone(),
        source,
    };

    if let Ok(meta) = tokio::fs::metadata(&target).await {
        if meta.is_file() && meta.len() == bytes.len() as u64 {
            return Ok(target);
        }
    }

    tokio::fs::create_dir_all(dir).await.map_err(err)?;

    let mut partial_name = OsString::from(program);
    partial_name.push(format!(".{}.part", uuid::Uuid::new_v4()));
    let partial = dir.join(partial_name);

    tokio::fs::write(&partial, bytes).await.map_err(err)?;
    set_executable(&partial).await.map_err(err)?;
    if let Err(e) = tokio::fs::rename(&partial, &target).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(err(e));
    }

    tracing::info!("Materialized bundled transcoder at {}", target.display());
    Ok(target)
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const FAKE_BINARY: &[u8] = b"#!/bin/sh\nexit 0\n";

    fn unlikely_program() -> String {
        format!("live-recorder-missing-{}", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_missing_tool_without_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let locator = TranscoderLocator::with_fallback(unlikely_program(), None, dir.path());

        let err = locator.resolve().await.unwrap_err();
        assert!(matches!(err, MergeError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_first_use_materializes_once() {
        let dir = tempfile::tempdir().unwrap();
        let locator = Arc::new(TranscoderLocator::with_fallback(
            unlikely_program(),
            Some(FAKE_BINARY),
            dir.path().join("bin"),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locator = locator.clone();
            handles.push(tokio::spawn(async move { locator.resolve().await.unwrap() }));
        }
        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap());
        }

        assert!(paths.iter().all(|p| p == &paths[0]));
        assert_eq!(std::fs::read(&paths[0]).unwrap(), FAKE_BINARY);

        // Only the final binary is left, no partial files
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("bin")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_existing_complete_copy_reused() {
        let dir = tempfile::tempdir().unwrap();
        let program = unlikely_program();
        let target = dir.path().join(&program);
        std::fs::write(&target, FAKE_BINARY).unwrap();
        let before = std::fs::metadata(&target).unwrap().modified().unwrap();

        let locator = TranscoderLocator::with_fallback(program, Some(FAKE_BINARY), dir.path());
        assert_eq!(locator.resolve().await.unwrap(), target);
        assert_eq!(std::fs::metadata(&target).unwrap().modified().unwrap(), before);
    }

    #[cfg(unix)]
    #[test]
    fn test_find_in_path_requires_exec_bit() {
        use std::os::unix::fs::PermissionsExt;

        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        let plain = first.path().join("tool");
        std::fs::write(&plain, b"data").unwrap();
        std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o644)).unwrap();

        let exec = second.path().join("tool");
        std::fs::write(&exec, FAKE_BINARY).unwrap();
        std::fs::set_permissions(&exec, std::fs::Permissions::from_mode(0o755)).unwrap();

        let path_var = std::env::join_paths([first.path(), second.path()]).unwrap();
        assert_eq!(find_in_path("tool", &path_var), Some(exec));
        assert_eq!(find_in_path("other", &path_var), None);
    }
}
