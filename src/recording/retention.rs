//! Day-directory retention
//!
//! Keeps the `retained_days` most recently modified directories under a
//! device directory and removes the rest. Errors never propagate.

use std::path::Path;
use std::time::SystemTime;

/// Remove all but the `keep` newest subdirectories of `device_dir`.
///
/// Ties on modification time go to the lexically greater name, so between
/// two `YYYYMMDD` folders touched in the same instant the later day survives.
/// Returns how many directories were removed.
pub fn prune_day_dirs(device_dir: &Path, keep: usize) -> usize {
    let entries = match std::fs::read_dir(device_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Retention skipped for {}: {}", device_dir.display(), e);
            return 0;
        }
    };

    let mut days: Vec<(SystemTime, String)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_dir() {
                return None;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((modified, entry.file_name().to_string_lossy().into_owned()))
        })
        .collect();

    if days.len() <= keep {
        return 0;
    }

    days.sort_by(|a, b| b.cmp(a));

    let mut removed = 0;
    for (_, name) in days.into_iter().skip(keep) {
        let path = device_dir.join(&name);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::info!("Removed old recordings {}", path.display());
                removed += 1;
            }
            Err(e) => tracing::debug!("Failed to remove {}: {}", path.display(), e),
        }
    }
    removed
}
