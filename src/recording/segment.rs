//! Segment naming and persistence
//!
//! Layout: `{storage_root}/{device}/{YYYYMMDD}/{HHMMSS}.{hevc,alaw,mp4}`

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::PersistError;

/// Annex-B HEVC elementary stream
pub const VIDEO_EXT: &str = "hevc";

/// G.711 A-law samples, 8 kHz mono
pub const AUDIO_EXT: &str = "alaw";

/// Merged container
pub const CONTAINER_EXT: &str = "mp4";

pub const DATE_FOLDER_FORMAT: &str = "%Y%m%d";
pub const TIME_FILE_FORMAT: &str = "%H%M%S";

/// One completed capture cycle on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub device_name: String,
    pub date_folder: String,
    pub time_file: String,
    dir: PathBuf,
}

impl Segment {
    /// Name a segment for `device_dir` at `at`
    pub fn at(device_name: &str, device_dir: &Path, at: NaiveDateTime) -> Self {
        let date_folder = at.format(DATE_FOLDER_FORMAT).to_string();
        let time_file = at.format(TIME_FILE_FORMAT).to_string();
        Self {
            device_name: device_name.to_string(),
            dir: device_dir.join(&date_folder),
            date_folder,
            time_file,
        }
    }

    /// Day directory holding this segment
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.time_file, ext))
    }

    pub fn video_path(&self) -> PathBuf {
        self.file(VIDEO_EXT)
    }

    pub fn audio_path(&self) -> PathBuf {
        self.file(AUDIO_EXT)
    }

    pub fn container_path(&self) -> PathBuf {
        self.file(CONTAINER_EXT)
    }

    /// Create the day directory if it does not exist yet
    pub async fn ensure_dir(&self) -> Result<(), PersistError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| PersistError::CreateDir {
                path: self.dir.clone(),
                source,
            })
    }
}

/// Append `data` to `path`, creating the file when needed
pub async fn append_file(path: &Path, data: &[u8]) -> Result<(), PersistError> {
    let err = |source| PersistError::Append {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(err)?;
    file.write_all(data).await.map_err(err)?;
    file.flush().await.map_err(err)?;
    Ok(())
}
