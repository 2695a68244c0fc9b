//! Elementary stream to MP4 merge
//!
//! Video is copied untouched with regenerated timestamps, A-law audio is
//! re-encoded to AAC, and the output is cut to the shorter stream.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;

use crate::error::MergeError;
use crate::merge::locator::TranscoderLocator;

/// A-law input sample rate
pub const AUDIO_SAMPLE_RATE: u32 = 8000;

/// A-law input channel count
pub const AUDIO_CHANNELS: u32 = 1;

/// Transcoder arguments for one merge
pub fn merge_args(video: &Path, audio: &Path, output: &Path, frame_rate: u32) -> Vec<OsString> {
    vec![
        "-hide_banner".into(),
        "-y".into(),
        // Headerless companded audio first
        "-f".into(),
        "alaw".into(),
        "-ar".into(),
        AUDIO_SAMPLE_RATE.to_string().into(),
        "-ac".into(),
        AUDIO_CHANNELS.to_string().into(),
        "-i".into(),
        audio.as_os_str().into(),
        // Raw HEVC has no timestamps of its own
        "-r".into(),
        frame_rate.to_string().into(),
        "-fflags".into(),
        "+genpts".into(),
        "-i".into(),
        video.as_os_str().into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-shortest".into(),
        output.as_os_str().into(),
    ]
}

/// Runs the transcoder to package a segment
#[derive(Clone)]
pub struct ContainerMerger {
    locator: Arc<TranscoderLocator>,
}

impl ContainerMerger {
    pub fn new(locator: Arc<TranscoderLocator>) -> Self {
        Self { locator }
    }

    /// Merge `video` and `audio` into `output`
    pub async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        frame_rate: u32,
    ) -> Result<(), MergeError> {
        for source in [video, audio] {
            if !tokio::fs::try_exists(source).await.unwrap_or(false) {
                return Err(MergeError::MissingSource(source.to_path_buf()));
            }
        }

        let program = self.locator.resolve().await?;
        tracing::debug!("Merging {} + {} with {}", video.display(), audio.display(), program.display());

        let result = Command::new(&program)
            .args(merge_args(video, audio, output, frame_rate))
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(MergeError::Spawn)?;

        if !result.status.success() {
            let mut output_text = String::from_utf8_lossy(&result.stdout).into_owned();
            output_text.push_str(&String::from_utf8_lossy(&result.stderr));
            return Err(MergeError::Failed {
                status: result.status.to_string(),
                output: output_text.trim().to_string(),
            });
        }

        Ok(())
    }
}
