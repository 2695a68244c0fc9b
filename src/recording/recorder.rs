//! Per-device recording loop
//!
//! capture -> persist -> merge -> retain, forever. Only a failure to create
//! the day directory stops the loop; everything else is logged and the next
//! cycle starts.

use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::DeviceConfig;
use crate::error::{PersistError, Result};
use crate::merge::ContainerMerger;
use crate::network::{Capture, CaptureSource};
use crate::recording::retention::prune_day_dirs;
use crate::recording::segment::{append_file, Segment};

/// Clock used to name segments
pub type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Local wall-clock time
pub fn local_clock() -> Clock {
    Box::new(|| chrono::Local::now().naive_local())
}

/// Result of one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing captured; slept for the reconnect delay
    Retried,
    /// Segment written (merge may still have failed)
    Recorded(Segment),
}

/// Recording worker for one device
pub struct Recorder<S: CaptureSource> {
    device: DeviceConfig,
    source: S,
    merger: ContainerMerger,
    clock: Clock,
}

impl<S: CaptureSource> Recorder<S> {
    pub fn new(device: DeviceConfig, source: S, merger: ContainerMerger) -> Self {
        Self {
            device,
            source,
            merger,
            clock: local_clock(),
        }
    }

    /// Replace the clock used for segment names
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    fn device_dir(&self) -> PathBuf {
        self.device.device_dir()
    }

    /// Run cycles until a fatal persistence error
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(
            "Recording {} from {} into {}",
            self.device.name,
            self.device.ws_host,
            self.device_dir().display()
        );
        loop {
            self.cycle().await?;
        }
    }

    /// One capture attempt and, if it produced data, one sealed segment
    pub async fn cycle(&mut self) -> std::result::Result<CycleOutcome, PersistError> {
        let capture = match self.source.capture().await {
            Ok(capture) if !capture.is_empty() => capture,
            Ok(capture) => {
                self.retry_later(&format!("session ended without data ({:?})", capture.end))
                    .await;
                return Ok(CycleOutcome::Retried);
            }
            Err(e) => {
                self.retry_later(&e.to_string()).await;
                return Ok(CycleOutcome::Retried);
            }
        };

        let segment = Segment::at(&self.device.name, &self.device_dir(), (self.clock)());
        if let Err(e) = segment.ensure_dir().await {
            tracing::error!("Cannot create segment directory: {}", e);
            return Err(e);
        }

        self.persist(&segment, &capture).await;
        self.merge(&segment).await;
        self.retain().await;

        Ok(CycleOutcome::Recorded(segment))
    }

    async fn retry_later(&self, reason: &str) {
        let delay = self.device.reconnect_delay_secs;
        tracing::warn!(
            "{}: capture failed: {}; retrying in {}s",
            self.device.name,
            reason,
            delay
        );
        tokio::time::sleep(Duration::from_secs(delay)).await;
    }

    async fn persist(&self, segment: &Segment, capture: &Capture) {
        let video = segment.video_path();
        let audio = segment.audio_path();

        for (path, data) in [(&video, &capture.video), (&audio, &capture.audio)] {
            if let Err(e) = append_file(path, data).await {
                tracing::warn!("{}: {}", self.device.name, e);
            }
        }

        tracing::info!(
            "{}: recorded {} ({} bytes) + {} ({} bytes)",
            self.device.name,
            video.display(),
            capture.video.len(),
            audio.display(),
            capture.audio.len()
        );
    }

    async fn merge(&self, segment: &Segment) {
        let output = segment.container_path();
        match self
            .merger
            .merge(&segment.video_path(), &segment.audio_path(), &output, self.device.frame_rate)
            .await
        {
            Ok(()) => tracing::info!("{}: merged {}", self.device.name, output.display()),
            Err(e) => tracing::warn!("{}: merge failed: {}", self.device.name, e),
        }
    }

    async fn retain(&self) {
        let dir = self.device_dir();
        let keep = self.device.retained_days;
        match tokio::task::spawn_blocking(move || prune_day_dirs(&dir, keep)).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!("{}: pruned {} day directories", self.device.name, removed),
            Err(e) => tracing::debug!("{}: retention task failed: {}", self.device.name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionError;
    use crate::merge::TranscoderLocator;
    use crate::network::{DemuxStats, SessionEnd};
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replays canned capture results
    struct ScriptedSource {
        results: VecDeque<std::result::Result<Capture, ConnectionError>>,
    }

    #[async_trait]
    impl CaptureSource for ScriptedSource {
        async fn capture(&mut self) -> std::result::Result<Capture, ConnectionError> {
            self.results
                .pop_front()
                .unwrap_or_else(|| Err(ConnectionError::Handshake("script exhausted".into())))
        }
    }

    fn capture(video: &[u8], audio: &[u8]) -> Capture {
        Capture {
            video: Bytes::copy_from_slice(video),
            audio: Bytes::copy_from_slice(audio),
            end: SessionEnd::ThresholdReached,
            stats: DemuxStats::default(),
        }
    }

    fn device(root: &std::path::Path) -> DeviceConfig {
        DeviceConfig {
            name: "cam1".into(),
            ws_host: "gw.example.com:50443".into(),
            param_token: "tok".into(),
            segment_size_mb: 1,
            retained_days: 2,
            reconnect_delay_secs: 5,
            storage_root: root.to_path_buf(),
            frame_rate: 25,
        }
    }

    fn offline_merger() -> ContainerMerger {
        let program = format!("live-recorder-missing-{}", uuid::Uuid::new_v4());
        ContainerMerger::new(Arc::new(TranscoderLocator::with_fallback(
            program,
            None,
            std::env::temp_dir(),
        )))
    }

    /// Clock that advances one day and one second per call
    fn stepping_clock() -> Clock {
        let calls = AtomicUsize::new(0);
        Box::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) as u32;
            NaiveDate::from_ymd_opt(2024, 5, 1 + n)
                .unwrap()
                .and_hms_opt(10, 0, n)
                .unwrap()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempts_sleep_and_create_nothing() {
        let root = tempfile::tempdir().unwrap();
        let source = ScriptedSource {
            results: VecDeque::from(vec![
                Err(ConnectionError::Timeout(15)),
                Ok(capture(&[], &[])),
                Err(ConnectionError::Rejected(403)),
            ]),
        };
        let mut recorder = Recorder::new(device(root.path()), source, offline_merger());

        for _ in 0..3 {
            let started = tokio::time::Instant::now();
            assert_eq!(recorder.cycle().await.unwrap(), CycleOutcome::Retried);
            let waited = started.elapsed();
            assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6), "{:?}", waited);
        }
        assert!(!root.path().join("cam1").exists());
    }

    #[tokio::test]
    async fn test_three_cycles_write_segments_and_prune() {
        let root = tempfile::tempdir().unwrap();
        let source = ScriptedSource {
            results: (0..3)
                .map(|i| Ok(capture(&[0, 0, 0, 1, i], &[0xD5; 160])))
                .collect(),
        };
        let mut recorder =
            Recorder::new(device(root.path()), source, offline_merger()).with_clock(stepping_clock());

        let mut segments = Vec::new();
        for _ in 0..3 {
            match recorder.cycle().await.unwrap() {
                CycleOutcome::Recorded(segment) => segments.push(segment),
                other => panic!("expected a segment, got {:?}", other),
            }
        }

        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.time_file, format!("10000{}", i));
        }

        // Latest segment is intact, and never more than two days remain
        let last = &segments[2];
        assert_eq!(std::fs::read(last.video_path()).unwrap(), vec![0, 0, 0, 1, 2]);
        assert_eq!(std::fs::read(last.audio_path()).unwrap(), vec![0xD5; 160]);
        assert!(!last.container_path().exists());

        let days = std::fs::read_dir(root.path().join("cam1")).unwrap().count();
        assert!(days <= 2, "{} day directories left", days);
        assert!(last.dir().exists());
    }

    #[tokio::test]
    async fn test_one_sided_capture_is_a_segment() {
        let root = tempfile::tempdir().unwrap();
        let source = ScriptedSource {
            results: VecDeque::from(vec![Ok(capture(&[], &[1, 2, 3]))]),
        };
        let mut recorder =
            Recorder::new(device(root.path()), source, offline_merger()).with_clock(stepping_clock());

        let CycleOutcome::Recorded(segment) = recorder.cycle().await.unwrap() else {
            panic!("expected a segment");
        };
        assert_eq!(std::fs::read(segment.audio_path()).unwrap(), vec![1, 2, 3]);
        assert_eq!(std::fs::read(segment.video_path()).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_root_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("cam1"), b"file in the way").unwrap();
        let source = ScriptedSource {
            results: VecDeque::from(vec![Ok(capture(&[0, 0, 1], &[]))]),
        };
        let recorder = Recorder::new(device(root.path()), source, offline_merger());

        let err = recorder.run().await.unwrap_err();
        assert!(matches!(err, crate::Error::Persist(PersistError::CreateDir { .. })));
    }
}
