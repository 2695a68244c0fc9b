//! # Live Recorder
//!
//! Always-on recorder for h5player camera gateways.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     Device worker (one per camera)                   │
//! │                                                                      │
//! │   ┌──────────────────────────┐        wss://{host}/h5player/live     │
//! │   │  StreamDemuxer           │◄──────────────────────────────────    │
//! │   │  (network::demuxer)      │   _paramStr_ / 2 acks / cmd 3         │
//! │   │                          │                                       │
//! │   │  frame[1] == 0x63 ──► video BytesMut (start-code aligned)        │
//! │   │  frame[1] == 0x62 ──► audio BytesMut (12 byte header stripped)   │
//! │   └────────────┬─────────────┘                                       │
//! │                │ Capture (threshold reached / stream ended)          │
//! │                ▼                                                     │
//! │   ┌──────────────────────────┐                                       │
//! │   │  Recorder                │  {root}/{device}/{YYYYMMDD}/          │
//! │   │  (recording::recorder)   │        {HHMMSS}.hevc + .alaw          │
//! │   └────────────┬─────────────┘                                       │
//! │                ▼                                                     │
//! │   ┌──────────────────────────┐   ┌──────────────────────────────┐    │
//! │   │  ContainerMerger         │──►│ ffmpeg (PATH or bundled)     │    │
//! │   │  (merge::merger)         │   │   -> {HHMMSS}.mp4            │    │
//! │   └────────────┬─────────────┘   └──────────────────────────────┘    │
//! │                ▼                                                     │
//! │   ┌──────────────────────────┐                                       │
//! │   │  prune_day_dirs          │  keep newest `retained_days` days     │
//! │   │  (recording::retention)  │                                       │
//! │   └──────────────────────────┘                                       │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failed attempts sleep for the reconnect delay and dial again; only a
//! failure to create a day directory stops a worker.

pub mod config;
pub mod error;
pub mod merge;
pub mod network;
pub mod protocol;
pub mod recording;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Name used for config and data directories
    pub const APP_NAME: &str = "live-recorder";

    /// Config file name inside the config directory
    pub const CONFIG_FILE_NAME: &str = "recorder.toml";

    /// Bytes in one segment-size megabyte
    pub const BYTES_PER_MB: usize = 1024 * 1024;

    /// Default segment size in megabytes
    pub const DEFAULT_SEGMENT_SIZE_MB: u64 = 10;

    /// Default number of day directories kept per device
    pub const DEFAULT_RETAINED_DAYS: usize = 7;

    /// Default delay between failed attempts
    pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 10;

    /// Default frame rate hint for the merge
    pub const DEFAULT_FRAME_RATE: u32 = 25;

    /// WebSocket handshake timeout
    pub const HANDSHAKE_TIMEOUT_SECS: u64 = 15;
}
