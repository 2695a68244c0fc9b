//! Network subsystem for gateway sessions

pub mod connector;
pub mod demuxer;

pub use connector::{dial, GatewayStream};
pub use demuxer::{Capture, CaptureSource, DemuxStats, SegmentBuffers, SessionEnd, StreamDemuxer};
