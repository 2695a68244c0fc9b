//! Segment persistence, retention and the per-device loop

pub mod recorder;
pub mod retention;
pub mod segment;

pub use recorder::{local_clock, Clock, CycleOutcome, Recorder};
pub use retention::prune_day_dirs;
pub use segment::Segment;
