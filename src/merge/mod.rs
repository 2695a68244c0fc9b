//! Container packaging via an external transcoder

pub mod locator;
pub mod merger;

pub use locator::TranscoderLocator;
pub use merger::{merge_args, ContainerMerger};
