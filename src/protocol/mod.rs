//! h5player gateway protocol
//!
//! Control messages exchanged during the session handshake, and the binary
//! frame layout (see [`frame`]).

pub mod frame;

pub use frame::{extract_payload, locate_codec_start_code, locate_video_payload_start, FrameKind, Payload};

use serde::Serialize;

/// Path of the live endpoint on the gateway
pub const LIVE_PATH: &str = "/h5player/live";

/// Number of acknowledgement messages the gateway sends after the parameters
pub const ACK_COUNT: usize = 2;

/// Command code that starts the live stream
pub const CMD_START_STREAM: u8 = 3;

/// Text message carrying the opaque stream parameters
pub fn param_message(token: &str) -> String {
    format!("_paramStr_={}", token)
}

/// Start command sent once the acknowledgements are in.
///
/// Serialized as `{"time":<unix seconds>,"cmd":3}`; field order is kept.
#[derive(Debug, Clone, Serialize)]
pub struct StartCommand {
    pub time: i64,
    pub cmd: u8,
}

impl StartCommand {
    pub fn at(unix_seconds: i64) -> Self {
        Self {
            time: unix_seconds,
            cmd: CMD_START_STREAM,
        }
    }

    pub fn now() -> Self {
        Self::at(chrono::Utc::now().timestamp())
    }

    pub fn to_json(&self) -> String {
        // Two plain integer fields cannot fail to serialize
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!("{{\"time\":{},\"cmd\":{}}}", self.time, self.cmd)
        })
    }
}

/// Split `host[:port]` into the bare host used for SNI and Origin
pub fn host_without_port(host: &str) -> &str {
    match host.find(':') {
        Some(i) if i > 0 => &host[..i],
        _ => host,
    }
}

/// `wss://{host}/h5player/live`
pub fn live_url(host: &str) -> String {
    format!("wss://{}{}", host, LIVE_PATH)
}
