//! Demux frame layout and payload location
//!
//! Every binary message from the gateway carries a frame kind at byte 1.
//! Video frames embed a percent-encoded JSON control blob ahead of the HEVC
//! payload; audio frames use a fixed 12 byte header with an optional trailer.
//! None of this is documented upstream, so the offsets below are empirical and
//! start-code realignment is what actually keeps the video stream well formed.

use crate::error::FramingError;

/// Frames shorter than this are discarded unread
pub const MIN_FRAME_LEN: usize = 16;

/// Offset of the frame kind discriminator
pub const KIND_OFFSET: usize = 1;

/// Frame kind for Annex-B HEVC video
pub const KIND_VIDEO: u8 = 0x63;

/// Frame kind for G.711 A-law audio
pub const KIND_AUDIO: u8 = 0x62;

/// Percent-encoded `}` closing the JSON blob in video frames
pub const JSON_CLOSE_MARKER: &[u8] = b"%7D";

/// Length/alignment field that follows the JSON blob.
/// Observed as 8 bytes on live traffic; realignment covers drift.
pub const VIDEO_JSON_TRAILER_SKIP: usize = 8;

/// type/flag (2) + subtype (2) + sequence/timestamp (4) + reserved (4)
pub const AUDIO_HEADER_LEN: usize = 12;

/// Optional audio trailer
pub const AUDIO_TRAILER: [u8; 4] = [0x00, 0x00, 0x01, 0x4B];

const START_CODE_4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
const START_CODE_3: [u8; 3] = [0x00, 0x00, 0x01];

/// Frame kinds the demuxer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Video,
    Audio,
}

impl FrameKind {
    /// Classify a frame by its discriminator byte
    pub fn of(frame: &[u8]) -> Result<Self, FramingError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(FramingError::TooShort(frame.len()));
        }
        match frame[KIND_OFFSET] {
            KIND_VIDEO => Ok(FrameKind::Video),
            KIND_AUDIO => Ok(FrameKind::Audio),
            other => Err(FramingError::UnknownKind(other)),
        }
    }
}

/// Payload borrowed from a demux frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Video bytes starting at a codec start code
    Video(&'a [u8]),
    /// Raw A-law samples
    Audio(&'a [u8]),
}

impl<'a> Payload<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        match *self {
            Payload::Video(b) | Payload::Audio(b) => b,
        }
    }
}

/// Find where video payload begins after the embedded JSON blob.
///
/// Looks for `%7D`, falling back to the first bare `}`. The marker length
/// added is always that of `%7D`, which is what the gateway's own player does.
/// Returns 0 when neither marker is present; callers must range-check.
pub fn locate_video_payload_start(frame: &[u8]) -> usize {
    let idx = find_subslice(frame, JSON_CLOSE_MARKER)
        .or_else(|| frame.iter().position(|&b| b == b'}'));

    match idx {
        Some(i) => i + JSON_CLOSE_MARKER.len() + VIDEO_JSON_TRAILER_SKIP,
        None => 0,
    }
}

/// Lowest index where `00 00 00 01` or `00 00 01` begins
pub fn locate_codec_start_code(payload: &[u8]) -> Option<usize> {
    (0..payload.len()).find(|&i| {
        payload[i..].starts_with(&START_CODE_3) || payload[i..].starts_with(&START_CODE_4)
    })
}

/// Audio samples between the 12 byte header and the optional trailer
pub fn audio_payload(frame: &[u8]) -> &[u8] {
    if frame.len() < AUDIO_HEADER_LEN {
        return &[];
    }
    if frame.len() >= AUDIO_HEADER_LEN + AUDIO_TRAILER.len() && frame.ends_with(&AUDIO_TRAILER) {
        &frame[AUDIO_HEADER_LEN..frame.len() - AUDIO_TRAILER.len()]
    } else {
        &frame[AUDIO_HEADER_LEN..]
    }
}

/// Video bytes realigned to the first start code after the JSON blob
pub fn video_payload(frame: &[u8]) -> Result<&[u8], FramingError> {
    let offset = locate_video_payload_start(frame);
    if offset == 0 || offset >= frame.len() {
        return Err(FramingError::PayloadOffsetOutOfRange {
            offset,
            len: frame.len(),
        });
    }

    let payload = &frame[offset..];
    let align = locate_codec_start_code(payload).ok_or(FramingError::MissingStartCode)?;
    Ok(&payload[align..])
}

/// Classify a frame and extract the bytes worth keeping
pub fn extract_payload(frame: &[u8]) -> Result<Payload<'_>, FramingError> {
    let payload = match FrameKind::of(frame)? {
        FrameKind::Video => Payload::Video(video_payload(frame)?),
        FrameKind::Audio => Payload::Audio(audio_payload(frame)),
    };

    if payload.bytes().is_empty() {
        return Err(FramingError::EmptyPayload);
    }
    Ok(payload)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
