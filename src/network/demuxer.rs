//! Gateway session demultiplexer
//!
//! Runs one WebSocket session end to end: parameters, acknowledgements,
//! start command, then binary frames split into a video and an audio buffer
//! until either buffer crosses the segment threshold or the stream ends.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::config::DeviceConfig;
use crate::error::{ConnectionError, FramingError};
use crate::network::connector;
use crate::protocol::{self, Payload, StartCommand};

/// Why a session stopped producing frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// A buffer crossed the segment threshold
    ThresholdReached,
    /// Close frame or end of stream
    StreamClosed,
    /// Read error mid-stream
    ReadFailed(String),
}

/// Per-session frame counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxStats {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub short_frames: u64,
    pub unknown_frames: u64,
    pub misaligned_frames: u64,
    pub empty_frames: u64,
    pub non_binary_messages: u64,
}

impl DemuxStats {
    fn record_drop(&mut self, reason: FramingError) {
        match reason {
            FramingError::TooShort(_) => self.short_frames += 1,
            FramingError::UnknownKind(_) => self.unknown_frames += 1,
            FramingError::PayloadOffsetOutOfRange { .. } | FramingError::MissingStartCode => {
                self.misaligned_frames += 1
            }
            FramingError::EmptyPayload => self.empty_frames += 1,
        }
    }

    /// Frames dropped for any framing reason
    pub fn dropped(&self) -> u64 {
        self.short_frames + self.unknown_frames + self.misaligned_frames + self.empty_frames
    }
}

/// Accumulated output of one session
#[derive(Debug, Clone)]
pub struct Capture {
    pub video: Bytes,
    pub audio: Bytes,
    pub end: SessionEnd,
    pub stats: DemuxStats,
}

impl Capture {
    /// Nothing usable was received
    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }
}

/// Video and audio accumulation for one session
pub struct SegmentBuffers {
    video: BytesMut,
    audio: BytesMut,
    threshold: usize,
    stats: DemuxStats,
}

impl SegmentBuffers {
    pub fn new(threshold: usize) -> Self {
        Self {
            video: BytesMut::new(),
            audio: BytesMut::new(),
            threshold,
            stats: DemuxStats::default(),
        }
    }

    /// Route one binary frame into the matching buffer.
    ///
    /// Dropped frames leave both buffers untouched.
    pub fn push_frame<'f>(&mut self, frame: &'f [u8]) -> Result<Payload<'f>, FramingError> {
        match protocol::extract_payload(frame) {
            Ok(payload) => {
                match payload {
                    Payload::Video(bytes) => {
                        self.stats.video_frames += 1;
                        self.video.extend_from_slice(bytes);
                    }
                    Payload::Audio(bytes) => {
                        self.stats.audio_frames += 1;
                        self.audio.extend_from_slice(bytes);
                    }
                }
                Ok(payload)
            }
            Err(reason) => {
                self.stats.record_drop(reason);
                Err(reason)
            }
        }
    }

    /// Either buffer has crossed the threshold
    pub fn is_full(&self) -> bool {
        self.video.len() > self.threshold || self.audio.len() > self.threshold
    }

    pub fn video_len(&self) -> usize {
        self.video.len()
    }

    pub fn audio_len(&self) -> usize {
        self.audio.len()
    }

    pub fn stats(&self) -> &DemuxStats {
        &self.stats
    }

    pub fn into_capture(self, end: SessionEnd) -> Capture {
        Capture {
            video: self.video.freeze(),
            audio: self.audio.freeze(),
            end,
            stats: self.stats,
        }
    }
}

/// Send parameters, swallow the acknowledgements, start the stream
pub async fn handshake<S>(ws: &mut S, token: &str, start: &StartCommand) -> Result<(), ConnectionError>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    ws.send(Message::Text(protocol::param_message(token)))
        .await
        .map_err(|e| ConnectionError::Send(format!("parameters: {}", e)))?;

    let mut acks = 0;
    while acks < protocol::ACK_COUNT {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                tracing::trace!("Gateway ack: {}", text);
                acks += 1;
            }
            Some(Ok(Message::Binary(_))) => acks += 1,
            Some(Ok(Message::Close(frame))) => {
                return Err(ConnectionError::Control(format!("closed during handshake: {:?}", frame)));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ConnectionError::Control(e.to_string())),
            None => return Err(ConnectionError::Control("stream ended during handshake".into())),
        }
    }

    ws.send(Message::Text(start.to_json()))
        .await
        .map_err(|e| ConnectionError::Send(format!("start command: {}", e)))?;

    Ok(())
}

/// Read binary frames into buffers until the threshold or end of stream
pub async fn demux<S>(ws: &mut S, threshold: usize) -> Capture
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut buffers = SegmentBuffers::new(threshold);

    let end = loop {
        let frame = match ws.next().await {
            Some(Ok(Message::Binary(frame))) => frame,
            Some(Ok(Message::Close(_))) | None => break SessionEnd::StreamClosed,
            Some(Ok(_)) => {
                buffers.stats.non_binary_messages += 1;
                continue;
            }
            Some(Err(e)) => break SessionEnd::ReadFailed(e.to_string()),
        };

        if let Err(reason) = buffers.push_frame(&frame) {
            tracing::trace!("Dropped frame: {}", reason);
        }

        if buffers.is_full() {
            break SessionEnd::ThresholdReached;
        }
    };

    buffers.into_capture(end)
}

/// Full session over an already-upgraded socket
pub async fn run_session<S>(ws: &mut S, token: &str, threshold: usize) -> Result<Capture, ConnectionError>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    handshake(ws, token, &StartCommand::now()).await?;
    Ok(demux(ws, threshold).await)
}

/// Source of capture attempts for the recorder
#[async_trait]
pub trait CaptureSource: Send {
    /// Run one attempt. `Err` means nothing could be captured at all.
    async fn capture(&mut self) -> Result<Capture, ConnectionError>;
}

/// Live gateway session for one device
pub struct StreamDemuxer {
    host: String,
    token: String,
    threshold: usize,
}

impl StreamDemuxer {
    pub fn new(device: &DeviceConfig) -> Self {
        Self {
            host: device.ws_host.clone(),
            token: device.param_token.clone(),
            threshold: device.segment_threshold_bytes(),
        }
    }
}

#[async_trait]
impl CaptureSource for StreamDemuxer {
    async fn capture(&mut self) -> Result<Capture, ConnectionError> {
        let mut ws = connector::dial(&self.host).await?;
        tracing::info!("Connected to {}", self.host);

        let result = run_session(&mut ws, &self.token, self.threshold).await;

        // Best effort; the gateway may already be gone
        let _ = ws.close(None).await;

        if let Ok(capture) = &result {
            tracing::debug!(
                "Session ended ({:?}): {} video / {} audio bytes, {} dropped frames",
                capture.end,
                capture.video.len(),
                capture.audio.len(),
                capture.stats.dropped()
            );
        }
        result
    }
}
