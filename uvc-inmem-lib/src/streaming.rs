//! The segmentation engine: slices stored frames into transfer buffers, each
//! one starting with a UVC payload header.
//!
//! A frame of `L` bytes streamed through buffers of capacity `C` with a
//! header of `H` bytes takes `L / (C - H) + 1` buffers. Every buffer but the
//! last is committed full; the last carries the EOF flag and is always short,
//! header-only when `L` is a multiple of `C - H`. The frame-ID bit flips after
//! each EOF buffer.

use crate::channel::{StreamChannel, TransferBuffer};
use crate::config::StreamConfig;
use crate::error::UvcError;
use crate::frame_table::FrameTable;
use crate::header::UvcHeader;
use crate::lifecycle::ChannelSlot;
use crate::state::{DeviceState, StreamStats};
use crate::transport::{LinkPowerMode, UsbSpeed, UsbTransport};
use std::sync::Arc;
use tracing::{debug, error, info, trace};

/// Position of the segmentation loop in the frame table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamCursor {
    pub frame_index: usize,
    /// Offset of the current frame in the frame blob
    pub frame_start: usize,
    /// Bytes of the current frame already sent
    pub frame_offset: usize,
}

/// What one filled buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub frame_index: usize,
    pub payload_len: usize,
    /// Header plus payload
    pub commit_len: usize,
    pub end_of_frame: bool,
    pub frame_id: bool,
}

/// Cursor plus frame-ID toggle, the whole state of the segmentation.
#[derive(Debug, Default)]
pub struct Segmenter {
    cursor: StreamCursor,
    frame_id: bool,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to the first frame with the frame-ID bit clear.
    pub fn reset(&mut self) {
        self.cursor = StreamCursor::default();
        self.frame_id = false;
    }

    pub fn cursor(&self) -> StreamCursor {
        self.cursor
    }

    pub fn frame_id(&self) -> bool {
        self.frame_id
    }

    /// Writes the header and the next slice of the current frame into
    /// `buffer`. The cursor does not move until [`advance`](Self::advance).
    /// Fails when the buffer's header area cannot hold a payload header.
    pub fn fill(&self, frames: &FrameTable, buffer: &mut TransferBuffer) -> Result<Segment, UvcError> {
        let index = self.cursor.frame_index;
        let payload_capacity = buffer.payload_capacity();
        let remaining = frames.frame_len(index).saturating_sub(self.cursor.frame_offset);

        // A remainder that exactly fills a buffer still goes out as a
        // mid-frame buffer, leaving a header-only EOF buffer behind it
        let end_of_frame = remaining < payload_capacity;
        let wanted = if end_of_frame { remaining } else { payload_capacity };

        UvcHeader::build(end_of_frame, self.frame_id).write_to(buffer.header_mut())?;
        let src = frames.slice(index, self.cursor.frame_offset, wanted);
        buffer.payload_mut()[..src.len()].copy_from_slice(src);

        Ok(Segment {
            frame_index: index,
            payload_len: src.len(),
            commit_len: buffer.header_size() + src.len(),
            end_of_frame,
            frame_id: self.frame_id,
        })
    }

    /// Moves past a committed segment. After the EOF buffer of a frame the
    /// cursor wraps to the next frame and the frame-ID bit flips.
    pub fn advance(&mut self, frames: &FrameTable, segment: &Segment) {
        if segment.end_of_frame {
            let next = frames.next_index(segment.frame_index);
            self.cursor = StreamCursor {
                frame_index: next,
                frame_start: frames.entry(next).map_or(0, |e| e.start_offset as usize),
                frame_offset: 0,
            };
            self.frame_id = !self.frame_id;
        } else {
            self.cursor.frame_offset += segment.payload_len;
        }
    }
}

/// Why a streaming session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Nothing to stream
    Idle,
    /// Streaming flag dropped or the pipeline was torn down under us
    Stopped,
    /// A newer pipeline replaced the one this session was bound to
    Replaced,
    Failed(UvcError),
}

/// The streaming task: runs sessions while the device streams, idles
/// otherwise.
pub struct StreamingLoop {
    transport: Arc<dyn UsbTransport>,
    state: Arc<DeviceState>,
    slot: Arc<ChannelSlot>,
    frames: Arc<FrameTable>,
    stats: Arc<StreamStats>,
    config: StreamConfig,
}

impl StreamingLoop {
    pub fn new(
        transport: Arc<dyn UsbTransport>,
        state: Arc<DeviceState>,
        slot: Arc<ChannelSlot>,
        frames: Arc<FrameTable>,
        stats: Arc<StreamStats>,
        config: StreamConfig,
    ) -> Self {
        Self {
            transport,
            state,
            slot,
            frames,
            stats,
            config,
        }
    }

    /// Runs forever. Every session starts from the first frame; a failed
    /// session is not resumed mid-frame.
    pub async fn run(self) {
        let mut segmenter = Segmenter::new();
        loop {
            segmenter.reset();
            let pause = match self.run_session(&mut segmenter).await {
                SessionEnd::Idle | SessionEnd::Stopped | SessionEnd::Replaced => self.config.idle_interval(),
                SessionEnd::Failed(e) => {
                    self.stats.record_error();
                    error!("UVC video streamer error: {}", e);
                    self.config.error_backoff()
                }
            };
            tokio::time::sleep(pause).await;
        }
    }

    async fn run_session(&self, segmenter: &mut Segmenter) -> SessionEnd {
        if !self.state.is_streaming() {
            return SessionEnd::Idle;
        }
        let Some(channel) = self.slot.current() else {
            return SessionEnd::Idle;
        };

        self.stats.record_session();
        info!(generation = channel.generation(), "Streaming session started");

        loop {
            if !self.state.is_streaming() {
                return SessionEnd::Stopped;
            }
            match self.slot.current() {
                Some(current) if current.generation() == channel.generation() => {}
                _ => return SessionEnd::Replaced,
            }

            if let Err(e) = self.stream_buffer(&channel, segmenter).await {
                // Buffer calls fail on a destroyed channel as a matter of course
                if channel.is_closed() {
                    debug!(generation = channel.generation(), "Session ended by teardown: {}", e);
                    return SessionEnd::Stopped;
                }
                return SessionEnd::Failed(e);
            }
        }
    }

    async fn stream_buffer(&self, channel: &StreamChannel, segmenter: &mut Segmenter) -> Result<(), UvcError> {
        let mut buffer = channel.acquire(self.config.acquire_wait()).await?;
        let segment = segmenter.fill(&self.frames, &mut buffer)?;
        channel.commit(buffer, segment.commit_len)?;

        self.stats.record_commit(segment.commit_len, segment.end_of_frame);
        trace!(
            frame = segment.frame_index,
            len = segment.commit_len,
            eof = segment.end_of_frame,
            fid = segment.frame_id,
            "Committed buffer"
        );

        self.wake_link();
        segmenter.advance(&self.frames, &segment);
        Ok(())
    }

    /// At SuperSpeed, pulls the link out of U1/U2 so queued data moves
    /// without waiting for the host to wake it.
    fn wake_link(&self) {
        if self.transport.speed() != UsbSpeed::Super {
            return;
        }
        match self.transport.link_power_state() {
            Ok(mode) if mode.is_low_power() => match self.transport.set_link_power_state(LinkPowerMode::U0) {
                Ok(()) => {
                    self.stats.record_wakeup();
                    trace!("Link moved from {} to U0", mode);
                }
                Err(e) => debug!("Link wake-up from {} failed: {}", mode, e),
            },
            Ok(_) => {}
            Err(e) => trace!("Link power state unavailable: {}", e),
        }
    }
}

/// Buffers a frame of `frame_len` bytes takes with the given geometry.
pub fn buffers_per_frame(frame_len: usize, buffer_size: usize, header_size: usize) -> usize {
    let payload = buffer_size.saturating_sub(header_size).max(1);
    frame_len / payload + 1
}
