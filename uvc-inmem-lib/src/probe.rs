use crate::constants::PROBE_CONTROL_SIZE;
use crate::error::UvcError;
use std::fmt;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// UVC 1.1 video probe and commit control block (34 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ProbeControl {
    pub hint: U16,
    pub format_index: u8,
    pub frame_index: u8,
    /// Frame interval in 100 ns units
    pub frame_interval: U32,
    pub key_frame_rate: U16,
    pub p_frame_rate: U16,
    pub comp_quality: U16,
    pub comp_window_size: U16,
    pub delay: U16,
    pub max_video_frame_size: U32,
    pub max_payload_transfer_size: U32,
    pub clock_frequency: U32,
    pub framing_info: u8,
    pub preferred_version: u8,
    pub min_version: u8,
    pub max_version: u8,
}

/// The only setting this device offers: MJPEG format 1, frame 1,
/// 30 fps, up to 640x480x2 bytes per frame, one 4 KiB buffer per payload
/// transfer.
pub const DEFAULT_PROBE_CONTROL: ProbeControl = ProbeControl {
    hint: U16::new(0),
    format_index: 1,
    frame_index: 1,
    frame_interval: U32::new(333_333),
    key_frame_rate: U16::new(0),
    p_frame_rate: U16::new(0),
    comp_quality: U16::new(0),
    comp_window_size: U16::new(0),
    delay: U16::new(0),
    max_video_frame_size: U32::new(640 * 480 * 2),
    max_payload_transfer_size: U32::new(4096),
    clock_frequency: U32::new(0),
    framing_info: 0,
    preferred_version: 0,
    min_version: 0,
    max_version: 0,
};

impl ProbeControl {
    pub fn to_bytes(&self) -> [u8; PROBE_CONTROL_SIZE] {
        zerocopy::transmute!(*self)
    }

    /// Parses a received block. Short blocks are rejected; trailing bytes
    /// (UVC 1.5 hosts send 48) are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, UvcError> {
        let (control, _) = ProbeControl::read_from_prefix(bytes).map_err(|_| UvcError::InsufficientData {
            expected: PROBE_CONTROL_SIZE,
            actual: bytes.len(),
        })?;
        Ok(control)
    }

    pub fn frames_per_second(&self) -> f64 {
        match self.frame_interval.get() {
            0 => 0.0,
            interval => 10_000_000.0 / interval as f64,
        }
    }
}

impl fmt::Display for ProbeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "format {} frame {} interval {} ({:.2} fps) max frame {} B max payload {} B",
            self.format_index,
            self.frame_index,
            self.frame_interval.get(),
            self.frames_per_second(),
            self.max_video_frame_size.get(),
            self.max_payload_transfer_size.get()
        )
    }
}
