use crate::constants::{UVC_HEADER_DEFAULT_BFH, UVC_HEADER_SIZE};
use crate::error::UvcError;
use modular_bitfield::prelude::*;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// bmHeaderInfo of the UVC payload header, LSB first.
#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    pub frame_id: bool,
    pub end_of_frame: bool,
    pub presentation_time: bool,
    pub source_clock: bool,
    pub payload_specific: bool,
    pub still_image: bool,
    pub error: bool,
    pub end_of_header: bool,
}

/// The 12-byte payload header exactly as it sits at the start of a transfer.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct UvcHeaderRaw {
    pub length: u8,
    pub info: u8,
    pub presentation_time: U32,
    pub source_time_clock: U32,
    pub sof_counter: U16,
}

/// Per-transfer video payload header.
///
/// PTS and SCR are always zero: the flags advertise the fields (as the
/// default `0x8C` info byte does) but this device does not time-stamp
/// stored frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UvcHeader {
    pub info: HeaderInfo,
    pub presentation_time: u32,
    pub source_time_clock: u32,
    pub sof_counter: u16,
}

impl UvcHeader {
    /// Builds the header for one transfer. The caller owns the frame-ID
    /// toggle; nothing here remembers previous frames.
    pub fn build(end_of_frame: bool, frame_id: bool) -> Self {
        let info = HeaderInfo::from_bytes([UVC_HEADER_DEFAULT_BFH])
            .with_frame_id(frame_id)
            .with_end_of_frame(end_of_frame);
        Self {
            info,
            presentation_time: 0,
            source_time_clock: 0,
            sof_counter: 0,
        }
    }

    pub fn is_end_of_frame(&self) -> bool {
        self.info.end_of_frame()
    }

    pub fn frame_id(&self) -> bool {
        self.info.frame_id()
    }

    pub fn to_bytes(&self) -> [u8; UVC_HEADER_SIZE] {
        let raw = UvcHeaderRaw {
            length: UVC_HEADER_SIZE as u8,
            info: self.info.into_bytes()[0],
            presentation_time: U32::new(self.presentation_time),
            source_time_clock: U32::new(self.source_time_clock),
            sof_counter: U16::new(self.sof_counter),
        };
        zerocopy::transmute!(raw)
    }

    /// Writes the header into the first 12 bytes of `dst`.
    pub fn write_to(&self, dst: &mut [u8]) -> Result<(), UvcError> {
        let actual = dst.len();
        let dst = dst.get_mut(..UVC_HEADER_SIZE).ok_or(UvcError::InsufficientData {
            expected: UVC_HEADER_SIZE,
            actual,
        })?;
        dst.copy_from_slice(&self.to_bytes());
        Ok(())
    }

    /// Decodes the header at the start of a received transfer and returns it
    /// with the header length the transfer declared.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), UvcError> {
        let (raw, _) = UvcHeaderRaw::ref_from_prefix(bytes).map_err(|_| UvcError::InsufficientData {
            expected: UVC_HEADER_SIZE,
            actual: bytes.len(),
        })?;
        let length = raw.length as usize;
        // bHeaderLength covers at least itself and bmHeaderInfo
        if length < 2 || length > bytes.len() {
            return Err(UvcError::InvalidHeader(format!(
                "header length {} with {} bytes in transfer",
                length,
                bytes.len()
            )));
        }
        let header = Self {
            info: HeaderInfo::from_bytes([raw.info]),
            presentation_time: raw.presentation_time.get(),
            source_time_clock: raw.source_time_clock.get(),
            sof_counter: raw.sof_counter.get(),
        };
        Ok((header, length))
    }
}
