use crate::error::UvcError;
use crate::header::UvcHeader;
use bytes::{Bytes, BytesMut};
use tracing::warn;

/// A frame put back together from its transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFrame {
    pub data: Bytes,
    pub frame_id: bool,
    /// Transfers the frame arrived in
    pub transfers: usize,
}

/// Host-side reassembly of bulk transfers into frames, delimited by the EOF
/// flag and checked against the frame-ID bit.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    current: BytesMut,
    current_fid: Option<bool>,
    transfers: usize,
    last_completed_fid: Option<bool>,
    dropped: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partial frames discarded because the frame ID changed before EOF.
    pub fn dropped_frames(&self) -> usize {
        self.dropped
    }

    /// Frame ID of the last completed frame.
    pub fn last_frame_id(&self) -> Option<bool> {
        self.last_completed_fid
    }

    /// Feeds one transfer. Returns the frame it completes, if any.
    pub fn push(&mut self, transfer: &[u8]) -> Result<Option<AssembledFrame>, UvcError> {
        let (header, header_len) = UvcHeader::parse(transfer)?;
        let fid = header.frame_id();

        if let Some(current) = self.current_fid {
            if current != fid {
                warn!(
                    "Frame ID flipped without EOF, dropping {} partial bytes",
                    self.current.len()
                );
                self.current.clear();
                self.transfers = 0;
                self.dropped += 1;
            }
        }

        self.current_fid = Some(fid);
        self.current.extend_from_slice(&transfer[header_len..]);
        self.transfers += 1;

        if !header.is_end_of_frame() {
            return Ok(None);
        }

        let frame = AssembledFrame {
            data: self.current.split().freeze(),
            frame_id: fid,
            transfers: self.transfers,
        };
        self.current_fid = None;
        self.transfers = 0;
        self.last_completed_fid = Some(fid);
        Ok(Some(frame))
    }
}
