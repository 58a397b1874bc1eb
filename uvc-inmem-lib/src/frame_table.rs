use crate::error::UvcError;
use bytes::{Bytes, BytesMut};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Smallest table the stream accepts.
pub const MIN_FRAMES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEntry {
    pub start_offset: u32,
    pub length: u32,
}

/// Read-only catalogue of the stored video frames.
///
/// Frames live back to back in one blob, in table order.
#[derive(Debug, Clone)]
pub struct FrameTable {
    data: Bytes,
    entries: Vec<FrameEntry>,
}

impl FrameTable {
    /// Builds the table from a concatenated frame blob and its length table.
    pub fn from_lengths(data: Bytes, lengths: &[u32]) -> Result<Self, UvcError> {
        if lengths.len() < MIN_FRAMES {
            return Err(UvcError::InvalidFrameTable(format!(
                "{} frame(s), at least {} required",
                lengths.len(),
                MIN_FRAMES
            )));
        }

        let mut entries = Vec::with_capacity(lengths.len());
        let mut offset: u64 = 0;
        for &length in lengths {
            entries.push(FrameEntry {
                start_offset: u32::try_from(offset)
                    .map_err(|_| UvcError::InvalidFrameTable(format!("offset {} overflows u32", offset)))?,
                length,
            });
            offset += length as u64;
        }

        if offset > data.len() as u64 {
            return Err(UvcError::InvalidFrameTable(format!(
                "length table covers {} bytes but blob holds {}",
                offset,
                data.len()
            )));
        }

        Ok(Self { data, entries })
    }

    /// Concatenates separately stored frames.
    pub fn from_frames<I, B>(frames: I) -> Result<Self, UvcError>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut blob = BytesMut::new();
        let mut lengths = Vec::new();
        for frame in frames {
            let frame = frame.as_ref();
            let length = u32::try_from(frame.len())
                .map_err(|_| UvcError::InvalidFrameTable(format!("frame of {} bytes", frame.len())))?;
            lengths.push(length);
            blob.extend_from_slice(frame);
        }
        Self::from_lengths(blob.freeze(), &lengths)
    }

    /// Loads every regular file in `dir` as one frame, in file-name order.
    pub fn from_dir(dir: &Path) -> Result<Self, UvcError> {
        let mut paths = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        paths.retain(|p| p.is_file());
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            let frame = fs::read(path)?;
            debug!("Loaded frame {} ({} bytes)", path.display(), frame.len());
            frames.push(frame);
        }
        Self::from_frames(frames)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> Option<FrameEntry> {
        self.entries.get(index).copied()
    }

    pub fn entries(&self) -> &[FrameEntry] {
        &self.entries
    }

    /// Frame length, or 0 for an index outside the table.
    pub fn frame_len(&self, index: usize) -> usize {
        self.entries.get(index).map_or(0, |e| e.length as usize)
    }

    /// `len` bytes of frame `index` starting at `offset`, clamped to the
    /// frame's end.
    pub fn slice(&self, index: usize, offset: usize, len: usize) -> &[u8] {
        let Some(entry) = self.entries.get(index) else {
            return &[];
        };
        let frame_end = entry.start_offset as usize + entry.length as usize;
        let start = (entry.start_offset as usize + offset).min(frame_end);
        let end = start.saturating_add(len).min(frame_end);
        &self.data[start..end]
    }

    pub fn frame(&self, index: usize) -> &[u8] {
        self.slice(index, 0, self.frame_len(index))
    }

    /// Index following `index`, wrapping to 0 after the last frame.
    pub fn next_index(&self, index: usize) -> usize {
        if index + 1 >= self.entries.len() { 0 } else { index + 1 }
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.length as usize).sum()
    }
}
