use crate::transport::{DescriptorKind, TransportError};
use std::io;
use thiserror::Error;

/// The primary error type for the `uvc-inmem` library.
#[derive(Error, Debug)]
pub enum UvcError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Timed out waiting for a transfer buffer: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Stream channel closed")]
    ChannelClosed,

    #[error("Stream channel has no transfer in progress")]
    NotTransferring,

    #[error("Commit length {length} exceeds buffer capacity {capacity}")]
    CommitTooLarge { length: usize, capacity: usize },

    #[error("Invalid stream configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid frame table: {0}")]
    InvalidFrameTable(String),

    #[error("Insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Invalid payload header: {0}")]
    InvalidHeader(String),

    #[error("Setting {kind} descriptor {index} failed: {source}")]
    Descriptor {
        kind: DescriptorKind,
        index: u8,
        #[source]
        source: TransportError,
    },
}
