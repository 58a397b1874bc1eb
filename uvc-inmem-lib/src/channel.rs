//! Transfer-buffer pool shared between the streaming task (producer) and the
//! endpoint hardware (consumer).
//!
//! ```text
//!   free pool ──acquire()──> producer ──commit(len)──> consumer
//!       ▲                                                 │
//!       └──────────────────release()──────────────────────┘
//! ```
//!
//! A buffer is owned by exactly one side at a time: `acquire` hands out a
//! [`TransferBuffer`] by value and `commit` takes it back by value, so the
//! producer cannot touch a buffer after handing it to the link.

use crate::error::UvcError;
use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, trace};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Capacity of each buffer, header included
    pub buffer_size: usize,
    pub buffer_count: usize,
    /// Bytes reserved at the start of every buffer for the payload header
    pub header_size: usize,
}

/// How long `acquire` may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wait {
    #[default]
    Forever,
    Timeout(Duration),
}

impl From<Option<Duration>> for Wait {
    fn from(timeout: Option<Duration>) -> Self {
        timeout.map_or(Wait::Forever, Wait::Timeout)
    }
}

/// A buffer checked out to the producer.
#[derive(Debug)]
pub struct TransferBuffer {
    data: BytesMut,
    header_size: usize,
}

impl TransferBuffer {
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    /// Bytes available for payload after the header.
    pub fn payload_capacity(&self) -> usize {
        self.data.len() - self.header_size
    }

    pub fn header_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.header_size]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.header_size..]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

/// A committed buffer as the consumer sees it.
#[derive(Debug)]
pub struct CommittedBuffer {
    data: BytesMut,
    length: usize,
}

impl CommittedBuffer {
    /// The committed bytes, header included.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Producer side of the buffer pool.
#[derive(Debug)]
pub struct StreamChannel {
    config: ChannelConfig,
    generation: u64,
    free_rx: Mutex<mpsc::Receiver<BytesMut>>,
    commit_tx: mpsc::Sender<CommittedBuffer>,
    closed: watch::Sender<bool>,
    transferring: AtomicBool,
}

/// Consumer side of the buffer pool, bound to an endpoint.
#[derive(Debug)]
pub struct ChannelConsumer {
    generation: u64,
    commit_rx: mpsc::Receiver<CommittedBuffer>,
    free_tx: mpsc::Sender<BytesMut>,
    closed: watch::Receiver<bool>,
}

impl StreamChannel {
    /// Allocates `buffer_count` buffers of `buffer_size` bytes and returns
    /// both ends of the pool.
    pub fn create(config: ChannelConfig) -> Result<(Self, ChannelConsumer), UvcError> {
        if config.buffer_count == 0 {
            return Err(UvcError::InvalidConfig("buffer count must be non-zero".to_string()));
        }
        if config.header_size >= config.buffer_size {
            return Err(UvcError::InvalidConfig(format!(
                "header of {} bytes leaves no payload in a {} byte buffer",
                config.header_size, config.buffer_size
            )));
        }

        let (free_tx, free_rx) = mpsc::channel(config.buffer_count);
        let (commit_tx, commit_rx) = mpsc::channel(config.buffer_count);
        let (closed, closed_rx) = watch::channel(false);

        for _ in 0..config.buffer_count {
            free_tx
                .try_send(BytesMut::zeroed(config.buffer_size))
                .map_err(|_| UvcError::InvalidConfig("buffer pool overflow".to_string()))?;
        }

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        debug!(
            generation,
            "Created stream channel: {} x {} bytes", config.buffer_count, config.buffer_size
        );

        let channel = Self {
            config,
            generation,
            free_rx: Mutex::new(free_rx),
            commit_tx,
            closed,
            transferring: AtomicBool::new(false),
        };
        let consumer = ChannelConsumer {
            generation,
            commit_rx,
            free_tx,
            closed: closed_rx,
        };
        Ok((channel, consumer))
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Identifies this pool instance; every `create` gets a new one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Starts the transfer. `count` is the number of buffers to move before
    /// the transfer completes on its own; 0 means unlimited.
    pub fn set_transfer(&self, count: usize) -> Result<(), UvcError> {
        if self.is_closed() {
            return Err(UvcError::ChannelClosed);
        }
        if count != 0 {
            return Err(UvcError::InvalidConfig("only infinite transfers are supported".to_string()));
        }
        self.transferring.store(true, Ordering::Release);
        Ok(())
    }

    /// Takes a free buffer, blocking as long as `wait` allows. Destroying the
    /// channel wakes every pending call with [`UvcError::ChannelClosed`].
    pub async fn acquire(&self, wait: Wait) -> Result<TransferBuffer, UvcError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(UvcError::ChannelClosed);
        }

        let take = async {
            let mut free = self.free_rx.lock().await;
            tokio::select! {
                buffer = free.recv() => buffer.ok_or(UvcError::ChannelClosed),
                _ = closed.wait_for(|c| *c) => Err(UvcError::ChannelClosed),
            }
        };

        let data = match wait {
            Wait::Forever => take.await?,
            Wait::Timeout(limit) => tokio::time::timeout(limit, take).await??,
        };
        trace!(generation = self.generation, "Acquired transfer buffer");
        Ok(TransferBuffer {
            data,
            header_size: self.config.header_size,
        })
    }

    /// Hands `length` bytes of `buffer` to the consumer. The buffer belongs
    /// to the channel from here on, whether or not the commit succeeds.
    pub fn commit(&self, buffer: TransferBuffer, length: usize) -> Result<(), UvcError> {
        if self.is_closed() {
            return Err(UvcError::ChannelClosed);
        }
        if !self.transferring.load(Ordering::Acquire) {
            return Err(UvcError::NotTransferring);
        }
        if length > buffer.capacity() {
            return Err(UvcError::CommitTooLarge {
                length,
                capacity: buffer.capacity(),
            });
        }
        self.commit_tx
            .try_send(CommittedBuffer {
                data: buffer.data,
                length,
            })
            .map_err(|_| UvcError::ChannelClosed)
    }

    /// Aborts the transfer and invalidates the pool.
    pub fn destroy(&self) {
        self.transferring.store(false, Ordering::Release);
        self.closed.send_replace(true);
        debug!(generation = self.generation, "Destroyed stream channel");
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.closed.send_replace(true);
    }
}

impl ChannelConsumer {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Next committed buffer, or `None` once the channel is destroyed.
    pub async fn next(&mut self) -> Option<CommittedBuffer> {
        if *self.closed.borrow_and_update() {
            return None;
        }
        tokio::select! {
            buffer = self.commit_rx.recv() => buffer,
            _ = self.closed.wait_for(|c| *c) => None,
        }
    }

    /// Non-blocking variant of [`next`](Self::next).
    pub fn try_next(&mut self) -> Option<CommittedBuffer> {
        if *self.closed.borrow() {
            return None;
        }
        self.commit_rx.try_recv().ok()
    }

    /// Returns a consumed buffer to the free pool.
    pub fn release(&self, buffer: CommittedBuffer) {
        // Fails only once the producer side is gone, when the pool no longer matters
        let _ = self.free_tx.try_send(buffer.data);
    }
}
