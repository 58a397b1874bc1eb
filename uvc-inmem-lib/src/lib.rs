pub mod channel;
pub mod config;
pub mod constants;
pub mod control;
pub mod depacketize;
pub mod device;
pub mod error;
pub mod frame_table;
pub mod header;
pub mod lifecycle;
pub mod probe;
pub mod setup;
pub mod sim;
pub mod state;
pub mod streaming;
pub mod transport;

#[cfg(test)]
mod tests;

// Re-export the main types for easy access
pub use channel::{ChannelConsumer, CommittedBuffer, StreamChannel, TransferBuffer, Wait};
pub use config::StreamConfig;
pub use depacketize::{AssembledFrame, FrameAssembler};
pub use device::{DescriptorSet, UvcDevice};
pub use error::UvcError;
pub use frame_table::FrameTable;
pub use header::UvcHeader;
pub use probe::{DEFAULT_PROBE_CONTROL, ProbeControl};
pub use setup::SetupPacket;
pub use sim::SimTransport;
pub use state::{DeviceState, LifecycleState, StreamStatsSnapshot};
pub use streaming::{Segment, Segmenter, StreamCursor};
pub use transport::{LinkEvent, LinkPowerMode, UsbEventHandler, UsbSpeed, UsbTransport};

use std::sync::{Mutex, MutexGuard};

/// Locks a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
