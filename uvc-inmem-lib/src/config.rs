use crate::channel::{ChannelConfig, Wait};
use crate::constants::*;
use crate::error::UvcError;
use crate::transport::UsbSpeed;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Tunables of the streaming pipeline. Every field has a default, so a
/// config file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    pub video_endpoint: u8,
    pub status_endpoint: u8,
    pub packet_size: u16,
    /// Burst length at SuperSpeed; lower speeds always use 1
    pub super_speed_burst: u8,
    pub buffer_size: usize,
    pub buffer_count: usize,
    /// Sleep of the streaming task while nothing is streaming
    pub idle_interval_ms: u64,
    /// Sleep after a failed streaming session before the next one starts
    pub error_backoff_ms: u64,
    /// Upper bound on waiting for a free buffer; `None` waits forever
    pub acquire_timeout_ms: Option<u64>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            video_endpoint: EP_BULK_VIDEO,
            status_endpoint: EP_CONTROL_STATUS,
            packet_size: EP_BULK_VIDEO_PKT_SIZE,
            super_speed_burst: BULK_BURST_SUPER_SPEED,
            buffer_size: STREAM_BUF_SIZE,
            buffer_count: STREAM_BUF_COUNT,
            idle_interval_ms: STREAM_IDLE_INTERVAL_MS,
            error_backoff_ms: STREAM_IDLE_INTERVAL_MS,
            acquire_timeout_ms: None,
        }
    }
}

impl StreamConfig {
    pub fn from_json_str(json: &str) -> Result<Self, UvcError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, UvcError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), UvcError> {
        if self.video_endpoint & 0x80 == 0 {
            return Err(UvcError::InvalidConfig(format!(
                "video endpoint {:#04x} is not an IN endpoint",
                self.video_endpoint
            )));
        }
        if self.packet_size == 0 {
            return Err(UvcError::InvalidConfig("packet size must be non-zero".to_string()));
        }
        if self.super_speed_burst == 0 || self.super_speed_burst > 16 {
            return Err(UvcError::InvalidConfig(format!(
                "burst length {} outside 1..=16",
                self.super_speed_burst
            )));
        }
        if self.buffer_count == 0 {
            return Err(UvcError::InvalidConfig("buffer count must be non-zero".to_string()));
        }
        if self.buffer_size <= UVC_HEADER_SIZE {
            return Err(UvcError::InvalidConfig(format!(
                "buffer size {} leaves no room after the {} byte header",
                self.buffer_size, UVC_HEADER_SIZE
            )));
        }
        if self.buffer_size > u16::MAX as usize {
            return Err(UvcError::InvalidConfig(format!("buffer size {} above 65535", self.buffer_size)));
        }
        Ok(())
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            buffer_size: self.buffer_size,
            buffer_count: self.buffer_count,
            header_size: UVC_HEADER_SIZE,
        }
    }

    pub fn burst_for(&self, speed: UsbSpeed) -> u8 {
        if speed == UsbSpeed::Super { self.super_speed_burst } else { 1 }
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn acquire_wait(&self) -> Wait {
        self.acquire_timeout_ms.map(Duration::from_millis).into()
    }
}
