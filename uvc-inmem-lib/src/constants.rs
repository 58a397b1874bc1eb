// Protocol and application constants for the in-memory UVC streamer

/// Bulk IN endpoint carrying the video stream (EP 1 IN)
pub const EP_BULK_VIDEO: u8 = 0x81;

/// Interrupt IN endpoint for the video-control status pipe (EP 2 IN)
pub const EP_CONTROL_STATUS: u8 = 0x82;

/// Max packet size of the video bulk endpoint (1024 bytes)
pub const EP_BULK_VIDEO_PKT_SIZE: u16 = 0x400;

/// Max packet size of the status interrupt endpoint
pub const EP_CONTROL_STATUS_PKT_SIZE: u16 = 64;

/// Burst length used on the bulk endpoint at SuperSpeed only
pub const BULK_BURST_SUPER_SPEED: u8 = 8;

/// Size of one transfer buffer, header included
pub const STREAM_BUF_SIZE: usize = 4096;

/// Number of transfer buffers in the stream pool
pub const STREAM_BUF_COUNT: usize = 10;

/// Size of the UVC payload header prepended to every transfer (12 bytes)
pub const UVC_HEADER_SIZE: usize = 12;

/// Default bmHeaderInfo: EOH | SCR | PTS, FID and EOF clear
pub const UVC_HEADER_DEFAULT_BFH: u8 = 0x8C;

/// Size of the UVC 1.1 probe/commit control block
pub const PROBE_CONTROL_SIZE: usize = 34;

/// Probe/commit receive buffer size, rounded up to a 32-byte multiple
pub const PROBE_CONTROL_SIZE_ALIGNED: usize = 64;

/// Video Control interface number
pub const UVC_INTERFACE_VC: u8 = 0;

/// Video Streaming interface number
pub const UVC_INTERFACE_VS: u8 = 1;

/// VS_PROBE_CONTROL selector as carried in wValue
pub const VS_PROBE_CONTROL: u16 = 0x0100;

/// VS_COMMIT_CONTROL selector as carried in wValue
pub const VS_COMMIT_CONTROL: u16 = 0x0200;

/// VC_REQUEST_ERROR_CODE_CONTROL selector as carried in wValue
pub const VC_REQUEST_ERROR_CODE_CONTROL: u16 = 0x0200;

/// Request error code reported for every VC error-code query: invalid control
pub const REQUEST_STATUS_INVALID_CONTROL: u8 = 0x06;

/// Idle poll interval of the streaming task, in milliseconds
pub const STREAM_IDLE_INTERVAL_MS: u64 = 100;
