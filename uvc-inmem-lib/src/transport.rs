//! # Transport layer contract
//!
//! The device logic never touches USB hardware directly. Everything it needs
//! from the USB stack and the link goes through [`UsbTransport`], and
//! everything the stack delivers back (setup packets, link events, LPM
//! queries) arrives through [`UsbEventHandler`].
//!
//! The handler methods run in the control-event context: they are invoked
//! synchronously by the stack, never concurrently with themselves, and may
//! preempt the streaming task at any point.

use crate::channel::ChannelConsumer;
use crate::setup::SetupPacket;
use num_enum::{FromPrimitive, IntoPrimitive};
use std::sync::Weak;
use strum_macros::Display;
use thiserror::Error;

/// Status codes reported by the USB stack.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("Bad argument")]
    BadArgument,
    #[error("Endpoint or channel not configured")]
    NotConfigured,
    #[error("Operation timed out")]
    Timeout,
    #[error("Transfer aborted")]
    Aborted,
    #[error("Not supported at the current link speed")]
    NotSupported,
    #[error("Stack failure, code {0}")]
    Failure(u32),
}

/// Negotiated bus speed of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UsbSpeed {
    #[strum(to_string = "not connected")]
    NotConnected,
    #[strum(to_string = "full speed")]
    Full,
    #[strum(to_string = "high speed")]
    High,
    #[strum(to_string = "super speed")]
    Super,
}

/// USB 3 link power sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum LinkPowerMode {
    U0 = 0,
    U1 = 1,
    U2 = 2,
    U3 = 3,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl LinkPowerMode {
    /// U1 and U2 are the low-power states the link exits on its own once
    /// traffic is pending; the device nudges it back to U0 to keep latency down.
    pub fn is_low_power(&self) -> bool {
        matches!(self, LinkPowerMode::U1 | LinkPowerMode::U2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EndpointType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// Endpoint configuration handed to the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    pub enable: bool,
    pub ep_type: EndpointType,
    pub packet_size: u16,
    pub burst_len: u8,
    pub iso_packets: u8,
    pub streams: u8,
}

impl EndpointConfig {
    pub fn bulk(packet_size: u16, burst_len: u8) -> Self {
        Self {
            enable: true,
            ep_type: EndpointType::Bulk,
            packet_size,
            burst_len,
            iso_packets: 0,
            streams: 0,
        }
    }

    pub fn interrupt(packet_size: u16) -> Self {
        Self {
            enable: true,
            ep_type: EndpointType::Interrupt,
            packet_size,
            burst_len: 1,
            iso_packets: 1,
            streams: 0,
        }
    }

    /// An all-zero configuration with `enable` cleared.
    pub fn disabled() -> Self {
        Self {
            enable: false,
            ep_type: EndpointType::Control,
            packet_size: 0,
            burst_len: 0,
            iso_packets: 0,
            streams: 0,
        }
    }
}

/// Descriptor slots the stack accepts registrations for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DescriptorKind {
    #[strum(to_string = "SS device")]
    SuperSpeedDevice,
    #[strum(to_string = "HS device")]
    HighSpeedDevice,
    #[strum(to_string = "SS BOS")]
    SuperSpeedBos,
    #[strum(to_string = "device qualifier")]
    DeviceQualifier,
    #[strum(to_string = "SS config")]
    SuperSpeedConfig,
    #[strum(to_string = "HS config")]
    HighSpeedConfig,
    #[strum(to_string = "FS config")]
    FullSpeedConfig,
    #[strum(to_string = "string")]
    String,
}

/// Link and configuration events reported by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// SET_CONFIGURATION with the selected configuration value.
    SetConfiguration(u16),
    /// SET_INTERFACE with the event data (alternate setting and interface).
    SetInterface(u16),
    Reset,
    Disconnect,
    Connect,
    Suspend,
    Resume,
}

/// Callbacks the stack invokes in the control-event context.
pub trait UsbEventHandler: Send + Sync {
    /// Returns whether the request was handled. Unhandled requests get the
    /// stack's default action, a stall.
    fn on_setup_packet(&self, setup: SetupPacket) -> bool;

    fn on_link_event(&self, event: LinkEvent);

    /// Asked when the host requests a U1/U2 transition. Returning `true`
    /// keeps the device in the low-power state.
    fn on_low_power_request(&self, mode: LinkPowerMode) -> bool;
}

/// Calls the device logic makes into the USB stack.
pub trait UsbTransport: Send + Sync {
    /// Starts the USB block. Called once before anything else.
    fn start(&self) -> Result<(), TransportError>;

    fn register_handler(&self, handler: Weak<dyn UsbEventHandler>);

    fn set_descriptor(&self, kind: DescriptorKind, index: u8, descriptor: &'static [u8]) -> Result<(), TransportError>;

    /// Connects the pull-ups, optionally advertising SuperSpeed.
    fn connect(&self, super_speed: bool) -> Result<(), TransportError>;

    fn speed(&self) -> UsbSpeed;

    fn set_endpoint_config(&self, endpoint: u8, config: &EndpointConfig) -> Result<(), TransportError>;

    /// Drops any data queued on the endpoint.
    fn flush_endpoint(&self, endpoint: u8);

    /// Hands the consumer side of a stream channel to the endpoint hardware.
    fn bind_stream(&self, endpoint: u8, consumer: ChannelConsumer) -> Result<(), TransportError>;

    /// Completes a control request with no data stage.
    fn ack_setup(&self);

    /// Stalls EP0, rejecting the current control request.
    fn stall_setup(&self);

    fn send_ep0_data(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Reads the OUT data stage of the current control request into `buf`,
    /// returning the number of bytes received.
    fn receive_ep0_data(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Stops the device from accepting U1/U2 entry requests until
    /// [`enable_lpm`](Self::enable_lpm).
    fn disable_lpm(&self);

    fn enable_lpm(&self);

    fn link_power_state(&self) -> Result<LinkPowerMode, TransportError>;

    fn set_link_power_state(&self, mode: LinkPowerMode) -> Result<(), TransportError>;
}
