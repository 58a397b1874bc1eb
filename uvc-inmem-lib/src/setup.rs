use crate::error::UvcError;
use modular_bitfield::prelude::*;
use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;
use strum_macros::Display;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Size of a USB setup packet on the wire
pub const SETUP_PACKET_SIZE: usize = 8;

/// bmRequestType, LSB first: recipient, type, direction.
#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestType {
    pub recipient: B5,
    pub kind: B2,
    pub device_to_host: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum RequestKind {
    Standard = 0,
    Class = 1,
    Vendor = 2,
    #[num_enum(catch_all)]
    Reserved(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum Recipient {
    Device = 0,
    Interface = 1,
    Endpoint = 2,
    Other = 3,
    #[num_enum(catch_all)]
    Reserved(u8),
}

/// Standard request codes (bRequest) this device looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum StandardRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
    #[num_enum(catch_all)]
    Unknown(u8),
}

/// UVC class-specific request codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum UvcRequest {
    SetCur = 0x01,
    GetCur = 0x81,
    GetMin = 0x82,
    GetMax = 0x83,
    GetRes = 0x84,
    GetLen = 0x85,
    GetInfo = 0x86,
    GetDef = 0x87,
    #[num_enum(catch_all)]
    Unknown(u8),
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct SetupPacketRaw {
    request_type: u8,
    request: u8,
    value: U16,
    index: U16,
    length: U16,
}

/// A decoded control setup packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: RequestType,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type: RequestType::from_bytes([request_type]),
            request,
            value,
            index,
            length,
        }
    }

    /// Decodes the two 32-bit setup words as the stack latches them
    /// (bytes 0..4 and 4..8 of the packet, little endian).
    pub fn from_words(setupdat0: u32, setupdat1: u32) -> Self {
        let mut bytes = [0u8; SETUP_PACKET_SIZE];
        bytes[..4].copy_from_slice(&setupdat0.to_le_bytes());
        bytes[4..].copy_from_slice(&setupdat1.to_le_bytes());
        Self::from(bytes)
    }

    pub fn to_bytes(&self) -> [u8; SETUP_PACKET_SIZE] {
        let raw = SetupPacketRaw {
            request_type: self.request_type.into_bytes()[0],
            request: self.request,
            value: U16::new(self.value),
            index: U16::new(self.index),
            length: U16::new(self.length),
        };
        zerocopy::transmute!(raw)
    }

    pub fn kind(&self) -> RequestKind {
        RequestKind::from_primitive(self.request_type.kind())
    }

    pub fn recipient(&self) -> Recipient {
        Recipient::from_primitive(self.request_type.recipient())
    }

    /// Interface (or endpoint) number, the low byte of wIndex.
    pub fn index_low(&self) -> u8 {
        (self.index & 0xFF) as u8
    }

    /// Entity ID for class requests, the high byte of wIndex.
    pub fn index_high(&self) -> u8 {
        (self.index >> 8) as u8
    }

    /// Control selector for class requests, the high byte of wValue.
    pub fn control_selector(&self) -> u8 {
        (self.value >> 8) as u8
    }
}

impl From<[u8; SETUP_PACKET_SIZE]> for SetupPacket {
    fn from(bytes: [u8; SETUP_PACKET_SIZE]) -> Self {
        let raw: SetupPacketRaw = zerocopy::transmute!(bytes);
        Self {
            request_type: RequestType::from_bytes([raw.request_type]),
            request: raw.request,
            value: raw.value.get(),
            index: raw.index.get(),
            length: raw.length.get(),
        }
    }
}

impl TryFrom<&[u8]> for SetupPacket {
    type Error = UvcError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let packet: [u8; SETUP_PACKET_SIZE] = bytes
            .get(..SETUP_PACKET_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(UvcError::InsufficientData {
                expected: SETUP_PACKET_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self::from(packet))
    }
}

impl fmt::Display for SetupPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bmRequestType={:#04x} ({} {} {}) bRequest={:#04x} wValue={:#06x} wIndex={:#06x} wLength={}",
            self.request_type.into_bytes()[0],
            if self.request_type.device_to_host() { "IN" } else { "OUT" },
            self.kind(),
            self.recipient(),
            self.request,
            self.value,
            self.index,
            self.length
        )
    }
}
