//! Enumeration descriptors for the bulk-streaming camera: one configuration
//! with an IAD grouping the VC interface (camera terminal, output terminal,
//! status interrupt endpoint) and the VS interface (one MJPEG format, one
//! 640x480 frame at 30 fps, bulk endpoint 0x81).

use uvc_inmem_lib::DescriptorSet;

/// SuperSpeed device descriptor (bcdUSB 3.00, EP0 512 bytes)
pub const SS_DEVICE: [u8; 18] = [
    0x12, 0x01, 0x00, 0x03, // bLength, DEVICE, bcdUSB 3.00
    0xEF, 0x02, 0x01, 0x09, // misc class with IAD, EP0 2^9 bytes
    0xB4, 0x04, 0xF8, 0x00, // VID 0x04B4, PID 0x00F8
    0x00, 0x00, 0x01, 0x02, // bcdDevice, manufacturer and product strings
    0x00, 0x01, // no serial, one configuration
];

/// High/full speed device descriptor (bcdUSB 2.10 so the host reads the BOS)
pub const HS_DEVICE: [u8; 18] = [
    0x12, 0x01, 0x10, 0x02, 0xEF, 0x02, 0x01, 0x40, 0xB4, 0x04, 0xF8, 0x00, 0x00, 0x00, 0x01, 0x02, 0x00, 0x01,
];

pub const DEVICE_QUALIFIER: [u8; 10] = [0x0A, 0x06, 0x00, 0x02, 0xEF, 0x02, 0x01, 0x40, 0x01, 0x00];

/// BOS with the USB 2.0 extension (LPM) and SuperSpeed capabilities
pub const BOS: [u8; 22] = [
    0x05, 0x0F, 0x16, 0x00, 0x02, // BOS header, two capabilities
    0x07, 0x10, 0x02, 0x02, 0x00, 0x00, 0x00, // USB 2.0 extension, LPM
    0x0A, 0x10, 0x03, 0x00, 0x0E, 0x00, 0x01, 0x0A, 0xFF, 0x07, // SS: FS/HS/SS, U1 10us, U2 2047us
];

/// SuperSpeed configuration
pub const SS_CONFIG: [u8; 167] = [
    // Configuration: 2 interfaces, bus powered, 400 mA
    0x09, 0x02, 0xA7, 0x00, 0x02, 0x01, 0x00, 0x80, 0x32,
    // Interface association: VC + VS, video interface collection
    0x08, 0x0B, 0x00, 0x02, 0x0E, 0x03, 0x00, 0x00,
    // VC interface 0, one endpoint
    0x09, 0x04, 0x00, 0x00, 0x01, 0x0E, 0x01, 0x00, 0x00,
    // VC header: UVC 1.00, 40 bytes of class descriptors, 48 MHz clock, VS interface 1
    0x0D, 0x24, 0x01, 0x00, 0x01, 0x28, 0x00, 0x00, 0x6C, 0xDC, 0x02, 0x01, 0x01,
    // Camera terminal, ID 1, no controls
    0x12, 0x24, 0x02, 0x01, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00,
    // Output terminal, ID 2, USB streaming, fed by the camera terminal
    0x09, 0x24, 0x03, 0x02, 0x01, 0x01, 0x00, 0x01, 0x00,
    // Status interrupt endpoint 0x82, 64 bytes
    0x07, 0x05, 0x82, 0x03, 0x40, 0x00, 0x01,
    // SS companion: no burst, 64 bytes per interval
    0x06, 0x30, 0x00, 0x00, 0x40, 0x00,
    // Class-specific interrupt endpoint
    0x05, 0x25, 0x03, 0x40, 0x00,
    // VS interface 1, one endpoint
    0x09, 0x04, 0x01, 0x00, 0x01, 0x0E, 0x02, 0x00, 0x00,
    // VS input header: one format, 61 bytes, EP 0x81, terminal link 2
    0x0E, 0x24, 0x01, 0x01, 0x3D, 0x00, 0x81, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00,
    // MJPEG format 1, one frame
    0x0B, 0x24, 0x06, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00,
    // MJPEG frame 1: 640x480, 614400 byte buffer, 333333 x 100 ns
    0x1E, 0x24, 0x07, 0x01, 0x00, 0x80, 0x02, 0xE0, 0x01, 0x00, 0x00, 0xCA, 0x08, 0x00, 0x00, 0xCA, 0x08, 0x00,
    0x60, 0x09, 0x00, 0x15, 0x16, 0x05, 0x00, 0x01, 0x15, 0x16, 0x05, 0x00,
    // Color matching: BT.709, BT.709, SMPTE 170M
    0x06, 0x24, 0x0D, 0x01, 0x01, 0x04,
    // Bulk video endpoint 0x81, 1024 bytes
    0x07, 0x05, 0x81, 0x02, 0x00, 0x04, 0x00,
    // SS companion: burst of 8
    0x06, 0x30, 0x07, 0x00, 0x00, 0x00,
];

/// High speed configuration; full speed differs only in packet sizes.
pub const HS_CONFIG: [u8; 155] = [
    0x09, 0x02, 0x9B, 0x00, 0x02, 0x01, 0x00, 0x80, 0xFA, //
    0x08, 0x0B, 0x00, 0x02, 0x0E, 0x03, 0x00, 0x00, //
    0x09, 0x04, 0x00, 0x00, 0x01, 0x0E, 0x01, 0x00, 0x00, //
    0x0D, 0x24, 0x01, 0x00, 0x01, 0x28, 0x00, 0x00, 0x6C, 0xDC, 0x02, 0x01, 0x01, //
    0x12, 0x24, 0x02, 0x01, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, //
    0x09, 0x24, 0x03, 0x02, 0x01, 0x01, 0x00, 0x01, 0x00, //
    0x07, 0x05, 0x82, 0x03, 0x40, 0x00, 0x08, //
    0x05, 0x25, 0x03, 0x40, 0x00, //
    0x09, 0x04, 0x01, 0x00, 0x01, 0x0E, 0x02, 0x00, 0x00, //
    0x0E, 0x24, 0x01, 0x01, 0x3D, 0x00, 0x81, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, //
    0x0B, 0x24, 0x06, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, //
    0x1E, 0x24, 0x07, 0x01, 0x00, 0x80, 0x02, 0xE0, 0x01, 0x00, 0x00, 0xCA, 0x08, 0x00, 0x00, 0xCA, 0x08, 0x00,
    0x60, 0x09, 0x00, 0x15, 0x16, 0x05, 0x00, 0x01, 0x15, 0x16, 0x05, 0x00, //
    0x06, 0x24, 0x0D, 0x01, 0x01, 0x04, //
    // Bulk video endpoint 0x81, 512 bytes
    0x07, 0x05, 0x81, 0x02, 0x00, 0x02, 0x00,
];

pub const FS_CONFIG: [u8; 155] = [
    0x09, 0x02, 0x9B, 0x00, 0x02, 0x01, 0x00, 0x80, 0xFA, //
    0x08, 0x0B, 0x00, 0x02, 0x0E, 0x03, 0x00, 0x00, //
    0x09, 0x04, 0x00, 0x00, 0x01, 0x0E, 0x01, 0x00, 0x00, //
    0x0D, 0x24, 0x01, 0x00, 0x01, 0x28, 0x00, 0x00, 0x6C, 0xDC, 0x02, 0x01, 0x01, //
    0x12, 0x24, 0x02, 0x01, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, //
    0x09, 0x24, 0x03, 0x02, 0x01, 0x01, 0x00, 0x01, 0x00, //
    0x07, 0x05, 0x82, 0x03, 0x40, 0x00, 0x08, //
    0x05, 0x25, 0x03, 0x40, 0x00, //
    0x09, 0x04, 0x01, 0x00, 0x01, 0x0E, 0x02, 0x00, 0x00, //
    0x0E, 0x24, 0x01, 0x01, 0x3D, 0x00, 0x81, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, //
    0x0B, 0x24, 0x06, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, //
    0x1E, 0x24, 0x07, 0x01, 0x00, 0x80, 0x02, 0xE0, 0x01, 0x00, 0x00, 0xCA, 0x08, 0x00, 0x00, 0xCA, 0x08, 0x00,
    0x60, 0x09, 0x00, 0x15, 0x16, 0x05, 0x00, 0x01, 0x15, 0x16, 0x05, 0x00, //
    0x06, 0x24, 0x0D, 0x01, 0x01, 0x04, //
    // Bulk video endpoint 0x81, 64 bytes
    0x07, 0x05, 0x81, 0x02, 0x40, 0x00, 0x00,
];

pub const LANGUAGE_IDS: [u8; 4] = [0x04, 0x03, 0x09, 0x04];

pub const MANUFACTURER: [u8; 16] = [
    0x10, 0x03, b'C', 0, b'y', 0, b'p', 0, b'r', 0, b'e', 0, b's', 0, b's', 0,
];

pub const PRODUCT: [u8; 16] = [
    0x10, 0x03, b'F', 0, b'X', 0, b'3', 0, b' ', 0, b'U', 0, b'V', 0, b'C', 0,
];

pub const STRINGS: [&[u8]; 3] = [&LANGUAGE_IDS, &MANUFACTURER, &PRODUCT];

pub const DESCRIPTORS: DescriptorSet = DescriptorSet {
    super_speed_device: &SS_DEVICE,
    high_speed_device: &HS_DEVICE,
    bos: &BOS,
    device_qualifier: &DEVICE_QUALIFIER,
    super_speed_config: &SS_CONFIG,
    high_speed_config: &HS_CONFIG,
    full_speed_config: &FS_CONFIG,
    strings: &STRINGS,
};
