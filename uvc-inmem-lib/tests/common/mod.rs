//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use std::sync::Arc;
#[allow(unused_imports)]
pub use std::time::Duration;
#[allow(unused_imports)]
pub use uvc_inmem_lib::constants::*;
#[allow(unused_imports)]
pub use uvc_inmem_lib::sim::{ControlResponse, SimFaults};
#[allow(unused_imports)]
pub use uvc_inmem_lib::{
    DEFAULT_PROBE_CONTROL, DescriptorSet, FrameAssembler, FrameTable, LifecycleState, LinkEvent, LinkPowerMode,
    ProbeControl, SetupPacket, SimTransport, StreamConfig, UsbSpeed, UsbTransport, UvcDevice, UvcError,
};

/// Placeholder descriptors; the simulated stack only records their sizes.
#[allow(dead_code)]
pub const TEST_DESCRIPTORS: DescriptorSet = DescriptorSet {
    super_speed_device: &[0x12, 0x01, 0x20, 0x03],
    high_speed_device: &[0x12, 0x01, 0x10, 0x02],
    bos: &[0x05, 0x0F, 0x16, 0x00, 0x02],
    device_qualifier: &[0x0A, 0x06, 0x00, 0x02],
    super_speed_config: &[0x09, 0x02, 0x00, 0x00],
    high_speed_config: &[0x09, 0x02, 0x00, 0x00],
    full_speed_config: &[0x09, 0x02, 0x00, 0x00],
    strings: &[&[0x04, 0x03, 0x09, 0x04], &[0x02, 0x03], &[0x02, 0x03]],
};

/// Bytes `seed, seed + 1, ...` so frames and offsets are easy to tell apart.
#[allow(dead_code)]
pub fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

#[allow(dead_code)]
pub fn frames(lengths: &[usize]) -> FrameTable {
    FrameTable::from_frames(lengths.iter().enumerate().map(|(i, &len)| patterned(len, (i as u8) * 64)))
        .expect("Failed to build frame table")
}

/// An initialized device on a simulated link, not yet configured by the host.
#[allow(dead_code)]
pub fn device_with(speed: UsbSpeed, frames: FrameTable, config: StreamConfig) -> (Arc<SimTransport>, Arc<UvcDevice>) {
    let sim = Arc::new(SimTransport::new(speed));
    let transport: Arc<dyn UsbTransport> = sim.clone();
    let device = Arc::new(UvcDevice::new(transport, frames, config).expect("Failed to create device"));
    device.init(&TEST_DESCRIPTORS).expect("Failed to init device");
    (sim, device)
}

#[allow(dead_code)]
pub fn device(speed: UsbSpeed) -> (Arc<SimTransport>, Arc<UvcDevice>) {
    device_with(speed, frames(&[9000, 100]), StreamConfig::default())
}

/// Class request to the VS interface.
#[allow(dead_code)]
pub fn vs_request(request: u8, selector: u16) -> SetupPacket {
    let request_type = if request & 0x80 != 0 { 0xA1 } else { 0x21 };
    SetupPacket::new(request_type, request, selector, UVC_INTERFACE_VS as u16, PROBE_CONTROL_SIZE as u16)
}

/// Class request to the VC interface.
#[allow(dead_code)]
pub fn vc_request(request: u8, selector: u16, entity: u8) -> SetupPacket {
    SetupPacket::new(0xA1, request, selector, (entity as u16) << 8 | UVC_INTERFACE_VC as u16, 1)
}

/// UVC header info byte of a received transfer.
#[allow(dead_code)]
pub fn info_byte(transfer: &[u8]) -> u8 {
    transfer[1]
}
