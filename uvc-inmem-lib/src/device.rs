use crate::config::StreamConfig;
use crate::constants::EP_CONTROL_STATUS_PKT_SIZE;
use crate::control::ControlRequestDispatcher;
use crate::error::UvcError;
use crate::frame_table::FrameTable;
use crate::lifecycle::{ChannelSlot, LifecycleController};
use crate::probe::ProbeControl;
use crate::setup::SetupPacket;
use crate::state::{DeviceState, LifecycleState, StreamStats, StreamStatsSnapshot};
use crate::streaming::StreamingLoop;
use crate::transport::{DescriptorKind, EndpointConfig, LinkEvent, LinkPowerMode, UsbEventHandler, UsbTransport};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{error, info, trace};

/// Enumeration descriptors handed to the stack at initialization.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorSet {
    pub super_speed_device: &'static [u8],
    pub high_speed_device: &'static [u8],
    pub bos: &'static [u8],
    pub device_qualifier: &'static [u8],
    pub super_speed_config: &'static [u8],
    pub high_speed_config: &'static [u8],
    pub full_speed_config: &'static [u8],
    /// String descriptors by index, language IDs first
    pub strings: &'static [&'static [u8]],
}

impl DescriptorSet {
    fn entries(&self) -> impl Iterator<Item = (DescriptorKind, u8, &'static [u8])> + '_ {
        [
            (DescriptorKind::SuperSpeedDevice, 0, self.super_speed_device),
            (DescriptorKind::HighSpeedDevice, 0, self.high_speed_device),
            (DescriptorKind::SuperSpeedBos, 0, self.bos),
            (DescriptorKind::DeviceQualifier, 0, self.device_qualifier),
            (DescriptorKind::SuperSpeedConfig, 0, self.super_speed_config),
            (DescriptorKind::HighSpeedConfig, 0, self.high_speed_config),
            (DescriptorKind::FullSpeedConfig, 0, self.full_speed_config),
        ]
        .into_iter()
        .chain(
            self.strings
                .iter()
                .enumerate()
                .map(|(index, s)| (DescriptorKind::String, index as u8, *s)),
        )
    }
}

/// The UVC device application: control-plane handlers, lifecycle and the
/// streaming task, wired to one transport.
pub struct UvcDevice {
    transport: Arc<dyn UsbTransport>,
    state: Arc<DeviceState>,
    slot: Arc<ChannelSlot>,
    frames: Arc<FrameTable>,
    stats: Arc<StreamStats>,
    config: StreamConfig,
    control: ControlRequestDispatcher,
    lifecycle: LifecycleController,
}

impl UvcDevice {
    pub fn new(transport: Arc<dyn UsbTransport>, frames: FrameTable, config: StreamConfig) -> Result<Self, UvcError> {
        config.validate()?;

        let state = Arc::new(DeviceState::new());
        let slot = Arc::new(ChannelSlot::new());
        let control = ControlRequestDispatcher::new(transport.clone(), state.clone());
        let lifecycle = LifecycleController::new(transport.clone(), state.clone(), slot.clone(), config.clone());

        Ok(Self {
            transport,
            state,
            slot,
            frames: Arc::new(frames),
            stats: Arc::new(StreamStats::default()),
            config,
            control,
            lifecycle,
        })
    }

    /// Starts the USB block, registers the callbacks and descriptors, enables
    /// the status endpoint and connects to the bus. Any failure here is fatal
    /// to the application.
    pub fn init(self: &Arc<Self>, descriptors: &DescriptorSet) -> Result<(), UvcError> {
        self.transport.start().inspect_err(|e| error!("USB function failed to start: {}", e))?;

        let handler: Weak<dyn UsbEventHandler> = Arc::downgrade(self) as Weak<dyn UsbEventHandler>;
        self.transport.register_handler(handler);

        for (kind, index, descriptor) in descriptors.entries() {
            self.transport
                .set_descriptor(kind, index, descriptor)
                .map_err(|source| {
                    error!("USB set descriptor failed, type {} index {}: {}", kind, index, source);
                    UvcError::Descriptor { kind, index, source }
                })?;
        }

        // The status interrupt endpoint carries no traffic but must exist
        let status = EndpointConfig::interrupt(EP_CONTROL_STATUS_PKT_SIZE);
        self.transport
            .set_endpoint_config(self.config.status_endpoint, &status)
            .inspect_err(|e| error!("Configuring status endpoint failed: {}", e))?;

        self.transport
            .connect(true)
            .inspect_err(|e| error!("USB connect failed: {}", e))?;

        info!("UVC device initialized, {} frames catalogued", self.frames.len());
        Ok(())
    }

    /// Spawns the streaming task on the current tokio runtime.
    pub fn spawn_streaming(&self) -> JoinHandle<()> {
        tokio::spawn(self.streaming_loop().run())
    }

    pub fn streaming_loop(&self) -> StreamingLoop {
        StreamingLoop::new(
            self.transport.clone(),
            self.state.clone(),
            self.slot.clone(),
            self.frames.clone(),
            self.stats.clone(),
            self.config.clone(),
        )
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.state.lifecycle()
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn stats(&self) -> StreamStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Last probe/commit block received from the host.
    pub fn last_probe_commit(&self) -> Option<ProbeControl> {
        self.control.last_received()
    }
}

impl UsbEventHandler for UvcDevice {
    fn on_setup_packet(&self, setup: SetupPacket) -> bool {
        self.control.dispatch(&setup)
    }

    fn on_link_event(&self, event: LinkEvent) {
        if let Err(e) = self.lifecycle.handle_event(event) {
            error!("Handling {:?} failed, device not streaming: {}", event, e);
        }
    }

    /// Nothing in this application needs U1/U2 blocked.
    fn on_low_power_request(&self, mode: LinkPowerMode) -> bool {
        trace!("Allowing link transition to {}", mode);
        true
    }
}
