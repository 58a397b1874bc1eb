use crate::channel::StreamChannel;
use crate::config::StreamConfig;
use crate::error::UvcError;
use crate::state::DeviceState;
use crate::transport::{EndpointConfig, LinkEvent, UsbTransport};
use crate::lock;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, trace, warn};

/// Holds the channel of the active streaming pipeline, if any.
#[derive(Debug, Default)]
pub struct ChannelSlot {
    channel: Mutex<Option<Arc<StreamChannel>>>,
}

impl ChannelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<StreamChannel>> {
        lock(&self.channel).clone()
    }
}

/// Starts and stops the streaming pipeline as the host configures, selects
/// interfaces on, resets and disconnects the device.
pub struct LifecycleController {
    transport: Arc<dyn UsbTransport>,
    state: Arc<DeviceState>,
    slot: Arc<ChannelSlot>,
    config: StreamConfig,
    events: Mutex<()>,
}

impl LifecycleController {
    pub fn new(
        transport: Arc<dyn UsbTransport>,
        state: Arc<DeviceState>,
        slot: Arc<ChannelSlot>,
        config: StreamConfig,
    ) -> Self {
        Self {
            transport,
            state,
            slot,
            config,
            events: Mutex::new(()),
        }
    }

    /// Applies one link event. Errors come from restarting the pipeline; the
    /// device is left configured but not streaming when that fails.
    pub fn handle_event(&self, event: LinkEvent) -> Result<(), UvcError> {
        let _serialized = lock(&self.events);
        debug!("USB event {:?} in state {}", event, self.state.lifecycle());

        match event {
            LinkEvent::SetConfiguration(value) => {
                self.state.set_configured(value != 0);
                self.restart()
            }
            // Every interface selection restarts the stream, whatever the
            // alternate setting
            LinkEvent::SetInterface(_) => self.restart(),
            LinkEvent::Reset | LinkEvent::Disconnect => {
                self.stop();
                self.state.set_configured(false);
                Ok(())
            }
            other => {
                trace!("Ignoring USB event {:?}", other);
                Ok(())
            }
        }
    }

    fn restart(&self) -> Result<(), UvcError> {
        if self.state.is_streaming() {
            self.stop();
        }
        self.start()
    }

    /// Brings up the bulk endpoint and the buffer pool, then raises the
    /// streaming flag. A start while a pool exists does nothing.
    pub fn start(&self) -> Result<(), UvcError> {
        let mut slot = lock(&self.slot.channel);
        if slot.is_some() {
            warn!("Streaming pipeline already running; start ignored");
            return Ok(());
        }

        let endpoint = self.config.video_endpoint;
        let speed = self.transport.speed();
        let ep_config = EndpointConfig::bulk(self.config.packet_size, self.config.burst_for(speed));
        if let Err(e) = self.transport.set_endpoint_config(endpoint, &ep_config) {
            error!("Configuring endpoint {:#04x} failed: {}", endpoint, e);
            return Err(e.into());
        }

        let (channel, consumer) = match StreamChannel::create(self.config.channel_config()) {
            Ok(ends) => ends,
            Err(e) => {
                error!("Creating stream channel failed: {}", e);
                self.disable_endpoint();
                return Err(e);
            }
        };

        if let Err(e) = self.transport.bind_stream(endpoint, consumer) {
            error!("Binding stream channel to endpoint {:#04x} failed: {}", endpoint, e);
            channel.destroy();
            self.disable_endpoint();
            return Err(e.into());
        }

        self.transport.flush_endpoint(endpoint);

        if let Err(e) = channel.set_transfer(0) {
            error!("Starting stream transfer failed: {}", e);
            channel.destroy();
            self.disable_endpoint();
            return Err(e);
        }

        info!(
            generation = channel.generation(),
            "Streaming started at {} (burst {})", speed, ep_config.burst_len
        );
        *slot = Some(Arc::new(channel));
        self.state.set_streaming(true);
        Ok(())
    }

    /// Drops the streaming flag, then tears the pipeline down. The flag goes
    /// first so the streaming task stops touching buffers before the pool is
    /// destroyed.
    pub fn stop(&self) {
        let mut slot = lock(&self.slot.channel);
        self.state.set_streaming(false);

        let Some(channel) = slot.take() else {
            return;
        };
        channel.destroy();
        self.transport.flush_endpoint(self.config.video_endpoint);
        self.disable_endpoint();
        info!(generation = channel.generation(), "Streaming stopped");
    }

    fn disable_endpoint(&self) {
        let endpoint = self.config.video_endpoint;
        if let Err(e) = self.transport.set_endpoint_config(endpoint, &EndpointConfig::disabled()) {
            warn!("Disabling endpoint {:#04x} failed: {}", endpoint, e);
        }
    }
}
