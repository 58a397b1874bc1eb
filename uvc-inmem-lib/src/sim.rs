//! A simulated USB stack and link for running the device without hardware.
//!
//! `SimTransport` implements [`UsbTransport`] by recording what the device
//! asks of it, and exposes the host side: issuing control requests and link
//! events, moving the link between power states, and draining the stream
//! channel bound to the video endpoint.

use crate::channel::ChannelConsumer;
use crate::lock;
use crate::setup::SetupPacket;
use crate::transport::{
    DescriptorKind, EndpointConfig, LinkEvent, LinkPowerMode, TransportError, UsbEventHandler, UsbSpeed, UsbTransport,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, Weak};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

/// How the simulated stack answered a control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    Ack,
    Stall,
    /// IN data stage sent to the host
    Data(Vec<u8>),
    /// OUT data stage of this many bytes accepted from the host
    Received(usize),
}

/// Transport calls to fail on purpose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimFaults {
    pub descriptor: bool,
    pub endpoint_config: bool,
    pub bind_stream: bool,
    pub send_ep0: bool,
    pub receive_ep0: bool,
}

#[derive(Debug)]
struct SimInner {
    started: bool,
    connected: bool,
    link_speed: UsbSpeed,
    descriptors: Vec<(DescriptorKind, u8, usize)>,
    endpoints: HashMap<u8, EndpointConfig>,
    flushes: HashMap<u8, usize>,
    control_log: Vec<ControlResponse>,
    ep0_out: VecDeque<Vec<u8>>,
    lpm_disabled: bool,
    /// OUT data stages read while LPM was disabled
    guarded_receives: usize,
    link_power: LinkPowerMode,
    consumer: Option<(u8, ChannelConsumer)>,
    binds: usize,
    faults: SimFaults,
}

pub struct SimTransport {
    inner: Mutex<SimInner>,
    handler: Mutex<Option<Weak<dyn UsbEventHandler>>>,
    consumer_ready: Notify,
}

impl SimTransport {
    /// A disconnected stack that will enumerate at `link_speed`.
    pub fn new(link_speed: UsbSpeed) -> Self {
        Self {
            inner: Mutex::new(SimInner {
                started: false,
                connected: false,
                link_speed,
                descriptors: Vec::new(),
                endpoints: HashMap::new(),
                flushes: HashMap::new(),
                control_log: Vec::new(),
                ep0_out: VecDeque::new(),
                lpm_disabled: false,
                guarded_receives: 0,
                link_power: LinkPowerMode::U0,
                consumer: None,
                binds: 0,
                faults: SimFaults::default(),
            }),
            handler: Mutex::new(None),
            consumer_ready: Notify::new(),
        }
    }

    pub fn set_faults(&self, faults: SimFaults) {
        lock(&self.inner).faults = faults;
    }

    fn handler(&self) -> Option<std::sync::Arc<dyn UsbEventHandler>> {
        lock(&self.handler).as_ref().and_then(Weak::upgrade)
    }

    // --- host side ---

    /// Delivers a setup packet. Requests the handler does not claim are
    /// stalled, as the real stack does.
    pub fn control_request(&self, setup: SetupPacket) -> bool {
        let handled = match self.handler() {
            Some(handler) => handler.on_setup_packet(setup),
            None => false,
        };
        if !handled {
            trace!("Unhandled setup packet, stalling: {}", setup);
            lock(&self.inner).control_log.push(ControlResponse::Stall);
        }
        handled
    }

    /// Queues `data` as the OUT data stage, then delivers the setup packet.
    pub fn control_out(&self, setup: SetupPacket, data: &[u8]) -> bool {
        lock(&self.inner).ep0_out.push_back(data.to_vec());
        self.control_request(setup)
    }

    pub fn link_event(&self, event: LinkEvent) {
        match self.handler() {
            Some(handler) => handler.on_link_event(event),
            None => warn!("Link event {:?} with no handler registered", event),
        }
    }

    /// Host asks for a U1/U2 transition; the link enters it if the device
    /// allows and LPM was not disabled.
    pub fn request_low_power(&self, mode: LinkPowerMode) -> bool {
        let allowed = self.handler().is_some_and(|h| h.on_low_power_request(mode));
        let mut inner = lock(&self.inner);
        let entered = allowed && !inner.lpm_disabled;
        if entered {
            inner.link_power = mode;
        }
        entered
    }

    /// Forces the link into `mode` regardless of the device.
    pub fn force_link_power(&self, mode: LinkPowerMode) {
        lock(&self.inner).link_power = mode;
    }

    /// Takes the consumer end bound to the video endpoint, if any.
    pub fn take_consumer(&self) -> Option<ChannelConsumer> {
        lock(&self.inner).consumer.take().map(|(_, consumer)| consumer)
    }

    /// Waits until the device binds a stream channel and takes its consumer.
    pub async fn wait_for_consumer(&self) -> ChannelConsumer {
        loop {
            let notified = self.consumer_ready.notified();
            if let Some(consumer) = self.take_consumer() {
                return consumer;
            }
            notified.await;
        }
    }

    // --- inspection ---

    pub fn is_started(&self) -> bool {
        lock(&self.inner).started
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner).connected
    }

    pub fn descriptors(&self) -> Vec<(DescriptorKind, u8, usize)> {
        lock(&self.inner).descriptors.clone()
    }

    pub fn endpoint_config(&self, endpoint: u8) -> Option<EndpointConfig> {
        lock(&self.inner).endpoints.get(&endpoint).copied()
    }

    pub fn flush_count(&self, endpoint: u8) -> usize {
        lock(&self.inner).flushes.get(&endpoint).copied().unwrap_or(0)
    }

    pub fn control_log(&self) -> Vec<ControlResponse> {
        lock(&self.inner).control_log.clone()
    }

    pub fn last_control(&self) -> Option<ControlResponse> {
        lock(&self.inner).control_log.last().cloned()
    }

    pub fn clear_control_log(&self) {
        lock(&self.inner).control_log.clear();
    }

    pub fn lpm_disabled(&self) -> bool {
        lock(&self.inner).lpm_disabled
    }

    /// OUT data stages that ran with U1/U2 entry blocked.
    pub fn guarded_receive_count(&self) -> usize {
        lock(&self.inner).guarded_receives
    }

    pub fn link_power(&self) -> LinkPowerMode {
        lock(&self.inner).link_power
    }

    /// Number of stream channels bound so far.
    pub fn bind_count(&self) -> usize {
        lock(&self.inner).binds
    }
}

impl UsbTransport for SimTransport {
    fn start(&self) -> Result<(), TransportError> {
        lock(&self.inner).started = true;
        Ok(())
    }

    fn register_handler(&self, handler: Weak<dyn UsbEventHandler>) {
        *lock(&self.handler) = Some(handler);
    }

    fn set_descriptor(&self, kind: DescriptorKind, index: u8, descriptor: &'static [u8]) -> Result<(), TransportError> {
        let mut inner = lock(&self.inner);
        if inner.faults.descriptor {
            return Err(TransportError::BadArgument);
        }
        inner.descriptors.push((kind, index, descriptor.len()));
        Ok(())
    }

    fn connect(&self, super_speed: bool) -> Result<(), TransportError> {
        let mut inner = lock(&self.inner);
        if !super_speed && inner.link_speed == UsbSpeed::Super {
            inner.link_speed = UsbSpeed::High;
        }
        inner.connected = true;
        debug!("Simulated link up at {}", inner.link_speed);
        Ok(())
    }

    fn speed(&self) -> UsbSpeed {
        let inner = lock(&self.inner);
        if inner.connected { inner.link_speed } else { UsbSpeed::NotConnected }
    }

    fn set_endpoint_config(&self, endpoint: u8, config: &EndpointConfig) -> Result<(), TransportError> {
        let mut inner = lock(&self.inner);
        if inner.faults.endpoint_config {
            return Err(TransportError::NotConfigured);
        }
        if !config.enable {
            // Disabling the endpoint unbinds whatever channel fed it
            if matches!(inner.consumer, Some((ep, _)) if ep == endpoint) {
                inner.consumer = None;
            }
        }
        inner.endpoints.insert(endpoint, *config);
        Ok(())
    }

    fn flush_endpoint(&self, endpoint: u8) {
        *lock(&self.inner).flushes.entry(endpoint).or_insert(0) += 1;
    }

    fn bind_stream(&self, endpoint: u8, consumer: ChannelConsumer) -> Result<(), TransportError> {
        let mut inner = lock(&self.inner);
        if inner.faults.bind_stream {
            return Err(TransportError::Failure(0x44));
        }
        if !inner.endpoints.get(&endpoint).is_some_and(|c| c.enable) {
            return Err(TransportError::NotConfigured);
        }
        inner.consumer = Some((endpoint, consumer));
        inner.binds += 1;
        drop(inner);
        self.consumer_ready.notify_one();
        Ok(())
    }

    fn ack_setup(&self) {
        lock(&self.inner).control_log.push(ControlResponse::Ack);
    }

    fn stall_setup(&self) {
        lock(&self.inner).control_log.push(ControlResponse::Stall);
    }

    fn send_ep0_data(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = lock(&self.inner);
        if inner.faults.send_ep0 {
            return Err(TransportError::Timeout);
        }
        inner.control_log.push(ControlResponse::Data(data.to_vec()));
        Ok(())
    }

    fn receive_ep0_data(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut inner = lock(&self.inner);
        if inner.lpm_disabled {
            inner.guarded_receives += 1;
        }
        if inner.faults.receive_ep0 {
            inner.ep0_out.pop_front();
            return Err(TransportError::Aborted);
        }
        let data = inner.ep0_out.pop_front().unwrap_or_default();
        let count = data.len().min(buf.len());
        buf[..count].copy_from_slice(&data[..count]);
        inner.control_log.push(ControlResponse::Received(count));
        Ok(count)
    }

    fn disable_lpm(&self) {
        lock(&self.inner).lpm_disabled = true;
    }

    fn enable_lpm(&self) {
        lock(&self.inner).lpm_disabled = false;
    }

    fn link_power_state(&self) -> Result<LinkPowerMode, TransportError> {
        let inner = lock(&self.inner);
        if !inner.connected || inner.link_speed != UsbSpeed::Super {
            return Err(TransportError::NotSupported);
        }
        Ok(inner.link_power)
    }

    fn set_link_power_state(&self, mode: LinkPowerMode) -> Result<(), TransportError> {
        let mut inner = lock(&self.inner);
        if !inner.connected || inner.link_speed != UsbSpeed::Super {
            return Err(TransportError::NotSupported);
        }
        inner.link_power = mode;
        Ok(())
    }
}
