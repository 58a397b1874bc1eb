use crate::constants::*;
use crate::lock;
use crate::probe::{DEFAULT_PROBE_CONTROL, ProbeControl};
use crate::setup::{Recipient, RequestKind, SetupPacket, StandardRequest, UvcRequest};
use crate::state::DeviceState;
use crate::transport::UsbTransport;
use num_enum::FromPrimitive;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Probe/commit data stage storage, sized for the aligned block.
#[derive(Debug)]
struct CommitBuffer {
    data: [u8; PROBE_CONTROL_SIZE_ALIGNED],
    received: usize,
}

/// Answers the control requests the USB stack does not handle itself.
pub struct ControlRequestDispatcher {
    transport: Arc<dyn UsbTransport>,
    state: Arc<DeviceState>,
    commit: Mutex<CommitBuffer>,
}

impl ControlRequestDispatcher {
    pub fn new(transport: Arc<dyn UsbTransport>, state: Arc<DeviceState>) -> Self {
        Self {
            transport,
            state,
            commit: Mutex::new(CommitBuffer {
                data: [0; PROBE_CONTROL_SIZE_ALIGNED],
                received: 0,
            }),
        }
    }

    /// Handles one setup packet. Returns `false` for requests this device
    /// does not claim; the stack stalls those.
    pub fn dispatch(&self, setup: &SetupPacket) -> bool {
        debug!(bytes = hex::encode(setup.to_bytes()), "SETUP: {}", setup);

        match setup.kind() {
            RequestKind::Standard => self.handle_standard(setup),
            RequestKind::Class => {
                debug!(
                    "UVC RQT: {} {:#04x} {:#04x} {:#04x} {:#06x}",
                    setup.recipient(),
                    setup.request,
                    setup.index_high(),
                    setup.index_low(),
                    setup.value
                );
                if setup.recipient() != Recipient::Interface {
                    return false;
                }
                match setup.index_low() {
                    UVC_INTERFACE_VC => self.handle_video_control(setup),
                    UVC_INTERFACE_VS => self.handle_video_streaming(setup),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// SET_FEATURE / CLEAR_FEATURE(0) addressed to an interface. These are
    /// function-suspend requests from USB 3 hosts; accepted once configured.
    fn handle_standard(&self, setup: &SetupPacket) -> bool {
        let is_feature = matches!(
            StandardRequest::from_primitive(setup.request),
            StandardRequest::SetFeature | StandardRequest::ClearFeature
        );
        if setup.recipient() != Recipient::Interface || !is_feature || setup.value != 0 {
            return false;
        }

        if self.state.is_configured() {
            self.transport.ack_setup();
        } else {
            debug!("Rejecting interface feature request before SET_CONFIGURATION");
            self.transport.stall_setup();
        }
        true
    }

    /// Only the request error code control exists on the VC interface, and
    /// it always reports "invalid control".
    fn handle_video_control(&self, setup: &SetupPacket) -> bool {
        if setup.index_high() != 0 || setup.value != VC_REQUEST_ERROR_CODE_CONTROL {
            return false;
        }
        if let Err(e) = self.transport.send_ep0_data(&[REQUEST_STATUS_INVALID_CONTROL]) {
            error!("Sending request error code failed: {}", e);
        }
        true
    }

    fn handle_video_streaming(&self, setup: &SetupPacket) -> bool {
        match setup.value {
            VS_PROBE_CONTROL | VS_COMMIT_CONTROL => match UvcRequest::from_primitive(setup.request) {
                UvcRequest::GetCur | UvcRequest::GetMin | UvcRequest::GetMax | UvcRequest::GetDef => {
                    if let Err(e) = self.transport.send_ep0_data(&DEFAULT_PROBE_CONTROL.to_bytes()) {
                        error!("Sending probe control failed: {}", e);
                    }
                }
                UvcRequest::SetCur => self.receive_probe_commit(setup),
                other => {
                    debug!("Unsupported request {} on VS selector {:#06x}", other, setup.value);
                    self.transport.stall_setup();
                }
            },
            _ => {
                debug!("Unsupported VS control selector {:#06x}", setup.value);
                self.transport.stall_setup();
            }
        }
        true
    }

    /// The received block is stored but never applied: GET requests keep
    /// returning the single default setting. Probe and commit share the
    /// buffer, so the last SET_CUR of either wins.
    fn receive_probe_commit(&self, setup: &SetupPacket) {
        // No U1/U2 entry while the data stage is in flight
        self.transport.disable_lpm();
        let mut commit = lock(&self.commit);
        let result = self.transport.receive_ep0_data(&mut commit.data);
        self.transport.enable_lpm();

        match result {
            Ok(received) => {
                let received = received.min(PROBE_CONTROL_SIZE_ALIGNED);
                commit.received = received;
                if received != PROBE_CONTROL_SIZE {
                    warn!(
                        "Invalid number of bytes received in SET_CUR request: {} (expected {})",
                        received, PROBE_CONTROL_SIZE
                    );
                } else {
                    debug!(
                        bytes = hex::encode(&commit.data[..received]),
                        "SET_CUR {} received",
                        if setup.value == VS_PROBE_CONTROL { "probe" } else { "commit" }
                    );
                }
            }
            Err(e) => {
                commit.received = 0;
                error!("Receiving SET_CUR data stage failed: {}", e);
            }
        }
    }

    /// The last block the host sent with SET_CUR, if it was long enough to
    /// decode.
    pub fn last_received(&self) -> Option<ProbeControl> {
        let commit = lock(&self.commit);
        ProbeControl::parse(&commit.data[..commit.received]).ok()
    }
}
