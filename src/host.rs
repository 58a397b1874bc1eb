//! A scripted host driving the device over the simulated link: configure,
//! negotiate probe/commit, pull frames off the bulk endpoint, disconnect.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uvc_inmem_lib::constants::*;
use uvc_inmem_lib::sim::ControlResponse;
use uvc_inmem_lib::{
    FrameAssembler, LifecycleState, LinkEvent, LinkPowerMode, ProbeControl, SetupPacket, SimTransport, UvcDevice,
};

const SET_CUR: u8 = 0x01;
const GET_CUR: u8 = 0x81;
const GET_DEF: u8 = 0x87;

/// Longest gap between two transfers before the host gives up
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct HostOptions {
    pub frame_count: usize,
    pub output_dir: Option<PathBuf>,
    /// Drop the link to U1 once streaming runs, to watch the device wake it
    pub enter_low_power: bool,
}

#[derive(Debug, Default)]
pub struct HostReport {
    pub frames: usize,
    pub transfers: usize,
    pub bytes: usize,
    pub dropped_frames: usize,
    pub elapsed: Duration,
}

impl HostReport {
    pub fn frames_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.frames as f64 / secs } else { 0.0 }
    }
}

pub struct SimHost {
    sim: Arc<SimTransport>,
    device: Arc<UvcDevice>,
}

impl SimHost {
    pub fn new(sim: Arc<SimTransport>, device: Arc<UvcDevice>) -> Self {
        Self { sim, device }
    }

    pub async fn run(&self, options: &HostOptions) -> Result<HostReport> {
        self.sim.link_event(LinkEvent::SetConfiguration(1));
        if self.device.lifecycle_state() != LifecycleState::Streaming {
            bail!("Device did not start streaming after SET_CONFIGURATION");
        }

        let committed = self.negotiate()?;
        info!("Committed: {}", committed);
        self.query_error_code()?;

        if let Some(dir) = &options.output_dir {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {:?}", dir))?;
        }

        let report = self.receive_frames(options).await?;

        self.sim.link_event(LinkEvent::Disconnect);
        info!("Host disconnected, device is {}", self.device.lifecycle_state());
        Ok(report)
    }

    fn vs_request(request: u8, selector: u16) -> SetupPacket {
        let request_type = if request & 0x80 != 0 { 0xA1 } else { 0x21 };
        SetupPacket::new(
            request_type,
            request,
            selector,
            UVC_INTERFACE_VS as u16,
            PROBE_CONTROL_SIZE as u16,
        )
    }

    fn read_control(&self, setup: SetupPacket) -> Result<Vec<u8>> {
        if !self.sim.control_request(setup) {
            bail!("Device stalled {}", setup);
        }
        match self.sim.last_control() {
            Some(ControlResponse::Data(data)) => Ok(data),
            other => bail!("Expected a data stage for {}, got {:?}", setup, other),
        }
    }

    fn write_control(&self, setup: SetupPacket, data: &[u8]) -> Result<()> {
        if !self.sim.control_out(setup, data) {
            bail!("Device stalled {}", setup);
        }
        Ok(())
    }

    /// The usual driver sequence: read the default, propose it, read back
    /// what the device settled on, commit that.
    fn negotiate(&self) -> Result<ProbeControl> {
        let default = self.read_control(Self::vs_request(GET_DEF, VS_PROBE_CONTROL))?;
        debug!(bytes = hex::encode(&default), "GET_DEF probe");

        self.write_control(Self::vs_request(SET_CUR, VS_PROBE_CONTROL), &default)?;
        let current = self.read_control(Self::vs_request(GET_CUR, VS_PROBE_CONTROL))?;
        let probe = ProbeControl::parse(&current).context("Device returned a short probe block")?;
        info!("Probed: {}", probe);

        self.write_control(Self::vs_request(SET_CUR, VS_COMMIT_CONTROL), &current)?;
        match self.device.last_probe_commit() {
            Some(committed) => Ok(committed),
            None => bail!("Device did not take the commit block"),
        }
    }

    fn query_error_code(&self) -> Result<()> {
        let setup = SetupPacket::new(0xA1, GET_CUR, VC_REQUEST_ERROR_CODE_CONTROL, UVC_INTERFACE_VC as u16, 1);
        let code = self.read_control(setup)?;
        debug!("VC request error code: {:02x?}", code);
        Ok(())
    }

    async fn receive_frames(&self, options: &HostOptions) -> Result<HostReport> {
        let mut consumer = tokio::time::timeout(TRANSFER_TIMEOUT, self.sim.wait_for_consumer())
            .await
            .context("No stream bound to the video endpoint")?;
        let mut assembler = FrameAssembler::new();
        let mut report = HostReport::default();
        let started = Instant::now();

        if options.enter_low_power {
            self.sim.force_link_power(LinkPowerMode::U1);
            info!("Link forced to U1");
        }

        while report.frames < options.frame_count {
            let buffer = tokio::time::timeout(TRANSFER_TIMEOUT, consumer.next())
                .await
                .context("Timed out waiting for a transfer")?
                .context("Stream channel closed")?;

            report.transfers += 1;
            report.bytes += buffer.len();
            let frame = assembler.push(buffer.bytes());
            consumer.release(buffer);

            let Some(frame) = frame.context("Malformed transfer")? else {
                continue;
            };
            debug!(
                frame = report.frames,
                len = frame.data.len(),
                fid = frame.frame_id,
                transfers = frame.transfers,
                "Frame received"
            );
            if let Some(dir) = &options.output_dir {
                let path = dir.join(format!("frame_{:05}.mjpg", report.frames));
                fs::write(&path, &frame.data).with_context(|| format!("Failed to write {:?}", path))?;
            }
            report.frames += 1;
        }

        report.elapsed = started.elapsed();
        report.dropped_frames = assembler.dropped_frames();
        if report.dropped_frames > 0 {
            warn!("{} partial frames dropped", report.dropped_frames);
        }
        if options.enter_low_power {
            info!("Link power after streaming: {}", self.sim.link_power());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::DESCRIPTORS;
    use uvc_inmem_lib::{FrameTable, StreamConfig, UsbSpeed, UsbTransport};

    fn setup(speed: UsbSpeed, lengths: &[usize]) -> (Arc<SimTransport>, Arc<UvcDevice>) {
        let frames = FrameTable::from_frames(lengths.iter().map(|&len| vec![0x5Au8; len])).unwrap();
        let sim = Arc::new(SimTransport::new(speed));
        let transport: Arc<dyn UsbTransport> = sim.clone();
        let device = Arc::new(UvcDevice::new(transport, frames, StreamConfig::default()).unwrap());
        device.init(&DESCRIPTORS).unwrap();
        (sim, device)
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_session() {
        let (sim, device) = setup(UsbSpeed::Super, &[9000, 100, 8168]);
        let streamer = device.spawn_streaming();

        let options = HostOptions {
            frame_count: 6,
            output_dir: None,
            enter_low_power: true,
        };
        let report = SimHost::new(sim.clone(), device.clone()).run(&options).await.unwrap();
        streamer.abort();

        assert_eq!(report.frames, 6);
        assert_eq!(report.dropped_frames, 0);
        // 3 + 1 + 3 transfers per pass over the table
        assert_eq!(report.transfers, 14);
        assert_eq!(device.lifecycle_state(), LifecycleState::Idle);
        assert_eq!(device.last_probe_commit(), Some(uvc_inmem_lib::DEFAULT_PROBE_CONTROL));
        assert_eq!(sim.link_power(), LinkPowerMode::U0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_session_writes_frames() {
        let (sim, device) = setup(UsbSpeed::High, &[300, 5000]);
        let streamer = device.spawn_streaming();
        let dir = std::env::temp_dir().join(format!("uvc-inmem-host-{}", std::process::id()));

        let options = HostOptions {
            frame_count: 2,
            output_dir: Some(dir.clone()),
            enter_low_power: false,
        };
        let report = SimHost::new(sim, device).run(&options).await.unwrap();
        streamer.abort();

        assert_eq!(report.frames, 2);
        assert_eq!(fs::read(dir.join("frame_00000.mjpg")).unwrap().len(), 300);
        assert_eq!(fs::read(dir.join("frame_00001.mjpg")).unwrap().len(), 5000);
        fs::remove_dir_all(&dir).unwrap();
    }
}
