mod collector;
mod timing;
mod window;

use std::borrow::Cow;

use comms::{Device, Packet};
use log::{debug, info};

pub use collector::{Collector, Phase, REMOTE_READING};
pub use timing::{MAX_CATCH_UP, Reconciler};
pub use window::WindowBuffer;

use crate::{config::WindowConfig, registers};

/// The collection side of the service: collectors, the sampling clock and the window.
#[derive(Debug)]
pub struct Sampler {
    config: WindowConfig,
    collectors: Vec<Collector>,
    clock: Reconciler,
    window: WindowBuffer,
    total_samples: u32,
    stream_samples: u8,
}

impl Sampler {
    /// Builds every collector and a zeroed window for `config`.
    ///
    /// # Arguments
    /// * `config` - The sampling setup, the default one leaves the service unconfigured.
    pub fn new(config: WindowConfig) -> Self {
        let collectors = config.collectors.iter().copied().map(Collector::new).collect();
        let window = WindowBuffer::new(config.samples_in_window as usize, config.frame_len());
        let clock = Reconciler::new(config.sampling_interval_ms);

        Self {
            config,
            collectors,
            clock,
            window,
            total_samples: 0,
            stream_samples: 0,
        }
    }

    /// Offers a newly seen remote instance to the free collectors.
    ///
    /// # Arguments
    /// * `device` - The remote service instance.
    ///
    /// # Returns
    /// The upstream register writes that start its streaming, empty if no collector took it.
    pub fn attach(&mut self, device: Device) -> Vec<Packet<'static>> {
        if self.collectors.iter().any(|c| c.is_attached_to(&device)) {
            return Vec::new();
        }

        let interval = self.config.sampling_interval_ms;

        for collector in &mut self.collectors {
            if collector.try_attach(device) {
                info!(
                    device_id = device.device_id,
                    service_index = device.service_index;
                    "collector attached"
                );
                return collector.setup(interval);
            }
        }

        Vec::new()
    }

    pub fn detach(&mut self, device: &Device) {
        for collector in &mut self.collectors {
            if collector.detach(device) {
                info!(device_id = device.device_id; "collector detached");
            }
        }
    }

    /// Handles a reading coming from a remote instance.
    ///
    /// The reading is wrapped by a pre-phase event, flushing overdue frames under
    /// the stale samples, and a post-phase event committing the fresh frame.
    ///
    /// # Arguments
    /// * `device` - The instance that reported.
    /// * `payload` - The raw reading.
    /// * `now_ms` - The current time in milliseconds.
    /// * `out` - Where streamed frames are queued.
    ///
    /// # Returns
    /// Whether a post-phase frame was pushed.
    pub fn on_reading(
        &mut self,
        device: &Device,
        payload: &[u8],
        now_ms: u64,
        out: &mut Vec<Packet<'static>>,
    ) -> bool {
        let Some(idx) = self.collectors.iter().position(|c| c.is_attached_to(device)) else {
            return false;
        };

        let Some(sample) = self.collectors[idx].decode(payload) else {
            debug!(device_id = device.device_id, len = payload.len(); "ignoring short reading");
            return false;
        };

        self.tick(Phase::Pre, now_ms, out);
        self.collectors[idx].store(sample);
        self.tick(Phase::Post, now_ms, out) > 0
    }

    fn tick(&mut self, phase: Phase, now_ms: u64, out: &mut Vec<Packet<'static>>) -> u64 {
        let frames = self.clock.frames_for(phase, now_ms);

        for _ in 0..frames {
            self.push(out);
        }

        frames
    }

    fn push(&mut self, out: &mut Vec<Packet<'static>>) {
        let frame = self.window.push(&self.collectors);
        self.total_samples = self.total_samples.wrapping_add(1);

        if self.stream_samples > 0 {
            self.stream_samples -= 1;
            out.push(Packet::Report {
                reg: registers::CURRENT_SAMPLE,
                data: Cow::Owned(bytemuck::cast_slice(frame).to_vec()),
            });
        }

        debug!(total = self.total_samples; "frame pushed");
    }

    /// The devices the collectors are attached to.
    pub fn attached(&self) -> impl Iterator<Item = Device> + '_ {
        self.collectors.iter().filter_map(Collector::device)
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn window(&self) -> &WindowBuffer {
        &self.window
    }

    /// The amount of frames pushed since the last (re)configuration.
    pub fn total_samples(&self) -> u32 {
        self.total_samples
    }

    pub fn stream_samples(&self) -> u8 {
        self.stream_samples
    }

    /// Requests the next `n` pushed frames to be reported.
    pub fn set_stream_samples(&mut self, n: u8) {
        self.stream_samples = n;
    }
}
