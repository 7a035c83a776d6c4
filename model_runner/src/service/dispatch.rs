use std::borrow::Cow;

use comms::{Device, Packet};
use log::{debug, info, warn};

use super::{Job, Service};
use crate::{
    config::WindowConfig,
    error::{Result, ServiceErr},
    model::HEADER_SIZE,
    registers,
    sampling::{REMOTE_READING, Sampler},
    settings::CONFIG_KEY,
    transfer::{PredictSession, Upload},
};

const READ_ONLY: [u16; 10] = [
    registers::OUTPUTS,
    registers::INPUT_SHAPE,
    registers::OUTPUT_SHAPE,
    registers::LAST_RUN_TIME,
    registers::ALLOCATED_ARENA_SIZE,
    registers::MODEL_SIZE,
    registers::NUM_SAMPLES,
    registers::FRAME_SIZE,
    registers::CURRENT_SAMPLE,
    registers::LAST_ERROR,
];

fn le_u16(reg: u16, data: &[u8]) -> Result<u16> {
    match data {
        [a, b, ..] => Ok(u16::from_le_bytes([*a, *b])),
        _ => Err(ServiceErr::Configuration(format!(
            "register {reg:#x} takes 2 bytes, got {}",
            data.len()
        ))),
    }
}

impl Service {
    /// Handles one inbound packet.
    ///
    /// Replies and upstream writes are queued in the outbox, background work in the
    /// job queue, see `Service::work`.
    ///
    /// # Args
    /// * `packet` - The received packet.
    /// * `now_ms` - The current time in milliseconds.
    ///
    /// # Returns
    /// An error to report back to the host, the service state stays consistent either way.
    pub fn handle(&mut self, packet: Packet<'_>, now_ms: u64) -> Result<()> {
        debug!(kind = packet.kind(); "dispatching packet");

        match packet {
            Packet::Get { reg } => {
                let data = self.read_register(reg)?;
                self.outbox.push(Packet::Report {
                    reg,
                    data: Cow::Owned(data),
                });
            }
            Packet::Set { reg, data } => self.write_register(reg, &data)?,
            Packet::Command { cmd, data } => {
                let data = self.command(cmd, &data)?;
                self.outbox.push(Packet::Reply {
                    cmd,
                    data: Cow::Owned(data),
                });
            }
            Packet::Announce { device } => self.announce(device),
            Packet::Detach { device } => {
                self.devices.retain(|known| *known != device);
                self.sampler.detach(&device);
            }
            Packet::Sensor { device, reg, data } if reg == REMOTE_READING => {
                self.on_reading(&device, &data, now_ms)
            }
            Packet::Pipe { port, data } if self.owns_port(port) => {
                self.jobs.push_back(Job::Chunk {
                    port,
                    data: data.into_owned(),
                });
            }
            Packet::PipeClose { port } if self.owns_port(port) => {
                self.jobs.push_back(Job::Close { port });
            }
            other => debug!(kind = other.kind(); "ignoring packet"),
        }

        Ok(())
    }

    fn on_reading(&mut self, device: &Device, payload: &[u8], now_ms: u64) {
        if !self
            .sampler
            .on_reading(device, payload, now_ms, &mut self.outbox)
        {
            return;
        }

        let total = self.sampler.total_samples();
        if self.scheduler.maybe_schedule(total, self.model.is_ready()) {
            debug!(total; "model run scheduled");
            self.jobs.push_back(Job::Invoke);
        }
    }

    fn announce(&mut self, device: Device) {
        if !self.devices.contains(&device) {
            self.devices.push(device);
        }

        let setup = self.sampler.attach(device);
        self.outbox.extend(setup);
    }

    fn read_register(&self, reg: u16) -> Result<Vec<u8>> {
        let data = match reg {
            registers::CONFIG => self.config_blob.clone(),
            registers::AUTO_INVOKE_EVERY => self.scheduler.threshold().to_le_bytes().to_vec(),
            registers::STREAM_SAMPLES => vec![self.sampler.stream_samples()],
            registers::OUTPUTS => self.scheduler.outputs_bytes(),
            registers::INPUT_SHAPE | registers::OUTPUT_SHAPE => {
                let shape = if reg == registers::OUTPUT_SHAPE {
                    self.model.output_shape()
                } else {
                    self.model.input_shape()
                };

                shape.iter().flat_map(|dim| dim.to_le_bytes()).collect()
            }
            registers::LAST_RUN_TIME => self.scheduler.last_run_us().to_le_bytes().to_vec(),
            registers::ALLOCATED_ARENA_SIZE => self.model.arena_bytes().to_le_bytes().to_vec(),
            registers::MODEL_SIZE => (self.model.model_size() as u32).to_le_bytes().to_vec(),
            registers::NUM_SAMPLES => self.sampler.total_samples().to_le_bytes().to_vec(),
            registers::FRAME_SIZE => {
                let size = self.sampler.window().frame_size();
                vec![u8::try_from(size).unwrap_or(u8::MAX)]
            }
            registers::CURRENT_SAMPLE => {
                bytemuck::cast_slice(self.sampler.window().latest()).to_vec()
            }
            registers::LAST_ERROR => match self.model.last_error() {
                Some(e) => e.to_string().into_bytes(),
                None => Vec::new(),
            },
            reg => return Err(ServiceErr::UnknownRegister(reg)),
        };

        Ok(data)
    }

    fn write_register(&mut self, reg: u16, data: &[u8]) -> Result<()> {
        match reg {
            registers::CONFIG => self.configure(data)?,
            registers::AUTO_INVOKE_EVERY => {
                let threshold = le_u16(reg, data)?;
                self.scheduler.set_threshold(threshold);
                info!(threshold; "auto-invoke threshold set");
            }
            registers::STREAM_SAMPLES => {
                let Some(&n) = data.first() else {
                    return Err(ServiceErr::Configuration(format!(
                        "register {reg:#x} takes 1 byte"
                    )));
                };
                self.sampler.set_stream_samples(n);
            }
            reg if READ_ONLY.contains(&reg) => return Err(ServiceErr::ReadOnly(reg)),
            reg => return Err(ServiceErr::UnknownRegister(reg)),
        }

        Ok(())
    }

    /// Applies a new configuration blob, rebuilding collectors and the window.
    ///
    /// Writing the blob already in use is a no-op.
    fn configure(&mut self, blob: &[u8]) -> Result<()> {
        if blob == self.config_blob.as_slice() {
            debug!("configuration unchanged");
            return Ok(());
        }

        let config = WindowConfig::parse(blob)?.unwrap_or_default();
        self.settings.set(CONFIG_KEY, blob)?;
        self.config_blob = blob.to_vec();

        info!(
            interval_ms = config.sampling_interval_ms,
            frames = config.samples_in_window,
            collectors = config.collectors.len();
            "configuration applied"
        );

        self.sampler = Sampler::new(config);
        self.scheduler.reset();

        for device in self.devices.clone() {
            let setup = self.sampler.attach(device);
            self.outbox.extend(setup);
        }

        Ok(())
    }

    fn command(&mut self, cmd: u16, data: &[u8]) -> Result<Vec<u8>> {
        match cmd {
            registers::SET_MODEL => {
                let size = match data {
                    [a, b, c, d, ..] => u32::from_le_bytes([*a, *b, *c, *d]) as usize,
                    _ => {
                        return Err(ServiceErr::Configuration(
                            "set model takes a 4 bytes size".to_string(),
                        ));
                    }
                };

                let port = self.set_model(size)?;
                Ok(port.to_le_bytes().to_vec())
            }
            registers::PREDICT => {
                let (input, output) = self.predict()?;
                Ok([input.to_le_bytes(), output.to_le_bytes()].concat())
            }
            cmd => Err(ServiceErr::UnknownCommand(cmd)),
        }
    }

    /// Opens a model upload of `size` bytes.
    ///
    /// Nothing is touched unless the size fits the store.
    ///
    /// # Returns
    /// The pipe port the body is expected on.
    fn set_model(&mut self, size: usize) -> Result<u16> {
        if size < HEADER_SIZE {
            return Err(ServiceErr::Configuration(format!(
                "a model holds at least {HEADER_SIZE} bytes, got {size}"
            )));
        }

        let available = self.model.available();
        if size > available {
            return Err(ServiceErr::StorageExhausted {
                requested: size,
                available,
            });
        }

        if let Some(old) = self.upload.take() {
            warn!(port = old.port(), received = old.received(); "replacing an unfinished upload");
            self.outbox.push(Packet::PipeClose { port: old.port() });
        }

        self.drop_predict();
        self.model.erase(self.settings.as_mut())?;
        self.model.allocate(size)?;

        let port = self.ports.next();
        self.upload = Some(Upload::new(port, size));
        info!(port, size; "model upload accepted");

        Ok(port)
    }

    /// Opens a one-shot prediction.
    ///
    /// # Returns
    /// The input and output pipe ports, or `ServiceErr::NoModel` if the model isn't ready.
    fn predict(&mut self) -> Result<(u16, u16)> {
        if !self.model.is_ready() {
            return Err(ServiceErr::NoModel);
        }

        self.drop_predict();

        let inputs: usize = self
            .model
            .input_shape()
            .iter()
            .map(|&dim| dim as usize)
            .product();

        let (input, output) = (self.ports.next(), self.ports.next());
        self.predict = Some(PredictSession::new(input, output, inputs));
        debug!(input, output, inputs; "prediction opened");

        Ok((input, output))
    }
}
