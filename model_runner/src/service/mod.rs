mod dispatch;

use std::{borrow::Cow, collections::VecDeque};

use comms::{Device, Packet};
use log::{debug, info, warn};

use crate::{
    config::WindowConfig,
    inference::Scheduler,
    model::{BlockStore, Interpreter, ModelStore},
    sampling::Sampler,
    settings::{CONFIG_KEY, SettingsStore},
    transfer::{Ports, PredictSession, Progress, Upload},
};

/// Largest pipe chunk the service writes.
pub const PIPE_CHUNK: usize = 1024;

/// A unit of background work, run to completion after the packet that queued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Runs the model over the window.
    Invoke,
    /// A pipe chunk for the upload or the prediction owning `port`.
    Chunk { port: u16, data: Vec<u8> },
    /// The remote side closed `port`.
    Close { port: u16 },
}

/// The whole inference service, owned by a single task.
pub struct Service {
    settings: Box<dyn SettingsStore>,
    model: ModelStore,
    sampler: Sampler,
    scheduler: Scheduler,
    config_blob: Vec<u8>,
    devices: Vec<Device>,
    upload: Option<Upload>,
    predict: Option<PredictSession>,
    ports: Ports,
    jobs: VecDeque<Job>,
    outbox: Vec<Packet<'static>>,
}

impl Service {
    /// Brings the service up from its persisted state.
    ///
    /// An invalid stored configuration leaves the service unconfigured, a missing or
    /// broken model ends up in the sticky error.
    ///
    /// # Args
    /// * `settings` - The persisted settings.
    /// * `blocks` - The storage holding the model.
    /// * `interpreter` - The interpreter running the model.
    pub fn start(
        mut settings: Box<dyn SettingsStore>,
        blocks: Box<dyn BlockStore>,
        interpreter: Box<dyn Interpreter>,
    ) -> Self {
        let mut config_blob = settings.get(CONFIG_KEY).unwrap_or_default();

        let config = match WindowConfig::parse(&config_blob) {
            Ok(config) => config.unwrap_or_default(),
            Err(e) => {
                warn!("ignoring the stored configuration: {e}");
                config_blob.clear();
                WindowConfig::default()
            }
        };

        let mut model = ModelStore::new(blocks, interpreter);
        model.load(settings.as_mut());

        info!(
            collectors = config.collectors.len(),
            model_size = model.model_size();
            "service started"
        );

        Self {
            settings,
            model,
            sampler: Sampler::new(config),
            scheduler: Scheduler::new(),
            config_blob,
            devices: Vec::new(),
            upload: None,
            predict: None,
            ports: Ports::new(),
            jobs: VecDeque::new(),
            outbox: Vec::new(),
        }
    }

    /// Runs every queued job, one at a time and in order.
    pub fn work(&mut self) {
        while let Some(job) = self.jobs.pop_front() {
            match job {
                Job::Invoke => {
                    let total = self.sampler.total_samples();
                    self.scheduler.run(
                        &mut self.model,
                        self.sampler.window(),
                        total,
                        &mut self.outbox,
                    );

                    if !self.model.is_ready() {
                        self.drop_predict();
                    }
                }
                Job::Chunk { port, data } => self.on_chunk(port, &data),
                Job::Close { port } => self.on_close(port),
            }
        }
    }

    /// Takes the packets produced since the last call.
    pub fn take_outbox(&mut self) -> Vec<Packet<'static>> {
        std::mem::take(&mut self.outbox)
    }

    fn on_chunk(&mut self, port: u16, data: &[u8]) {
        if let Some(upload) = self.upload.as_mut().filter(|u| u.port() == port) {
            match upload.accept(data, &mut self.model) {
                Ok(Progress::Pending) => {}
                Ok(Progress::Complete) => {
                    info!(port, size = upload.declared(); "model upload committed");
                    self.end_upload();
                }
                Err(e) => {
                    warn!(port, received = upload.received(); "aborting model upload: {e}");
                    self.end_upload();
                }
            }
            return;
        }

        if let Some(session) = self.predict.as_mut().filter(|p| p.input_port() == port) {
            if session.accept(data) == Progress::Complete {
                self.run_predict();
            }
            return;
        }

        debug!(port; "dropping chunk for a closed pipe");
    }

    fn on_close(&mut self, port: u16) {
        if let Some(upload) = self.upload.take_if(|u| u.port() == port) {
            warn!(
                port,
                received = upload.received(),
                declared = upload.declared();
                "model upload closed early"
            );
            self.model.load(self.settings.as_mut());
            return;
        }

        if let Some(session) = self.predict.take_if(|p| p.input_port() == port) {
            debug!(port; "prediction input closed early");
            self.outbox.push(Packet::PipeClose {
                port: session.output_port(),
            });
        }
    }

    /// Closes the upload pipe and reloads whatever the region holds.
    fn end_upload(&mut self) {
        if let Some(upload) = self.upload.take() {
            self.outbox.push(Packet::PipeClose {
                port: upload.port(),
            });
        }

        self.model.load(self.settings.as_mut());
    }

    fn run_predict(&mut self) {
        let Some(session) = self.predict.take() else {
            return;
        };

        let output = session.output_port();

        match self.model.invoke(&session.input()) {
            Ok(outputs) => {
                let bytes: &[u8] = bytemuck::cast_slice(&outputs);

                for chunk in bytes.chunks(PIPE_CHUNK) {
                    self.outbox.push(Packet::Pipe {
                        port: output,
                        data: Cow::Owned(chunk.to_vec()),
                    });
                }
            }
            Err(e) => warn!(port = output; "prediction failed: {e}"),
        }

        self.outbox.push(Packet::PipeClose { port: output });
        self.outbox.push(Packet::PipeClose {
            port: session.input_port(),
        });
    }

    /// Closes both ports of a prediction that won't complete.
    fn drop_predict(&mut self) {
        if let Some(session) = self.predict.take() {
            self.outbox.push(Packet::PipeClose {
                port: session.input_port(),
            });
            self.outbox.push(Packet::PipeClose {
                port: session.output_port(),
            });
        }
    }

    fn owns_port(&self, port: u16) -> bool {
        self.upload.as_ref().is_some_and(|u| u.port() == port)
            || self.predict.as_ref().is_some_and(|p| p.input_port() == port)
    }

    pub fn model(&self) -> &ModelStore {
        &self.model
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The raw configuration blob currently applied.
    pub fn config_blob(&self) -> &[u8] {
        &self.config_blob
    }

    /// Jobs queued and not yet worked on.
    pub fn pending_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn upload(&self) -> Option<&Upload> {
        self.upload.as_ref()
    }
}
