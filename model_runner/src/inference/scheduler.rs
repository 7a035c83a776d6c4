use std::{borrow::Cow, time::Instant};

use comms::Packet;
use log::{debug, warn};

use crate::{
    error::ServiceErr,
    model::ModelStore,
    registers,
    sampling::WindowBuffer,
};

/// Where the scheduler stands with respect to model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMark {
    /// No run pending, the last one started when the sample counter read `started_at`.
    Idle { started_at: u32 },
    /// A run was queued and hasn't completed yet.
    InFlight,
}

/// Decides when the window is worth a model run and keeps the run statistics.
#[derive(Debug)]
pub struct Scheduler {
    threshold: u16,
    mark: RunMark,
    last_run_us: u32,
    outputs: Vec<f32>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            threshold: 0,
            mark: RunMark::Idle { started_at: 0 },
            last_run_us: 0,
            outputs: Vec::new(),
        }
    }

    /// Arms a run if enough samples arrived since the last one started.
    ///
    /// # Arguments
    /// * `total` - The current sample counter.
    /// * `ready` - Whether the model can be invoked.
    ///
    /// # Returns
    /// Whether a run must be queued, the scheduler is then in flight until `run` completes.
    pub fn maybe_schedule(&mut self, total: u32, ready: bool) -> bool {
        if self.threshold == 0 || !ready {
            return false;
        }

        let RunMark::Idle { started_at } = self.mark else {
            return false;
        };

        if total.wrapping_sub(started_at) < self.threshold as u32 {
            return false;
        }

        self.mark = RunMark::InFlight;
        true
    }

    /// Runs the model over the whole window.
    ///
    /// Failures are recorded as the model's sticky error and never returned.
    ///
    /// # Arguments
    /// * `model` - The model to invoke.
    /// * `window` - The window to feed it.
    /// * `total` - The sample counter at the start of the run.
    /// * `out` - Where the output report is queued.
    pub fn run(
        &mut self,
        model: &mut ModelStore,
        window: &WindowBuffer,
        total: u32,
        out: &mut Vec<Packet<'static>>,
    ) {
        let started_at = total;

        if model.is_ready() {
            let start = Instant::now();

            match model.invoke(window.as_floats()) {
                Ok(outputs) => {
                    self.last_run_us = start.elapsed().as_micros().min(u32::MAX as u128) as u32;
                    self.outputs = outputs;
                    debug!(started_at, us = self.last_run_us; "model run completed");

                    out.push(Packet::Report {
                        reg: registers::OUTPUTS,
                        data: Cow::Owned(self.outputs_bytes()),
                    });
                }
                Err(e) => {
                    warn!(started_at; "{e}");
                    let detail = match e {
                        ServiceErr::ModelRun(detail) => detail,
                        other => other.to_string(),
                    };
                    model.fail(ServiceErr::ModelRun(detail));
                }
            }
        }

        self.mark = RunMark::Idle { started_at };
    }

    /// Forgets the run start mark, used when the sample counter restarts.
    pub fn reset(&mut self) {
        self.mark = RunMark::Idle { started_at: 0 };
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    /// Sets the auto-invoke threshold, zero disables automatic runs.
    pub fn set_threshold(&mut self, threshold: u16) {
        self.threshold = threshold;
    }

    pub fn mark(&self) -> RunMark {
        self.mark
    }

    /// Duration of the last successful run in microseconds.
    pub fn last_run_us(&self) -> u32 {
        self.last_run_us
    }

    pub fn outputs(&self) -> &[f32] {
        &self.outputs
    }

    pub fn outputs_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.outputs).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{DenseInterpreter, MemoryBlockStore},
        settings::MemorySettings,
    };

    fn ready_model(inputs: u16) -> ModelStore {
        let weights = vec![1.0; inputs as usize];
        let blob = DenseInterpreter::encode(inputs, &weights, &[0.0]);

        let mut model = ModelStore::new(
            Box::new(MemoryBlockStore::new(1024)),
            Box::new(DenseInterpreter::new()),
        );
        model.allocate(blob.len()).unwrap();
        model.write(0, &blob).unwrap();
        model.load(&mut MemorySettings::new());
        model
    }

    #[test]
    fn disabled_or_unready_never_schedules() {
        let mut scheduler = Scheduler::new();
        assert!(!scheduler.maybe_schedule(100, true));

        scheduler.set_threshold(2);
        assert!(!scheduler.maybe_schedule(100, false));
        assert_eq!(scheduler.mark(), RunMark::Idle { started_at: 0 });
    }

    #[test]
    fn schedules_once_threshold_is_crossed() {
        let mut scheduler = Scheduler::new();
        scheduler.set_threshold(3);

        assert!(!scheduler.maybe_schedule(2, true));
        assert!(scheduler.maybe_schedule(3, true));
        assert_eq!(scheduler.mark(), RunMark::InFlight);
        assert!(!scheduler.maybe_schedule(10, true));
    }

    #[test]
    fn run_reports_outputs_and_rearms() {
        let mut scheduler = Scheduler::new();
        let mut model = ready_model(4);
        let window = WindowBuffer::new(2, 2);
        let mut out = Vec::new();
        scheduler.set_threshold(2);

        assert!(scheduler.maybe_schedule(2, true));
        scheduler.run(&mut model, &window, 2, &mut out);

        assert_eq!(scheduler.mark(), RunMark::Idle { started_at: 2 });
        assert_eq!(scheduler.outputs(), [0.0]);
        assert_eq!(
            out,
            vec![Packet::Report {
                reg: registers::OUTPUTS,
                data: Cow::Owned(vec![0; 4]),
            }]
        );

        assert!(!scheduler.maybe_schedule(3, true));
        assert!(scheduler.maybe_schedule(4, true));
    }

    #[test]
    fn failed_run_is_sticky() {
        let mut scheduler = Scheduler::new();
        let mut model = ready_model(3);
        let window = WindowBuffer::new(2, 2);
        let mut out = Vec::new();
        scheduler.set_threshold(1);

        assert!(scheduler.maybe_schedule(1, model.is_ready()));
        scheduler.run(&mut model, &window, 1, &mut out);

        assert!(out.is_empty());
        assert!(matches!(model.last_error(), Some(ServiceErr::ModelRun(_))));
        assert!(!scheduler.maybe_schedule(5, model.is_ready()));
        assert_eq!(scheduler.mark(), RunMark::Idle { started_at: 1 });
    }
}
