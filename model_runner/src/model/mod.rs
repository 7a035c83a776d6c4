mod dense;
mod interpreter;
mod storage;

use log::{info, warn};

pub use dense::DenseInterpreter;
pub use interpreter::Interpreter;
pub use storage::{BlockStore, ERASED, FileBlockStore, MemoryBlockStore};

use crate::{
    error::{Result, ServiceErr},
    settings::{ARENA_KEY, SettingsStore},
};

/// Size of the model header, only written once the whole body is stored.
pub const HEADER_SIZE: usize = 8;
/// Bytes added on top of a measured arena before persisting it as a hint.
pub const ARENA_MARGIN: u32 = 32;
/// Bytes of the block store reserved for region bookkeeping.
pub const REGION_OVERHEAD: usize = 8;

/// Lifecycle of the stored model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Errored,
}

/// Owner of the persisted model blob and of the interpreter running it.
pub struct ModelStore {
    blocks: Box<dyn BlockStore>,
    interpreter: Box<dyn Interpreter>,
    state: ModelState,
    arena_bytes: u32,
    last_error: Option<ServiceErr>,
}

impl ModelStore {
    /// Creates a new `ModelStore`, nothing is loaded until `load` is called.
    ///
    /// # Arguments
    /// * `blocks` - The storage holding the model region.
    /// * `interpreter` - The interpreter to run the model with.
    pub fn new(blocks: Box<dyn BlockStore>, interpreter: Box<dyn Interpreter>) -> Self {
        Self {
            blocks,
            interpreter,
            state: ModelState::Unloaded,
            arena_bytes: 0,
            last_error: Some(ServiceErr::NoModel),
        }
    }

    /// The size of the stored model, zero unless its header is committed.
    pub fn model_size(&self) -> usize {
        let region = self.blocks.region();

        match region.len() >= HEADER_SIZE && self.interpreter.accepts_header(region) {
            true => region.len(),
            false => 0,
        }
    }

    /// The largest model size an upload may declare.
    pub fn available(&self) -> usize {
        self.blocks.capacity().saturating_sub(REGION_OVERHEAD)
    }

    /// Loads the stored model into the interpreter.
    ///
    /// Errors end up in the sticky error instead of being returned.
    ///
    /// # Arguments
    /// * `settings` - Where the arena hint is read from and persisted into.
    pub fn load(&mut self, settings: &mut dyn SettingsStore) {
        self.interpreter.unload();
        self.arena_bytes = 0;

        let size = self.model_size();
        if size == 0 {
            self.state = ModelState::Unloaded;
            self.last_error = Some(ServiceErr::NoModel);
            return;
        }

        self.state = ModelState::Loading;
        let hint = settings.get_u32(ARENA_KEY);

        match self.interpreter.load(&self.blocks.region()[..size], hint) {
            Ok(arena) => {
                self.state = ModelState::Ready;
                self.arena_bytes = arena;
                self.last_error = None;
                info!(size, arena; "model loaded");

                if hint.is_none() {
                    if let Err(e) = settings.set_u32(ARENA_KEY, arena + ARENA_MARGIN) {
                        warn!("failed to persist the arena hint: {e}");
                    }
                }
            }
            Err(detail) => {
                warn!(size; "model load failed: {detail}");
                self.interpreter.unload();
                self.state = ModelState::Errored;
                self.last_error = Some(ServiceErr::ModelLoad(detail));
            }
        }
    }

    /// Drops the interpreter state, the stored blob and the arena hint.
    ///
    /// # Arguments
    /// * `settings` - Where the arena hint is removed from.
    pub fn erase(&mut self, settings: &mut dyn SettingsStore) -> Result<()> {
        self.interpreter.unload();
        self.arena_bytes = 0;
        self.state = ModelState::Unloaded;
        self.last_error = Some(ServiceErr::NoModel);

        self.blocks.erase()?;
        settings.remove(ARENA_KEY)?;
        Ok(())
    }

    /// Reserves an erased region for an incoming model.
    ///
    /// # Arguments
    /// * `size` - The declared model size.
    ///
    /// # Returns
    /// `ServiceErr::StorageExhausted` without touching storage if `size` doesn't fit.
    pub fn allocate(&mut self, size: usize) -> Result<()> {
        let available = self.available();
        if size > available {
            return Err(ServiceErr::StorageExhausted {
                requested: size,
                available,
            });
        }

        self.blocks.allocate(size)?;
        Ok(())
    }

    /// Writes part of the model at `offset` bytes into the region.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.blocks.write(offset, data)?;
        Ok(())
    }

    /// Runs the loaded model once, without touching the sticky error.
    ///
    /// # Arguments
    /// * `input` - The flattened input tensor.
    pub fn invoke(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if self.state != ModelState::Ready {
            return Err(match self.state {
                ModelState::Unloaded => ServiceErr::NoModel,
                _ => ServiceErr::ModelRun("model is not ready".to_string()),
            });
        }

        self.interpreter.invoke(input).map_err(ServiceErr::ModelRun)
    }

    /// Makes `err` sticky and blocks further runs until a new model loads.
    pub fn fail(&mut self, err: ServiceErr) {
        self.state = ModelState::Errored;
        self.last_error = Some(err);
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ModelState::Ready
    }

    /// Arena bytes allocated by the interpreter, zero while not ready.
    pub fn arena_bytes(&self) -> u32 {
        self.arena_bytes
    }

    pub fn last_error(&self) -> Option<&ServiceErr> {
        self.last_error.as_ref()
    }

    pub fn input_shape(&self) -> Vec<u16> {
        self.interpreter.input_shape()
    }

    pub fn output_shape(&self) -> Vec<u16> {
        self.interpreter.output_shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;

    fn store() -> ModelStore {
        ModelStore::new(
            Box::new(MemoryBlockStore::new(256)),
            Box::new(DenseInterpreter::new()),
        )
    }

    fn write_model(store: &mut ModelStore, blob: &[u8]) {
        store.allocate(blob.len()).unwrap();
        store.write(0, blob).unwrap();
    }

    #[test]
    fn starts_without_model() {
        let mut store = store();
        let mut settings = MemorySettings::new();
        store.load(&mut settings);

        assert_eq!(store.state(), ModelState::Unloaded);
        assert_eq!(store.model_size(), 0);
        assert_eq!(store.last_error().unwrap().to_string(), "no model");
    }

    #[test]
    fn first_load_persists_arena_hint() {
        let mut store = store();
        let mut settings = MemorySettings::new();
        let blob = DenseInterpreter::encode(2, &[1.0, 1.0], &[0.0]);
        write_model(&mut store, &blob);

        store.load(&mut settings);
        assert!(store.is_ready());
        assert!(store.last_error().is_none());
        assert_eq!(store.arena_bytes(), 16);
        assert_eq!(settings.get_u32(ARENA_KEY), Some(16 + ARENA_MARGIN));

        store.load(&mut settings);
        assert_eq!(store.arena_bytes(), 16 + ARENA_MARGIN);
        assert_eq!(store.invoke(&[1.0, 2.0]).unwrap(), [3.0]);
    }

    #[test]
    fn uncommitted_header_reads_as_absent() {
        let mut store = store();
        let mut settings = MemorySettings::new();
        let blob = DenseInterpreter::encode(2, &[1.0, 1.0], &[0.0]);

        store.allocate(blob.len()).unwrap();
        store.write(HEADER_SIZE, &blob[HEADER_SIZE..]).unwrap();
        assert_eq!(store.model_size(), 0);

        store.load(&mut settings);
        assert!(matches!(store.last_error(), Some(ServiceErr::NoModel)));

        store.write(0, &blob[..HEADER_SIZE]).unwrap();
        assert_eq!(store.model_size(), blob.len());
    }

    #[test]
    fn load_error_is_sticky() {
        let mut store = store();
        let mut settings = MemorySettings::new();
        let mut blob = DenseInterpreter::encode(2, &[1.0, 1.0], &[0.0]);
        blob.truncate(blob.len() - 4);
        write_model(&mut store, &blob);

        store.load(&mut settings);
        assert_eq!(store.state(), ModelState::Errored);
        assert!(matches!(store.last_error(), Some(ServiceErr::ModelLoad(_))));
        assert!(store.invoke(&[1.0, 2.0]).is_err());
        assert_eq!(settings.get_u32(ARENA_KEY), None);
    }

    #[test]
    fn erase_drops_hint_and_blob() {
        let mut store = store();
        let mut settings = MemorySettings::new();
        write_model(&mut store, &DenseInterpreter::encode(1, &[1.0], &[0.0]));
        store.load(&mut settings);

        store.erase(&mut settings).unwrap();
        assert_eq!(store.model_size(), 0);
        assert_eq!(store.state(), ModelState::Unloaded);
        assert_eq!(settings.get_u32(ARENA_KEY), None);
        assert!(store.input_shape().is_empty());
    }

    #[test]
    fn allocate_checks_capacity_first() {
        let mut store = store();
        let mut settings = MemorySettings::new();
        write_model(&mut store, &DenseInterpreter::encode(1, &[1.0], &[0.0]));

        let err = store.allocate(256).unwrap_err();
        assert!(matches!(
            err,
            ServiceErr::StorageExhausted {
                requested: 256,
                available: 248
            }
        ));

        store.load(&mut settings);
        assert!(store.is_ready());
    }
}
