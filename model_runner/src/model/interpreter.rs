/// The model interpreter the service drives.
///
/// Implementations own everything derived from the model bytes, the service only
/// keeps the blob and the arena size hint.
pub trait Interpreter: Send {
    /// Tells whether `header` starts a model this interpreter understands.
    ///
    /// An erased or partially written region must never be accepted.
    fn accepts_header(&self, header: &[u8]) -> bool;

    /// Prepares the model for invocation.
    ///
    /// # Arguments
    /// * `model` - The whole model blob.
    /// * `arena_hint` - The arena size to allocate, if known from an earlier load.
    ///
    /// # Returns
    /// The arena bytes allocated or a human readable error.
    fn load(&mut self, model: &[u8], arena_hint: Option<u32>) -> Result<u32, String>;

    /// Runs the loaded model once.
    ///
    /// # Arguments
    /// * `input` - The flattened input tensor.
    ///
    /// # Returns
    /// The flattened output tensor or a human readable error.
    fn invoke(&mut self, input: &[f32]) -> Result<Vec<f32>, String>;

    /// The input tensor dimensions, empty while unloaded.
    fn input_shape(&self) -> Vec<u16>;

    /// The output tensor dimensions, empty while unloaded.
    fn output_shape(&self) -> Vec<u16>;

    /// Drops the loaded model.
    fn unload(&mut self);
}
