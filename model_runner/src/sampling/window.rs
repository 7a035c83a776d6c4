use super::Collector;

/// Fixed-size ring of frames, oldest first.
///
/// A frame is the concatenation of every collector's last sample at one tick.
#[derive(Debug)]
pub struct WindowBuffer {
    frame_len: usize,
    data: Vec<f32>,
}

impl WindowBuffer {
    /// Creates a new zeroed `WindowBuffer`.
    ///
    /// # Arguments
    /// * `frames` - The amount of frames in the window.
    /// * `frame_len` - The amount of floats in each frame.
    pub fn new(frames: usize, frame_len: usize) -> Self {
        Self {
            frame_len,
            data: vec![0.0; frames * frame_len],
        }
    }

    /// Shifts out the oldest frame and appends the collectors' current samples.
    ///
    /// # Arguments
    /// * `collectors` - The collectors, in configuration order.
    ///
    /// # Returns
    /// The frame that was just written.
    pub fn push(&mut self, collectors: &[Collector]) -> &[f32] {
        let Self { frame_len, data } = self;

        if *frame_len == 0 || data.is_empty() {
            return &[];
        }

        data.copy_within(*frame_len.., 0);

        let start = data.len() - *frame_len;
        let mut offset = start;

        for sample in collectors.iter().map(Collector::sample) {
            data[offset..offset + sample.len()].copy_from_slice(sample);
            offset += sample.len();
        }

        &data[start..]
    }

    /// The size in bytes of a frame.
    pub fn frame_size(&self) -> usize {
        self.frame_len * size_of::<f32>()
    }

    /// The most recent frame.
    pub fn latest(&self) -> &[f32] {
        &self.data[self.data.len() - self.frame_len..]
    }

    /// The whole window as floats, oldest frame first.
    pub fn as_floats(&self) -> &[f32] {
        &self.data
    }

    /// The whole window as raw bytes, oldest frame first.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}
