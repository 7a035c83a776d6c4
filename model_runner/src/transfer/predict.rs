use super::Progress;

/// A one-shot prediction collecting its input over a pipe.
#[derive(Debug)]
pub struct PredictSession {
    input_port: u16,
    output_port: u16,
    needed: usize,
    input: Vec<u8>,
}

impl PredictSession {
    /// Creates a new `PredictSession`.
    ///
    /// # Arguments
    /// * `input_port` - The port the input arrives on.
    /// * `output_port` - The port the output is written to.
    /// * `inputs` - The amount of floats in one model input.
    pub fn new(input_port: u16, output_port: u16, inputs: usize) -> Self {
        let needed = inputs * size_of::<f32>();

        Self {
            input_port,
            output_port,
            needed,
            input: Vec::with_capacity(needed),
        }
    }

    pub fn input_port(&self) -> u16 {
        self.input_port
    }

    pub fn output_port(&self) -> u16 {
        self.output_port
    }

    /// Appends input bytes, anything past one model input is dropped.
    pub fn accept(&mut self, chunk: &[u8]) -> Progress {
        let take = (self.needed - self.input.len()).min(chunk.len());
        self.input.extend_from_slice(&chunk[..take]);

        match self.input.len() == self.needed {
            true => Progress::Complete,
            false => Progress::Pending,
        }
    }

    /// The collected input as floats.
    pub fn input(&self) -> Vec<f32> {
        bytemuck::pod_collect_to_vec(&self.input[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_one_input() {
        let mut session = PredictSession::new(1, 2, 2);
        let bytes: Vec<u8> = bytemuck::cast_slice(&[1.5f32, -2.0][..]).to_vec();

        assert_eq!(session.accept(&bytes[..3]), Progress::Pending);
        assert_eq!(session.accept(&bytes[3..]), Progress::Complete);
        assert_eq!(session.accept(&[0xff; 4]), Progress::Complete);
        assert_eq!(session.input(), [1.5, -2.0]);
    }
}
