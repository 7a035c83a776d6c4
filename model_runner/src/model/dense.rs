use ndarray::{Array1, Array2, ArrayView1};

use super::{HEADER_SIZE, Interpreter};

/// Magic bytes opening a dense model blob.
pub const MAGIC: [u8; 4] = *b"DNS1";

const ARENA_ALIGN: u32 = 16;

/// A single fully connected layer.
///
/// Blob layout: `b"DNS1" u16 inputs u16 outputs` as the header, followed by
/// `inputs * outputs` row-major weights and `outputs` biases, all `f32` little-endian.
#[derive(Debug, Default)]
pub struct DenseInterpreter {
    layer: Option<Layer>,
}

#[derive(Debug)]
struct Layer {
    w: Array2<f32>,
    b: Array1<f32>,
}

impl DenseInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a model blob.
    ///
    /// # Arguments
    /// * `inputs` - The amount of input features.
    /// * `weights` - `inputs * biases.len()` row-major weights.
    /// * `biases` - One bias per output.
    pub fn encode(inputs: u16, weights: &[f32], biases: &[f32]) -> Vec<u8> {
        let outputs = biases.len() as u16;
        debug_assert_eq!(weights.len(), inputs as usize * biases.len());

        let mut blob = Vec::with_capacity(HEADER_SIZE + 4 * (weights.len() + biases.len()));
        blob.extend_from_slice(&MAGIC);
        blob.extend_from_slice(&inputs.to_le_bytes());
        blob.extend_from_slice(&outputs.to_le_bytes());

        for x in weights.iter().chain(biases) {
            blob.extend_from_slice(&x.to_le_bytes());
        }

        blob
    }

    /// The scratch memory needed to run one invocation.
    fn arena_needed(inputs: usize, outputs: usize) -> u32 {
        let bytes = ((inputs + outputs) * size_of::<f32>()) as u32;
        bytes.next_multiple_of(ARENA_ALIGN)
    }
}

fn read_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(size_of::<f32>())
        .map(|x| f32::from_le_bytes([x[0], x[1], x[2], x[3]]))
        .collect()
}

impl Interpreter for DenseInterpreter {
    fn accepts_header(&self, header: &[u8]) -> bool {
        header.len() >= HEADER_SIZE && header[..MAGIC.len()] == MAGIC
    }

    fn load(&mut self, model: &[u8], arena_hint: Option<u32>) -> Result<u32, String> {
        self.layer = None;

        if !self.accepts_header(model) {
            return Err("not a dense model".to_string());
        }

        let inputs = u16::from_le_bytes([model[4], model[5]]) as usize;
        let outputs = u16::from_le_bytes([model[6], model[7]]) as usize;

        if inputs == 0 || outputs == 0 {
            return Err(format!("empty layer {inputs}x{outputs}"));
        }

        let expected = HEADER_SIZE + size_of::<f32>() * (inputs * outputs + outputs);
        if model.len() < expected {
            return Err(format!(
                "model holds {} bytes, a {inputs}x{outputs} layer needs {expected}",
                model.len()
            ));
        }

        let needed = Self::arena_needed(inputs, outputs);
        let arena = match arena_hint {
            Some(hint) if hint < needed => {
                return Err(format!("arena of {hint} bytes is too small, {needed} needed"));
            }
            Some(hint) => hint,
            None => needed,
        };

        let params = read_floats(&model[HEADER_SIZE..expected]);
        let (w, b) = params.split_at(inputs * outputs);

        let w = Array2::from_shape_vec((inputs, outputs), w.to_vec()).map_err(|e| e.to_string())?;
        let b = Array1::from_vec(b.to_vec());

        self.layer = Some(Layer { w, b });
        Ok(arena)
    }

    fn invoke(&mut self, input: &[f32]) -> Result<Vec<f32>, String> {
        let Some(Layer { w, b }) = &self.layer else {
            return Err("no model loaded".to_string());
        };

        if input.len() != w.nrows() {
            return Err(format!(
                "input holds {} values, the model expects {}",
                input.len(),
                w.nrows()
            ));
        }

        let x = ArrayView1::from(input);
        let y = x.dot(w) + b;
        Ok(y.to_vec())
    }

    fn input_shape(&self) -> Vec<u16> {
        match &self.layer {
            Some(layer) => vec![1, layer.w.nrows() as u16],
            None => Vec::new(),
        }
    }

    fn output_shape(&self) -> Vec<u16> {
        match &self.layer {
            Some(layer) => vec![1, layer.w.ncols() as u16],
            None => Vec::new(),
        }
    }

    fn unload(&mut self) {
        self.layer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob() -> Vec<u8> {
        // y0 = x0 + x1 + 0.5, y1 = 2 * x0 - x1
        DenseInterpreter::encode(2, &[1.0, 2.0, 1.0, -1.0], &[0.5, 0.0])
    }

    #[test]
    fn invoke_dense_layer() {
        let mut interp = DenseInterpreter::new();
        let arena = interp.load(&blob(), None).unwrap();

        assert_eq!(arena, 16);
        assert_eq!(interp.input_shape(), [1, 2]);
        assert_eq!(interp.output_shape(), [1, 2]);
        assert_eq!(interp.invoke(&[3.0, 4.0]).unwrap(), [7.5, 2.0]);
        assert!(interp.invoke(&[3.0]).is_err());
    }

    #[test]
    fn arena_hint_is_honored() {
        let mut interp = DenseInterpreter::new();

        assert_eq!(interp.load(&blob(), Some(48)), Ok(48));
        assert!(interp.load(&blob(), Some(8)).is_err());
        assert!(interp.input_shape().is_empty());
    }

    #[test]
    fn rejects_foreign_and_truncated_blobs() {
        let mut interp = DenseInterpreter::new();
        let blob = blob();

        assert!(!interp.accepts_header(&[0xff; 8]));
        assert!(interp.load(&[0xff; 32], None).is_err());
        assert!(interp.load(&blob[..blob.len() - 1], None).is_err());
    }
}
