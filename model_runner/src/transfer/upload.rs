use log::debug;

use super::Progress;
use crate::{
    error::{Result, ServiceErr},
    model::{HEADER_SIZE, ModelStore},
};

/// A model body being streamed into the block store.
///
/// The first `HEADER_SIZE` bytes are held back and written only once every other
/// byte is stored, so an interrupted upload leaves a region without a valid header.
#[derive(Debug)]
pub struct Upload {
    port: u16,
    declared: usize,
    received: usize,
    header: [u8; HEADER_SIZE],
}

impl Upload {
    /// Creates a new `Upload` for an already allocated region.
    ///
    /// # Arguments
    /// * `port` - The pipe port the body arrives on.
    /// * `declared` - The total model size, at least `HEADER_SIZE`.
    pub fn new(port: u16, declared: usize) -> Self {
        Self {
            port,
            declared,
            received: 0,
            header: [0; HEADER_SIZE],
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn declared(&self) -> usize {
        self.declared
    }

    pub fn received(&self) -> usize {
        self.received
    }

    /// Stores the next chunk of the body.
    ///
    /// # Arguments
    /// * `chunk` - The bytes following everything received so far.
    /// * `model` - The store the region lives in.
    ///
    /// # Returns
    /// `Progress::Complete` once the header got committed, or a
    /// `ServiceErr::Configuration` if the chunk overflows the declared size or
    /// leaves the running offset unaligned before the end.
    pub fn accept(&mut self, chunk: &[u8], model: &mut ModelStore) -> Result<Progress> {
        let offset = self.received;
        let end = offset + chunk.len();

        if end > self.declared {
            return Err(ServiceErr::Configuration(format!(
                "upload overflows the declared {} bytes",
                self.declared
            )));
        }

        if end < self.declared && end % HEADER_SIZE != 0 {
            return Err(ServiceErr::Configuration(format!(
                "upload offset {end} is not aligned to {HEADER_SIZE} bytes"
            )));
        }

        let staged = HEADER_SIZE.saturating_sub(offset).min(chunk.len());
        self.header[offset..offset + staged].copy_from_slice(&chunk[..staged]);

        if staged < chunk.len() {
            model.write(offset + staged, &chunk[staged..])?;
        }

        self.received = end;
        debug!(port = self.port, received = end, declared = self.declared; "upload chunk stored");

        if end < self.declared {
            return Ok(Progress::Pending);
        }

        model.write(0, &self.header)?;
        Ok(Progress::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DenseInterpreter, MemoryBlockStore};

    fn store(size: usize) -> ModelStore {
        let mut model = ModelStore::new(
            Box::new(MemoryBlockStore::new(1024)),
            Box::new(DenseInterpreter::new()),
        );
        model.allocate(size).unwrap();
        model
    }

    fn blob() -> Vec<u8> {
        DenseInterpreter::encode(4, &[1.0; 8], &[0.0, 1.0])
    }

    #[test]
    fn header_is_written_last() {
        let blob = blob();
        let mut model = store(blob.len());
        let mut upload = Upload::new(1, blob.len());

        let (head, tail) = blob.split_at(16);
        assert_eq!(upload.accept(head, &mut model).unwrap(), Progress::Pending);
        assert_eq!(model.model_size(), 0);

        assert_eq!(upload.accept(tail, &mut model).unwrap(), Progress::Complete);
        assert_eq!(model.model_size(), blob.len());
    }

    #[test]
    fn final_chunk_may_be_unaligned() {
        let mut model = store(20);
        let mut upload = Upload::new(1, 20);

        assert!(upload.accept(&[1; 8], &mut model).is_ok());
        assert!(upload.accept(&[2; 8], &mut model).is_ok());
        assert_eq!(upload.accept(&[3; 4], &mut model).unwrap(), Progress::Complete);
        assert_eq!(upload.received(), 20);
    }

    #[test]
    fn running_offset_must_stay_aligned() {
        let blob = blob();
        let mut model = store(blob.len());
        let mut upload = Upload::new(1, blob.len());

        assert!(upload.accept(&blob[..4], &mut model).is_err());

        let mut upload = Upload::new(1, blob.len());
        assert!(upload.accept(&blob[..8], &mut model).is_ok());
        assert!(upload.accept(&blob[8..12], &mut model).is_err());
        assert_eq!(model.model_size(), 0);
    }

    #[test]
    fn overflow_is_rejected_before_writing() {
        let mut model = store(16);
        let mut upload = Upload::new(1, 16);

        assert!(upload.accept(&[0; 8], &mut model).is_ok());
        let err = upload.accept(&[7; 16], &mut model).unwrap_err();

        assert!(matches!(err, ServiceErr::Configuration(_)));
        assert_eq!(upload.received(), 8);
        assert_eq!(model.model_size(), 0);
    }
}
