//! Pipe based bulk transfers: model uploads and one-shot predictions.

mod predict;
mod upload;

pub use predict::PredictSession;
pub use upload::Upload;

/// Outcome of feeding a chunk into a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More bytes are expected.
    Pending,
    /// Every expected byte arrived.
    Complete,
}

/// Hands out pipe ports, zero is never used.
#[derive(Debug, Default)]
pub struct Ports {
    last: u16,
}

impl Ports {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next free port.
    pub fn next(&mut self) -> u16 {
        self.last = self.last.checked_add(1).unwrap_or(1);
        self.last
    }
}
