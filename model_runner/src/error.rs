use std::{error::Error, fmt, io};

/// The model runner's result type.
pub type Result<T> = std::result::Result<T, ServiceErr>;

/// Failures surfaced by the service, either to the host or through the sticky error register.
#[derive(Debug)]
pub enum ServiceErr {
    /// A configuration blob or an upload that violates the expected layout.
    Configuration(String),
    /// A declared model size that does not fit the block store.
    StorageExhausted {
        requested: usize,
        available: usize,
    },
    ModelLoad(String),
    ModelRun(String),
    NoModel,
    UnknownRegister(u16),
    UnknownCommand(u16),
    ReadOnly(u16),
    Io(io::Error),
}

impl fmt::Display for ServiceErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceErr::Configuration(detail) => write!(f, "invalid configuration: {detail}"),
            ServiceErr::StorageExhausted {
                requested,
                available,
            } => write!(
                f,
                "model of {requested} bytes does not fit, only {available} bytes available"
            ),
            ServiceErr::ModelLoad(detail) => write!(f, "model load failed: {detail}"),
            ServiceErr::ModelRun(detail) => write!(f, "model run failed: {detail}"),
            ServiceErr::NoModel => f.write_str("no model"),
            ServiceErr::UnknownRegister(reg) => write!(f, "unknown register {reg:#x}"),
            ServiceErr::UnknownCommand(cmd) => write!(f, "unknown command {cmd:#x}"),
            ServiceErr::ReadOnly(reg) => write!(f, "register {reg:#x} is read-only"),
            ServiceErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for ServiceErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServiceErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ServiceErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ServiceErr> for io::Error {
    fn from(value: ServiceErr) -> Self {
        match value {
            ServiceErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_texts() {
        assert_eq!(ServiceErr::NoModel.to_string(), "no model");
        assert_eq!(
            ServiceErr::ModelRun("tensor mismatch".into()).to_string(),
            "model run failed: tensor mismatch"
        );
    }

    #[test]
    fn io_boundary_keeps_kind() {
        let err: io::Error = ServiceErr::Io(io::ErrorKind::UnexpectedEof.into()).into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err: io::Error = ServiceErr::NoModel.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
