mod runtime;
mod window;

pub use runtime::RuntimeConfig;
pub use window::{Binding, CollectorSpec, SampleType, WindowConfig};
