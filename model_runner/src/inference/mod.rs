mod scheduler;

pub use scheduler::{RunMark, Scheduler};
