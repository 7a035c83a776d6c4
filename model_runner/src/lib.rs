pub mod config;
pub mod error;
pub mod inference;
pub mod model;
pub mod registers;
pub mod sampling;
pub mod serve;
pub mod service;
pub mod settings;
pub mod transfer;

pub use error::{Result, ServiceErr};
pub use serve::{MonotonicClock, serve};
pub use service::Service;
