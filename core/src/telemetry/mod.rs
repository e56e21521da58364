pub mod log;
pub mod metrics;

pub use log::LogThrottle;
pub use metrics::{AfcMetrics, AfcSnapshot, StreamMetrics, StreamSnapshot};
