pub mod config;
pub mod driver;
pub mod performance;

pub use config::{ConfigError, DeployConfig};
pub use driver::{write_summary, DeploymentDriver, DriverError, DriverResult};
pub use performance::{
    record_between, track_performance, PerformanceError, PerformanceRecord, STATUS_COMPLETED,
    WORKFLOW_VERSION,
};
