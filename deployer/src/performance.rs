//! Workflow performance tracking
//!
//! A workflow records a Unix timestamp when it starts and hands it to
//! [`track_performance`] as its last step. The returned record carries the
//! elapsed wall-clock time alongside fixed status metadata.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const STATUS_COMPLETED: &str = "completed";
pub const WORKFLOW_VERSION: &str = "v1.0";

#[derive(Error, Debug, PartialEq)]
pub enum PerformanceError {
    #[error("Start time must be a finite number of seconds, got {0}")]
    InvalidTimestamp(f64),

    #[error("Start time {start_time} is later than end time {end_time}")]
    StartAfterEnd { start_time: f64, end_time: f64 },
}

/// Elapsed time of one workflow run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceRecord {
    pub total_execution_time_ms: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub status: String,
    pub workflow_version: String,
}

/// Start times at most this far ahead of our clock are treated as "now".
///
/// Callers read their start time from their own clock, which may round the
/// same instant up by a few ulps relative to ours.
const CLOCK_SKEW_TOLERANCE_SECS: f64 = 0.001;

/// Current time as fractional seconds since the Unix epoch, at full clock
/// precision
pub fn now_seconds() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) / 1_000_000_000.0
}

/// Build the record for a run that started at `start_time` and ended now
pub fn track_performance(start_time: f64) -> Result<PerformanceRecord, PerformanceError> {
    let mut end_time = now_seconds();
    if end_time < start_time && start_time - end_time <= CLOCK_SKEW_TOLERANCE_SECS {
        end_time = start_time;
    }
    record_between(start_time, end_time)
}

/// Build the record for a run between two timestamps.
///
/// Elapsed milliseconds are truncated toward zero.
pub fn record_between(
    start_time: f64,
    end_time: f64,
) -> Result<PerformanceRecord, PerformanceError> {
    if !start_time.is_finite() {
        return Err(PerformanceError::InvalidTimestamp(start_time));
    }
    if !end_time.is_finite() {
        return Err(PerformanceError::InvalidTimestamp(end_time));
    }
    if end_time < start_time {
        return Err(PerformanceError::StartAfterEnd {
            start_time,
            end_time,
        });
    }

    let total_time = end_time - start_time;
    let total_execution_time_ms = (total_time * 1000.0) as i64;
    debug!("Workflow took {} ms", total_execution_time_ms);

    Ok(PerformanceRecord {
        total_execution_time_ms,
        start_time,
        end_time,
        status: STATUS_COMPLETED.to_string(),
        workflow_version: WORKFLOW_VERSION.to_string(),
    })
}
