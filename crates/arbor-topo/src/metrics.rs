// Metrics module for observability
// Lock counters and the held-locks gauge, published through the `metrics` facade

use std::time::Instant;

use arbor_common::ErrorKind;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

pub const LOCK_ACQUIRED_TOTAL: &str = "arbor_lock_acquired_total";
pub const LOCK_RELEASED_TOTAL: &str = "arbor_lock_released_total";
pub const LOCK_WAITS_TOTAL: &str = "arbor_lock_waits_total";
pub const LOCK_ERRORS_TOTAL: &str = "arbor_lock_errors_total";
pub const LOCKS_HELD: &str = "arbor_locks_held";
pub const LOCK_WAIT_SECONDS: &str = "arbor_lock_wait_seconds";

/// Initialize all metric descriptions
/// Should be called once by the harness that installs a recorder
pub fn describe_metrics() {
    describe_counter!(LOCK_ACQUIRED_TOTAL, "Total number of lock grants");
    describe_counter!(LOCK_RELEASED_TOTAL, "Total number of lock releases");
    describe_counter!(
        LOCK_WAITS_TOTAL,
        "Total number of times a caller blocked on a held lock"
    );
    describe_counter!(
        LOCK_ERRORS_TOTAL,
        "Total number of failed lock, try-lock and unlock calls"
    );
    describe_gauge!(LOCKS_HELD, "Number of locks currently held");
    describe_histogram!(
        LOCK_WAIT_SECONDS,
        "Time spent blocked before a contended lock was granted"
    );
}

/// Elapsed-time helper for wait histograms
pub(crate) struct Timer {
    start: Instant,
}

impl Timer {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub(crate) fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

pub(crate) fn record_acquired(cell: &str) {
    counter!(LOCK_ACQUIRED_TOTAL, "cell" => cell.to_string()).increment(1);
    gauge!(LOCKS_HELD).increment(1.0);
}

pub(crate) fn record_released(cell: &str) {
    counter!(LOCK_RELEASED_TOTAL, "cell" => cell.to_string()).increment(1);
    gauge!(LOCKS_HELD).decrement(1.0);
}

pub(crate) fn record_wait(cell: &str) {
    counter!(LOCK_WAITS_TOTAL, "cell" => cell.to_string()).increment(1);
}

pub(crate) fn record_wait_duration(cell: &str, timer: &Timer) {
    histogram!(LOCK_WAIT_SECONDS, "cell" => cell.to_string()).record(timer.elapsed_secs());
}

pub(crate) fn record_error(kind: ErrorKind) {
    counter!(LOCK_ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_secs() >= 0.01);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_acquired("global");
        record_wait("global");
        record_wait_duration("global", &Timer::new());
        record_released("global");
        record_error(ErrorKind::NotLocked);
    }
}
