//! Lock-free session counters and the throughput sampler.

use crate::core::catalog::SessionCounts;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Counters shared by every scan worker
#[derive(Debug, Default)]
pub struct SessionCounters {
    files_processed: AtomicU64,
    files_succeeded: AtomicU64,
    files_failed: AtomicU64,
    files_skipped: AtomicU64,
    directories_seen: AtomicU64,
    directories_succeeded: AtomicU64,
    directories_failed: AtomicU64,
    enumeration_errors: AtomicU64,
    bytes_processed: AtomicU64,
    extraction_fallbacks: AtomicU64,
    extraction_failures: AtomicU64,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a catalogued file. Returns the new processed total.
    pub fn file_succeeded(&self, bytes: u64) -> u64 {
        self.files_succeeded.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
        self.files_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a file that could not be catalogued. Returns the new processed total.
    pub fn file_failed(&self) -> u64 {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
        self.files_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn file_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn directory_seen(&self) {
        self.directories_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn directory_succeeded(&self) {
        self.directories_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn directory_failed(&self) {
        self.directories_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn enumeration_error(&self) {
        self.enumeration_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn extraction_fallback(&self) {
        self.extraction_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn extraction_failure(&self) {
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn files_processed(&self) -> u64 {
        self.files_processed.load(Ordering::Relaxed)
    }

    pub fn files_failed(&self) -> u64 {
        self.files_failed.load(Ordering::Relaxed)
    }

    pub fn directories_seen(&self) -> u64 {
        self.directories_seen.load(Ordering::Relaxed)
    }

    pub fn extraction_fallbacks(&self) -> u64 {
        self.extraction_fallbacks.load(Ordering::Relaxed)
    }

    pub fn extraction_failures(&self) -> u64 {
        self.extraction_failures.load(Ordering::Relaxed)
    }

    /// Point-in-time copy for the session record
    pub fn snapshot(&self) -> SessionCounts {
        let directories_succeeded = self.directories_succeeded.load(Ordering::Relaxed);
        let directories_failed = self.directories_failed.load(Ordering::Relaxed);

        SessionCounts {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_succeeded: self.files_succeeded.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            directories_processed: directories_succeeded + directories_failed,
            directories_succeeded,
            directories_failed,
            enumeration_errors: self.enumeration_errors.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct Sample {
    at: Instant,
    count: u64,
    latest: f64,
    peak: f64,
    taken: u64,
}

/// Samples files/second every `sample_every` processed files
#[derive(Debug)]
pub struct ThroughputMeter {
    started: Instant,
    sample_every: u64,
    state: Mutex<Sample>,
}

impl ThroughputMeter {
    pub fn new(sample_every: u64) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            sample_every: sample_every.max(1),
            state: Mutex::new(Sample {
                at: now,
                count: 0,
                latest: 0.0,
                peak: 0.0,
                taken: 0,
            }),
        }
    }

    /// Feed the processed total; returns a fresh rate when a sample is due
    pub fn record(&self, processed: u64) -> Option<f64> {
        if processed == 0 || processed % self.sample_every != 0 {
            return None;
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.duration_since(state.at).as_secs_f64();
        if elapsed <= 0.0 || processed <= state.count {
            return None;
        }

        let rate = (processed - state.count) as f64 / elapsed;
        state.at = now;
        state.count = processed;
        state.latest = rate;
        state.peak = state.peak.max(rate);
        state.taken += 1;

        Some(rate)
    }

    /// Most recent sampled rate
    pub fn latest(&self) -> f64 {
        self.state.lock().map(|s| s.latest).unwrap_or(0.0)
    }

    pub fn peak(&self) -> f64 {
        self.state.lock().map(|s| s.peak).unwrap_or(0.0)
    }

    pub fn samples(&self) -> u64 {
        self.state.lock().map(|s| s.taken).unwrap_or(0)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Rate over the whole run
    pub fn overall(&self, processed: u64) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            processed as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_updates_are_not_lost() {
        let counters = Arc::new(SessionCounters::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = Arc::clone(&counters);
                thread::spawn(move || {
                    for i in 0..1000 {
                        if i % 10 == 0 {
                            counters.file_failed();
                        } else {
                            counters.file_succeeded(5);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.files_processed, 8000);
        assert_eq!(snapshot.files_failed, 800);
        assert_eq!(snapshot.files_succeeded, 7200);
        assert_eq!(snapshot.bytes_processed, 7200 * 5);
    }

    #[test]
    fn directory_totals_add_up() {
        let counters = SessionCounters::new();
        counters.directory_succeeded();
        counters.directory_succeeded();
        counters.directory_failed();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.directories_processed, 3);
        assert_eq!(snapshot.directories_failed, 1);
    }

    #[test]
    fn meter_samples_on_interval_only() {
        let meter = ThroughputMeter::new(10);
        thread::sleep(std::time::Duration::from_millis(5));

        assert!(meter.record(9).is_none());
        let rate = meter.record(10).unwrap();

        assert!(rate > 0.0);
        assert_eq!(meter.samples(), 1);
        assert_eq!(meter.peak(), rate);
        assert!(meter.record(10).is_none());
    }
}
