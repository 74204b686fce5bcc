// crates/network/src/progress.rs
//! Aggregate progress across the files of one download

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Progress of a multi-file transfer
#[derive(Debug, Clone)]
pub struct AggregateProgress {
    /// Sum of all file sizes, when every size is known
    pub total_bytes: Option<u64>,
    pub total_files: usize,
    pub completed_bytes: u64,
    pub completed_files: usize,
    /// Download speed in bytes per second
    pub bytes_per_second: f64,
    in_flight: HashMap<usize, u64>,
    start_time: Instant,
}

impl AggregateProgress {
    /// Creates progress for files with the given sizes
    pub fn new(sizes: &[Option<u64>]) -> Self {
        let total_bytes = sizes.iter().copied().sum::<Option<u64>>();
        Self {
            total_bytes,
            total_files: sizes.len(),
            completed_bytes: 0,
            completed_files: 0,
            bytes_per_second: 0.0,
            in_flight: HashMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Records bytes received so far for file `index`
    pub fn update(&mut self, index: usize, received: u64) {
        self.in_flight.insert(index, received);
        self.refresh_speed();
    }

    /// Marks file `index` finished with `bytes` written
    pub fn complete(&mut self, index: usize, bytes: u64) {
        self.in_flight.remove(&index);
        self.completed_bytes += bytes;
        self.completed_files += 1;
        self.refresh_speed();
    }

    /// Bytes written so far, including files still in flight
    pub fn downloaded_bytes(&self) -> u64 {
        self.completed_bytes + self.in_flight.values().sum::<u64>()
    }

    /// Progress in `0.0..=1.0`
    ///
    /// Uses bytes when every size is known, otherwise completed file count.
    pub fn fraction(&self) -> f64 {
        if self.is_complete() {
            return 1.0;
        }
        if self.total_files == 0 {
            return 0.0;
        }
        match self.total_bytes {
            Some(total) if total > 0 => (self.downloaded_bytes() as f64 / total as f64).min(1.0),
            _ => self.completed_files as f64 / self.total_files as f64,
        }
    }

    /// Returns true once every file has completed
    pub fn is_complete(&self) -> bool {
        self.completed_files >= self.total_files && self.total_files > 0
    }

    fn refresh_speed(&mut self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.bytes_per_second = self.downloaded_bytes() as f64 / elapsed;
        }
    }
}

/// Thread-safe progress tracker
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    inner: Arc<Mutex<AggregateProgress>>,
}

impl ProgressTracker {
    /// Creates a new progress tracker
    pub fn new(sizes: &[Option<u64>]) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AggregateProgress::new(sizes))),
        }
    }

    /// Records in-flight bytes and returns the new fraction
    pub fn update(&self, index: usize, received: u64) -> f64 {
        match self.inner.lock() {
            Ok(mut progress) => {
                progress.update(index, received);
                progress.fraction()
            }
            Err(_) => 0.0,
        }
    }

    /// Records a finished file and returns the new fraction
    pub fn complete(&self, index: usize, bytes: u64) -> f64 {
        match self.inner.lock() {
            Ok(mut progress) => {
                progress.complete(index, bytes);
                progress.fraction()
            }
            Err(_) => 0.0,
        }
    }

    /// Gets current progress
    pub fn get(&self) -> Option<AggregateProgress> {
        self.inner.lock().ok().map(|p| p.clone())
    }

    /// Current fraction in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        self.inner.lock().map(|p| p.fraction()).unwrap_or(0.0)
    }
}
