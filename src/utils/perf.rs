//! Latency bookkeeping
//!
//! Used to report how long recognizer passes and conversation turns take.

use std::collections::VecDeque;
use std::time::Duration;

/// Tracks timing samples over a sliding window
#[derive(Debug, Clone)]
pub struct TimingTracker {
    label: &'static str,
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl TimingTracker {
    /// Create a tracker keeping the last `max_samples` measurements
    pub fn new(label: &'static str, max_samples: usize) -> Self {
        Self {
            label,
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&mut self, duration: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
    }

    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().max().copied().unwrap_or(Duration::ZERO)
    }

    pub fn last(&self) -> Option<Duration> {
        self.samples.back().copied()
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    /// One-line summary for debug logs
    pub fn summary(&self) -> String {
        format!(
            "{}: last {}ms, avg {}ms, max {}ms over {} samples",
            self.label,
            self.last().unwrap_or(Duration::ZERO).as_millis(),
            self.average().as_millis(),
            self.max().as_millis(),
            self.count()
        )
    }
}
