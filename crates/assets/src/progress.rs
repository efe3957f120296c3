use serde::{Deserialize, Serialize};

/// Byte counts for an in-flight load. `total_bytes` is `None` when the source
/// did not announce a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadProgress {
    pub loaded_bytes: u64,
    pub total_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "percent", rename_all = "snake_case")]
pub enum ReportedPercent {
    Determinate(u8),
    /// Approximation for unknown totals; always below 100.
    Indeterminate(u8),
}

impl ReportedPercent {
    pub fn value(self) -> u8 {
        match self {
            ReportedPercent::Determinate(p) | ReportedPercent::Indeterminate(p) => p,
        }
    }
}

/// Turns raw progress into a monotone percentage.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    bytes_per_percent: u64,
    last: u8,
}

impl ProgressTracker {
    pub fn new(bytes_per_percent: u64) -> Self {
        Self {
            bytes_per_percent: bytes_per_percent.max(1),
            last: 0,
        }
    }

    /// Report `progress`, never going below the previous report.
    pub fn report(&mut self, progress: LoadProgress) -> ReportedPercent {
        match progress.total_bytes {
            Some(total) if total > 0 => {
                let raw = (progress.loaded_bytes as f64 / total as f64 * 100.0).round();
                let pct = raw.clamp(0.0, 100.0) as u8;
                self.last = self.last.max(pct);
                ReportedPercent::Determinate(self.last)
            }
            _ => {
                let raw = (progress.loaded_bytes as f64 / self.bytes_per_percent as f64).round();
                let pct = raw.min(99.0) as u8;
                // A switch from a determinate total must not push past 99 either.
                self.last = self.last.max(pct).min(99);
                ReportedPercent::Indeterminate(self.last)
            }
        }
    }

    pub fn last(&self) -> u8 {
        self.last
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}
