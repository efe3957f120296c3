use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Frame pacing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Upper bound on processed frames per second. Zero is treated as one.
    pub target_fps: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { target_fps: 60 }
    }
}

impl FrameConfig {
    pub fn with_fps(target_fps: u32) -> Self {
        Self { target_fps }
    }
}

/// Why a wake did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The surface is not visible.
    Hidden,
    /// Less than one target interval since the last processed frame.
    Throttled,
    /// The scheduler was stopped at teardown.
    Stopped,
}

/// Outcome of a wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    /// Run integration and rendering. `dt` is the time since the previous
    /// processed frame (zero for the first one).
    Run { dt: Duration },
    Skip(SkipReason),
}

impl FrameDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, FrameDecision::Run { .. })
    }
}

/// Counters for instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub wakes: u64,
    pub runs: u64,
    pub skipped_hidden: u64,
    pub skipped_throttled: u64,
}

/// Decides, on each "next paintable frame" wake, whether frame work runs.
///
/// The pacing anchor advances by whole intervals so that a wake rate that is
/// not a multiple of the target rate still averages out to the target. After
/// a long gap (hidden surface, stalled host) the anchor resets to the wake
/// time instead of bursting to catch up.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    target_fps: u32,
    interval: Duration,
    hidden: bool,
    stopped: bool,
    paced_at: Option<Duration>,
    last_run: Option<Duration>,
    stats: SchedulerStats,
}

impl FrameScheduler {
    pub fn new(config: FrameConfig) -> Self {
        let target_fps = config.target_fps.max(1);
        Self {
            target_fps,
            interval: Duration::from_nanos(1_000_000_000 / u64::from(target_fps)),
            hidden: false,
            stopped: false,
            paced_at: None,
            last_run: None,
            stats: SchedulerStats::default(),
        }
    }

    pub fn with_fps(target_fps: u32) -> Self {
        Self::new(FrameConfig::with_fps(target_fps))
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        if self.hidden != hidden {
            tracing::debug!(hidden, "frame scheduler visibility changed");
        }
        self.hidden = hidden;
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Stop processing frames for good. Every later wake is skipped.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Timestamp of the last processed frame.
    pub fn last_run(&self) -> Option<Duration> {
        self.last_run
    }

    /// Single entry point per wake.
    pub fn maybe_run_frame(&mut self, now: Duration) -> FrameDecision {
        self.stats.wakes += 1;

        if self.stopped {
            return FrameDecision::Skip(SkipReason::Stopped);
        }
        if self.hidden {
            self.stats.skipped_hidden += 1;
            tracing::trace!("frame skipped: hidden");
            return FrameDecision::Skip(SkipReason::Hidden);
        }

        if let Some(anchor) = self.paced_at {
            let since_anchor = now.saturating_sub(anchor);
            if now < anchor || since_anchor < self.interval {
                self.stats.skipped_throttled += 1;
                return FrameDecision::Skip(SkipReason::Throttled);
            }
            self.paced_at = Some(if since_anchor < self.interval * 2 {
                anchor + self.interval
            } else {
                now
            });
        } else {
            self.paced_at = Some(now);
        }

        let dt = self
            .last_run
            .map(|last| now.saturating_sub(last))
            .unwrap_or(Duration::ZERO);
        self.last_run = Some(now);
        self.stats.runs += 1;
        FrameDecision::Run { dt }
    }
}
