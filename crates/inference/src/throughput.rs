use std::time::Instant;

/// Frames processed since the loop started, reported every `log_stride` frames as a
/// cumulative average (total frames over total elapsed time).
#[derive(Debug)]
pub struct ThroughputCounter {
    frames_processed: u64,
    started_at: Instant,
    log_stride: u64,
    reports: u64,
}

impl ThroughputCounter {
    pub fn new(log_stride: u64, started_at: Instant) -> Self {
        Self {
            frames_processed: 0,
            started_at,
            log_stride: log_stride.max(1),
            reports: 0,
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn reports(&self) -> u64 {
        self.reports
    }

    /// Count one frame. Returns the throughput when a report is due.
    ///
    /// A report falling on a zero-length interval is skipped.
    pub fn record(&mut self, now: Instant) -> Option<f64> {
        self.frames_processed += 1;
        if self.frames_processed % self.log_stride != 0 {
            return None;
        }

        let fps = self.average_fps(now)?;
        self.reports += 1;
        Some(fps)
    }

    pub fn average_fps(&self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
        (elapsed > 0.0).then(|| self.frames_processed as f64 / elapsed)
    }
}
