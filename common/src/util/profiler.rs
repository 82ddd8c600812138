use std::time::{Duration, Instant};

/// Logs the wall time of a flow stage when dropped.
pub struct ScopedTimer {
    stage: &'static str,
    level: log::Level,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(stage: &'static str) -> Self {
        Self::with_level(stage, log::Level::Info)
    }

    pub fn with_level(stage: &'static str, level: log::Level) -> Self {
        log::log!(level, "{} started.", stage);
        Self {
            stage,
            level,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        log::log!(
            self.level,
            "{} done in {:.3} ms.",
            self.stage,
            self.elapsed().as_secs_f64() * 1e3
        );
    }
}
