use std::time::{Duration, Instant};

/// Emits a `debug` event with the elapsed wall time when dropped.
///
/// ```
/// let _t = frameblend::Stopwatch::start("blur sequential");
/// // ... work ...
/// ```
pub struct Stopwatch {
    label: &'static str,
    started: Instant,
}

impl Stopwatch {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        let ms = self.started.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(label = self.label, elapsed_ms = ms, "stage finished");
    }
}
