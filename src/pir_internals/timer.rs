use std::time::{Duration, Instant};

/// Measures wall-clock time between its creation and drop, emitting one `tracing` debug event when dropped.
///
/// Keep the guard bound to a named variable (`let _timer = ...`), binding it to `_` drops it immediately.
pub struct ScopedTimer {
    label: &'static str,
    started_at: Instant,
}

impl ScopedTimer {
    pub fn start(label: &'static str) -> ScopedTimer {
        ScopedTimer {
            label,
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed();
        tracing::debug!(func = self.label, elapsed_secs = elapsed.as_secs_f64(), "func \"{}\" took {:.4?} to execute", self.label, elapsed);
    }
}

/// Runs `f`, timing it with a [`ScopedTimer`] labelled `label`.
pub fn timed<T>(label: &'static str, f: impl FnOnce() -> T) -> T {
    let _timer = ScopedTimer::start(label);
    f()
}
