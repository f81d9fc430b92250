use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Cooperative stop flag shared between a worker loop and whoever owns it.
///
/// Workers check [`StopSignal::is_stopped`] once per iteration and sleep
/// through [`StopSignal::wait`], which returns as soon as a stop is
/// requested. Preemption latency is therefore bounded by the work done in a
/// single loop iteration, never by the length of a sleep.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Calling this more than once is harmless.
    pub fn stop(&self) {
        let (flag, condvar) = &*self.inner;
        *lock(flag) = true;
        condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *lock(&self.inner.0)
    }

    /// Sleeps for `duration` unless a stop arrives first. Returns `true` when
    /// the signal has been stopped.
    pub fn wait(&self, duration: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let guard = lock(flag);
        if *guard || duration.is_zero() {
            return *guard;
        }

        let (guard, _) = condvar
            .wait_timeout_while(guard, duration, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

fn lock(flag: &Mutex<bool>) -> MutexGuard<'_, bool> {
    flag.lock().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn wait_runs_full_duration_without_stop() {
        let signal = StopSignal::new();
        let started = Instant::now();

        assert!(!signal.wait(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn stop_wakes_a_sleeping_worker() {
        let signal = StopSignal::new();
        let remote = signal.clone();
        let started = Instant::now();

        let worker = std::thread::spawn(move || remote.wait(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        signal.stop();

        assert!(worker.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn stop_is_idempotent() {
        let signal = StopSignal::new();
        signal.stop();
        signal.stop();
        assert!(signal.is_stopped());
        assert!(signal.wait(Duration::from_secs(1)));
    }
}
