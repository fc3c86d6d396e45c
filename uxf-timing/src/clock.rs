use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of trial timestamps, measured from the clock's own epoch.
pub trait Clock: Clone {
    fn now(&self) -> Duration;

    fn elapsed(&self, since: Duration) -> Duration {
        self.now().saturating_sub(since)
    }

    fn sleep(&self, d: Duration);
}

/// Monotonic wall clock starting at construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    #[cfg(target_os = "linux")]
    fn precise_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let mut req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // A signal cuts the sleep short; resume with what is left.
        loop {
            // SAFETY: `req` and `rem` are valid timespecs owned by this frame.
            let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) };
            if rc != libc::EINTR {
                break;
            }
            req = rem;
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn precise_sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            self.precise_sleep(d)
        }
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.nanos.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, t: Duration) {
        self.nanos.store(t.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    /// Advances the clock instead of blocking.
    fn sleep(&self, d: Duration) {
        self.advance(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(250));
        assert_eq!(other.now(), Duration::from_millis(250));
        other.sleep(Duration::from_millis(750));
        assert_eq!(clock.now(), Duration::from_secs(1));
        assert_eq!(clock.elapsed(Duration::from_millis(400)), Duration::from_millis(600));
        assert_eq!(clock.elapsed(Duration::from_secs(5)), Duration::ZERO);
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.elapsed(before) >= Duration::from_millis(2));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn interrupted_sleep_runs_to_completion() {
        extern "C" fn ignore(_: libc::c_int) {}

        // SAFETY: installs a handler that does nothing.
        unsafe {
            libc::signal(libc::SIGUSR1, ignore as libc::sighandler_t);
        }
        // SAFETY: always safe to call.
        let sleeper = unsafe { libc::pthread_self() };
        let interrupter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            // SAFETY: `sleeper` is still running; it joins this thread below.
            unsafe {
                libc::pthread_kill(sleeper, libc::SIGUSR1);
            }
        });

        let clock = SystemClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(80));
        interrupter.join().unwrap();
        assert!(clock.elapsed(before) >= Duration::from_millis(80));
    }
}
