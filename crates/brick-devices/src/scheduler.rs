//! Per-device recurring refresh task.
//!
//! Each scheduler owns one worker thread that sleeps on a condition variable
//! until its deadline, runs the tick callback, then computes the next deadline
//! from the moment the tick finished. Fires of one scheduler never overlap.
//!
//! - [`RefreshScheduler::arm`] starts the worker, first fire one period later.
//! - [`RefreshScheduler::rearm`] replaces the pending deadline with
//!   `now + period`. A tick already running completes first.
//! - [`RefreshScheduler::cancel`] stops the worker and joins it, so once it
//!   returns the callback never runs again.

use crate::error::{DeviceError, Result};
use crate::types::RefreshStats;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Callback run on every fire.
pub type Tick = Box<dyn Fn() -> Result<()> + Send + 'static>;

#[derive(Debug)]
struct Timer {
    period: Duration,
    deadline: Instant,
    cancelled: bool,
    firing: bool,
    // Bumped on every rearm so a tick in flight does not overwrite the new deadline
    generation: u64,
    worker: Option<ThreadId>,
}

#[derive(Debug)]
struct Shared {
    timer: Mutex<Timer>,
    wake: Condvar,
    ticks: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug)]
pub struct RefreshScheduler {
    name: String,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    /// Create an unarmed scheduler. `name` labels the worker thread and logs.
    pub fn new(name: impl Into<String>, period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(DeviceError::InvalidPeriod);
        }
        Ok(Self {
            name: name.into(),
            shared: Arc::new(Shared {
                timer: Mutex::new(Timer {
                    period,
                    deadline: Instant::now() + period,
                    cancelled: false,
                    firing: false,
                    generation: 0,
                    worker: None,
                }),
                wake: Condvar::new(),
                ticks: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        })
    }

    pub fn period(&self) -> Duration {
        self.shared.timer.lock().period
    }

    pub fn is_armed(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            ticks: self.shared.ticks.load(Ordering::Relaxed),
            failures: self.shared.failures.load(Ordering::Relaxed),
        }
    }

    /// True when called from inside this scheduler's tick callback.
    pub fn on_worker_thread(&self) -> bool {
        self.shared.timer.lock().worker == Some(thread::current().id())
    }

    /// Start firing `tick` every period. No-op if already armed.
    pub fn arm(&self, tick: Tick) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        {
            let mut timer = self.shared.timer.lock();
            if timer.cancelled {
                return Err(DeviceError::Scheduler(format!(
                    "{} was cancelled",
                    self.name
                )));
            }
            timer.deadline = Instant::now() + timer.period;
            timer.generation += 1;
        }
        let shared = Arc::clone(&self.shared);
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(format!("refresh-{}", self.name))
            .spawn(move || run(shared, tick, name))
            .map_err(|e| DeviceError::Scheduler(format!("spawn failed: {e}")))?;
        *worker = Some(handle);
        debug!(scheduler = %self.name, "armed");
        Ok(())
    }

    /// Replace the period and restart the countdown from now.
    ///
    /// Called from another thread this waits for a tick in flight to finish,
    /// so no fire under the old schedule happens after it returns.
    pub fn rearm(&self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(DeviceError::InvalidPeriod);
        }
        let mut timer = self.shared.timer.lock();
        let on_worker = timer.worker == Some(thread::current().id());
        if !on_worker {
            while timer.firing {
                self.shared.wake.wait(&mut timer);
            }
        }
        timer.period = period;
        timer.deadline = Instant::now() + period;
        timer.generation += 1;
        self.shared.wake.notify_all();
        debug!(scheduler = %self.name, period_ms = period.as_millis() as u64, "rearmed");
        Ok(())
    }

    /// Stop the worker and wait for it to exit. From inside a tick the join
    /// is skipped; the worker exits as soon as that tick returns.
    pub fn cancel(&self) {
        let on_worker = {
            let mut timer = self.shared.timer.lock();
            timer.cancelled = true;
            self.shared.wake.notify_all();
            timer.worker == Some(thread::current().id())
        };
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if on_worker {
            return;
        }
        if handle.join().is_err() {
            error!(scheduler = %self.name, "refresh worker panicked");
        }
        debug!(scheduler = %self.name, "cancelled");
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn run(shared: Arc<Shared>, tick: Tick, name: String) {
    let mut timer = shared.timer.lock();
    timer.worker = Some(thread::current().id());
    loop {
        if timer.cancelled {
            break;
        }
        let now = Instant::now();
        if now < timer.deadline {
            let wait = timer.deadline - now;
            shared.wake.wait_for(&mut timer, wait);
            continue;
        }

        timer.firing = true;
        let generation = timer.generation;
        let outcome = MutexGuard::unlocked(&mut timer, || catch_unwind(AssertUnwindSafe(|| tick())));
        match outcome {
            Ok(Ok(())) => {
                shared.ticks.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                shared.failures.fetch_add(1, Ordering::Relaxed);
                warn!(scheduler = %name, error = %e, "refresh tick dropped");
            }
            Err(_) => {
                shared.failures.fetch_add(1, Ordering::Relaxed);
                error!(scheduler = %name, "refresh tick panicked");
            }
        }

        timer.firing = false;
        if timer.generation == generation {
            timer.deadline = Instant::now() + timer.period;
        }
        shared.wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brick_bus::BusError;
    use std::sync::atomic::AtomicUsize;

    fn counting() -> (Arc<AtomicUsize>, Tick) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let tick: Tick = Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (count, tick)
    }

    #[test]
    fn test_zero_period_is_rejected() {
        assert!(matches!(
            RefreshScheduler::new("zero", Duration::ZERO),
            Err(DeviceError::InvalidPeriod)
        ));
        let s = RefreshScheduler::new("ok", Duration::from_millis(10)).unwrap();
        assert!(matches!(s.rearm(Duration::ZERO), Err(DeviceError::InvalidPeriod)));
    }

    #[test]
    fn test_first_fire_waits_one_period() {
        let s = RefreshScheduler::new("first", Duration::from_millis(300)).unwrap();
        let (count, tick) = counting();
        s.arm(tick).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        thread::sleep(Duration::from_millis(350));
        assert!(count.load(Ordering::SeqCst) >= 1);
        s.cancel();
    }

    #[test]
    fn test_fires_repeatedly() {
        let s = RefreshScheduler::new("repeat", Duration::from_millis(20)).unwrap();
        let (count, tick) = counting();
        s.arm(tick).unwrap();
        thread::sleep(Duration::from_millis(300));
        s.cancel();
        assert!(count.load(Ordering::SeqCst) >= 3);
        assert_eq!(s.stats().ticks as usize, count.load(Ordering::SeqCst));
    }

    #[test]
    fn test_arm_twice_keeps_one_worker() {
        let s = RefreshScheduler::new("twice", Duration::from_millis(40)).unwrap();
        let (count, tick) = counting();
        let (other, tick2) = counting();
        s.arm(tick).unwrap();
        s.arm(tick2).unwrap();
        thread::sleep(Duration::from_millis(150));
        s.cancel();
        assert!(count.load(Ordering::SeqCst) >= 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rearm_uses_new_period_once() {
        let s = RefreshScheduler::new("rearm", Duration::from_secs(10)).unwrap();
        let (count, tick) = counting();
        s.arm(tick).unwrap();
        thread::sleep(Duration::from_millis(50));
        s.rearm(Duration::from_millis(200)).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        thread::sleep(Duration::from_millis(200));
        // fired at ~200ms, next due at ~400ms
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(s.period(), Duration::from_millis(200));
        s.cancel();
    }

    #[test]
    fn test_cancel_joins_and_stops_firing() {
        let s = RefreshScheduler::new("cancel", Duration::from_millis(10)).unwrap();
        let (count, tick) = counting();
        s.arm(tick).unwrap();
        thread::sleep(Duration::from_millis(60));
        s.cancel();
        let after = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(count.load(Ordering::SeqCst), after);
        assert!(!s.is_armed());
        let (_, tick) = counting();
        assert!(matches!(s.arm(tick), Err(DeviceError::Scheduler(_))));
    }

    #[test]
    fn test_failing_ticks_keep_the_schedule_alive() {
        let s = RefreshScheduler::new("failing", Duration::from_millis(15)).unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = attempts.clone();
        s.arm(Box::new(move || {
            let n = a.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 0 {
                Err(BusError::Communication("link down".into()).into())
            } else if n == 1 {
                panic!("listener blew up");
            } else {
                Ok(())
            }
        }))
        .unwrap();
        thread::sleep(Duration::from_millis(250));
        s.cancel();
        let stats = s.stats();
        assert!(attempts.load(Ordering::SeqCst) >= 4);
        assert!(stats.failures >= 3);
        assert!(stats.ticks >= 1);
    }
}
