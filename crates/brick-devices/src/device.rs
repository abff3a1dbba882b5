//! The contract every motor and sensor honours, and the polling core that
//! backs it.
//!
//! A concrete device is a [`Decode`] implementation plugged into a
//! [`DeviceCore`]: the core owns the bus handle, the refresh scheduler and the
//! change notifier, and runs `decode` on every tick.

use crate::error::{DeviceError, Result};
use crate::notifier::{ChangeNotifier, Listener, Subscription};
use crate::scheduler::RefreshScheduler;
use crate::types::{ChangeEvent, DeviceKind, DeviceState, FieldValue, RefreshStats};
use brick_bus::{Port, RegisterBus};
use std::collections::BTreeMap;
use parking_lot::ReentrantMutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Common contract of every motor and sensor.
pub trait Device: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// Port the device was bound to at construction.
    fn port(&self) -> Port;

    fn refresh_period(&self) -> Duration;

    /// Cancel the pending refresh and rearm with `period`, first fire one
    /// period from now. No fire scheduled under the old period happens after
    /// this returns.
    fn set_refresh_period(&self, period: Duration) -> Result<()>;

    /// Arm periodic refresh if it is not armed yet. Devices arm themselves at
    /// construction.
    fn arm(&self) -> Result<()>;

    /// Stop refreshing and wait for a tick in flight. Afterwards the cached
    /// fields never change and no event is emitted. Idempotent.
    fn dispose(&self);

    /// Register a listener called synchronously on the thread that detects a
    /// change (refresh worker or commanding thread).
    fn subscribe(&self, listener: Listener) -> Subscription;

    fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe(Arc::new(listener))
    }

    /// Run one decode step on the calling thread. Never overlaps a scheduled
    /// tick of the same device.
    fn refresh(&self) -> Result<()>;

    fn state(&self) -> DeviceState;

    /// Consistent copy of the cached fields.
    fn snapshot(&self) -> BTreeMap<&'static str, FieldValue>;

    fn stats(&self) -> RefreshStats;
}

/// Turns the raw registers of one device into its tracked fields.
pub(crate) trait Decode: Send + Sync + 'static {
    fn decode(&self, bus: &dyn RegisterBus) -> brick_bus::Result<Vec<(&'static str, FieldValue)>>;
}

pub(crate) struct DeviceCore {
    kind: DeviceKind,
    port: Port,
    bus: Arc<dyn RegisterBus>,
    decoder: Box<dyn Decode>,
    notifier: ChangeNotifier,
    scheduler: RefreshScheduler,
    state: AtomicU8,
    // Held for every bus access. Reentrant so listeners may call back in.
    tick: ReentrantMutex<()>,
}

impl DeviceCore {
    /// Build an unarmed core. Call [`DeviceCore::arm`] once construction-time
    /// bus setup has succeeded.
    pub(crate) fn new(
        kind: DeviceKind,
        port: Port,
        bus: Arc<dyn RegisterBus>,
        period: Duration,
        decoder: Box<dyn Decode>,
    ) -> Result<Arc<Self>> {
        let scheduler = RefreshScheduler::new(format!("{kind}-{port}"), period)?;
        info!(
            %kind,
            %port,
            period_ms = period.as_millis() as u64,
            driver = bus.driver(),
            "device created"
        );
        Ok(Arc::new(Self {
            kind,
            port,
            bus,
            decoder,
            notifier: ChangeNotifier::new(port),
            scheduler,
            state: AtomicU8::new(DeviceState::Created.as_u8()),
            tick: ReentrantMutex::new(()),
        }))
    }

    pub(crate) fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub(crate) fn port(&self) -> Port {
        self.port
    }

    pub(crate) fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub(crate) fn state(&self) -> DeviceState {
        DeviceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn ensure_live(&self) -> Result<()> {
        if self.state() == DeviceState::Disposed {
            Err(DeviceError::Disposed)
        } else {
            Ok(())
        }
    }

    fn mark_active(&self) {
        let _ = self.state.compare_exchange(
            DeviceState::Created.as_u8(),
            DeviceState::Active.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Run a command against the bus. Bus errors propagate to the caller.
    pub(crate) fn command<T>(
        &self,
        f: impl FnOnce(&dyn RegisterBus) -> brick_bus::Result<T>,
    ) -> Result<T> {
        let out = self.configure(f)?;
        self.mark_active();
        Ok(out)
    }

    /// Construction-time bus setup. Leaves the device in `Created`.
    pub(crate) fn configure<T>(
        &self,
        f: impl FnOnce(&dyn RegisterBus) -> brick_bus::Result<T>,
    ) -> Result<T> {
        let _guard = self.tick.lock();
        self.ensure_live()?;
        Ok(f(self.bus.as_ref())?)
    }

    pub(crate) fn arm(self: &Arc<Self>) -> Result<()> {
        self.ensure_live()?;
        let weak = Arc::downgrade(self);
        self.scheduler.arm(Box::new(move || match weak.upgrade() {
            Some(core) => core.poll(),
            None => Ok(()),
        }))
    }

    pub(crate) fn refresh_period(&self) -> Duration {
        self.scheduler.period()
    }

    pub(crate) fn set_refresh_period(&self, period: Duration) -> Result<()> {
        self.ensure_live()?;
        self.scheduler.rearm(period)
    }

    pub(crate) fn refresh(&self) -> Result<()> {
        let _guard = self.tick.lock();
        self.ensure_live()?;
        self.decode_and_publish()
    }

    // Scheduler path: a refresh or command in progress on another thread
    // stands in for this tick
    fn poll(&self) -> Result<()> {
        let Some(_guard) = self.tick.try_lock() else {
            debug!(port = %self.port, "bus access in progress, skipping tick");
            return Ok(());
        };
        self.decode_and_publish()
    }

    fn decode_and_publish(&self) -> Result<()> {
        if self.state() == DeviceState::Disposed {
            return Ok(());
        }
        let fields = self.decoder.decode(self.bus.as_ref())?;
        self.mark_active();
        self.notifier.publish_all(fields);
        Ok(())
    }

    pub(crate) fn dispose(&self) {
        let prev = self
            .state
            .swap(DeviceState::Disposed.as_u8(), Ordering::SeqCst);
        if DeviceState::from_u8(prev) == DeviceState::Disposed {
            return;
        }
        self.notifier.close();
        self.scheduler.cancel();
        // Wait out a refresh or command already past its liveness check
        drop(self.tick.lock());
        info!(kind = %self.kind, port = %self.port, "device disposed");
    }

    pub(crate) fn subscribe(&self, listener: Listener) -> Subscription {
        self.notifier.subscribe(listener)
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<&'static str, FieldValue> {
        self.notifier.snapshot()
    }

    pub(crate) fn stats(&self) -> RefreshStats {
        self.scheduler.stats()
    }
}

/// Implement [`Device`] for a type holding its [`DeviceCore`] in `self.core`,
/// and dispose the core when the device is dropped.
macro_rules! impl_device {
    ($type:ty) => {
        impl $crate::device::Device for $type {
            fn kind(&self) -> $crate::types::DeviceKind {
                self.core.kind()
            }

            fn port(&self) -> brick_bus::Port {
                self.core.port()
            }

            fn refresh_period(&self) -> std::time::Duration {
                self.core.refresh_period()
            }

            fn set_refresh_period(&self, period: std::time::Duration) -> $crate::error::Result<()> {
                self.core.set_refresh_period(period)
            }

            fn arm(&self) -> $crate::error::Result<()> {
                self.core.arm()
            }

            fn dispose(&self) {
                self.core.dispose()
            }

            fn subscribe(
                &self,
                listener: $crate::notifier::Listener,
            ) -> $crate::notifier::Subscription {
                self.core.subscribe(listener)
            }

            fn refresh(&self) -> $crate::error::Result<()> {
                self.core.refresh()
            }

            fn state(&self) -> $crate::types::DeviceState {
                self.core.state()
            }

            fn snapshot(
                &self,
            ) -> std::collections::BTreeMap<&'static str, $crate::types::FieldValue> {
                self.core.snapshot()
            }

            fn stats(&self) -> $crate::types::RefreshStats {
                self.core.stats()
            }
        }

        impl Drop for $type {
            fn drop(&mut self) {
                self.core.dispose();
            }
        }
    };
}

pub(crate) use impl_device;
