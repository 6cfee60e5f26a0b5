//! Telemetry observers and the slot that holds them.

use crate::error::ObserverError;
use crate::flatten::Telemetry;
use std::fmt;
use std::sync::Arc;

/// Receives every flattened reply of a session.
pub trait TelemetryObserver: Send + Sync {
    /// Identity used in logs when the observer fails.
    fn name(&self) -> &str;

    fn on_telemetry(&self, telemetry: Telemetry) -> Result<(), ObserverError>;
}

/// Adapter that turns a closure into an observer.
pub struct FnObserver<F> {
    name: String,
    func: F,
}

impl<F> TelemetryObserver for FnObserver<F>
where
    F: Fn(Telemetry) -> Result<(), ObserverError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_telemetry(&self, telemetry: Telemetry) -> Result<(), ObserverError> {
        (self.func)(telemetry)
    }
}

impl<F> fmt::Debug for FnObserver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver").field("name", &self.name).finish()
    }
}

pub fn observer_fn<F>(name: impl Into<String>, func: F) -> Arc<dyn TelemetryObserver>
where
    F: Fn(Telemetry) -> Result<(), ObserverError> + Send + Sync + 'static,
{
    Arc::new(FnObserver {
        name: name.into(),
        func,
    })
}

/// Single observer slot guarded by its own lock.
///
/// Reading the slot clones the `Arc` and releases the lock, so swapping the
/// observer never waits on a dispatch in progress.
#[derive(Default)]
pub struct ObserverRegistry {
    slot: parking_lot::Mutex<Option<Arc<dyn TelemetryObserver>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `observer`, returning the one it replaced.
    pub fn replace(&self, observer: Arc<dyn TelemetryObserver>) -> Option<Arc<dyn TelemetryObserver>> {
        self.slot.lock().replace(observer)
    }

    pub fn current(&self) -> Option<Arc<dyn TelemetryObserver>> {
        self.slot.lock().clone()
    }

    pub fn clear(&self) -> Option<Arc<dyn TelemetryObserver>> {
        self.slot.lock().take()
    }
}
