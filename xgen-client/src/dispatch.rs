//! Inbound message path: bytes → JSON object → flat telemetry → observer.
//!
//! Nothing here propagates an error to the transport. Bad payloads are
//! logged and dropped; failing observers are logged and skipped.

use crate::error::{DecodeError, ObserverError};
use crate::flatten::flatten;
use crate::health::HealthTracker;
use crate::observer::{ObserverRegistry, TelemetryObserver};
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Undecodable; no observer saw it.
    Discarded,
    /// Decoded and handed to the observer slot (which may have been empty
    /// or failed). `full_telemetry` reports the marker field.
    Delivered { full_telemetry: bool },
}

/// Decodes a reply. Invalid UTF-8 sequences are skipped, not fatal.
pub fn decode_payload(payload: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    let text: String = payload.utf8_chunks().map(|chunk| chunk.valid()).collect();
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(object) => Ok(object),
        Value::Array(_) => Err(DecodeError::NotAnObject("array")),
        Value::String(_) => Err(DecodeError::NotAnObject("string")),
        Value::Number(_) => Err(DecodeError::NotAnObject("number")),
        Value::Bool(_) => Err(DecodeError::NotAnObject("bool")),
        Value::Null => Err(DecodeError::NotAnObject("null")),
    }
}

pub struct Dispatcher {
    name: String,
    full_telemetry_key: String,
    /// Serializes observer invocations for this session.
    dispatch_lock: parking_lot::Mutex<()>,
    health: HealthTracker,
}

impl Dispatcher {
    pub fn new(name: &str, full_telemetry_key: &str, health: HealthTracker) -> Self {
        Self {
            name: name.to_string(),
            full_telemetry_key: full_telemetry_key.to_string(),
            dispatch_lock: parking_lot::Mutex::new(()),
            health,
        }
    }

    pub fn dispatch(&self, payload: &[u8], observers: &ObserverRegistry) -> Dispatch {
        self.health.record_message();

        let object = match decode_payload(payload) {
            Ok(object) => object,
            Err(e) => {
                self.health.record_decode_failure();
                error!(
                    "{}: Error: {} while handling message: {:?}",
                    self.name,
                    e,
                    String::from_utf8_lossy(payload)
                );
                return Dispatch::Discarded;
            }
        };

        let full_telemetry = object.contains_key(&self.full_telemetry_key);
        let telemetry = flatten(&object);

        match observers.current() {
            Some(observer) => {
                let _serialized = self.dispatch_lock.lock();
                if let Err(e) = invoke(observer.as_ref(), telemetry) {
                    self.health.record_observer_failure();
                    error!(
                        "{}: Caught error in telemetry observer {}, error: {}",
                        self.name,
                        observer.name(),
                        e
                    );
                }
            }
            None => debug!("{}: no telemetry observer registered, dropping {} keys", self.name, telemetry.len()),
        }

        Dispatch::Delivered { full_telemetry }
    }
}

fn invoke(observer: &dyn TelemetryObserver, telemetry: crate::flatten::Telemetry) -> Result<(), ObserverError> {
    match panic::catch_unwind(AssertUnwindSafe(|| observer.on_telemetry(telemetry))) {
        Ok(result) => result,
        Err(panic) => Err(ObserverError::Panicked(panic_message(panic))),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
