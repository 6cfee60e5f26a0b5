/*!
# xgen-client

Polls an XGEN inverter over MQTT and hands flattened telemetry to an observer.

- Refresh requests (`"ts"`) go to `xgen/<username>/app`, at most one
  outstanding per interval.
- Replies on `xgen/<username>/dev` are decoded, flattened to dotted keys and
  dispatched; a reply carrying the `oth` group counts as full telemetry.
- Connection failures are retried forever on the network task.

The host drives [`Session::request_tick`] on its own timer.
*/

pub mod config;
pub mod dispatch;
pub mod error;
pub mod flatten;
pub mod health;
pub mod mqtt;
pub mod observer;
pub mod session;
pub mod supervisor;
pub mod throttle;
pub mod transport;

pub use config::{RetryPolicy, SessionConfig};
pub use error::{ConfigError, DecodeError, ObserverError, TransportError};
pub use flatten::{flatten, Telemetry};
pub use health::{ConnectionState, SessionHealth};
pub use observer::{observer_fn, TelemetryObserver};
pub use session::{Session, TickOutcome};
pub use throttle::ThrottleDecision;
pub use transport::{ConnectOutcome, LogLevel, Transport, TransportHandler};
