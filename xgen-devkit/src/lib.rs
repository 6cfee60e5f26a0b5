/*!
# XGEN DevKit - broker-less testing for inverter sessions

- [`MockTransport`]: records connects, subscriptions and publishes, and
  replays broker events into a session
- [`InverterPayload`]: realistic reply payloads
- [`TestHarness`]: a session wired to a mock transport and a collecting
  observer
*/

pub mod mock_transport;
pub mod test_utils;

pub use mock_transport::{InverterPayload, MockMessage, MockTransport};
pub use test_utils::TestHarness;
