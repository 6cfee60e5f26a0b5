use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use xgen_client::{Session, TickOutcome};

/// Ticks `session` every `period` until it is closed.
pub fn spawn_poller(session: Session, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("{}: polling every {:?}", session.name(), period);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match session.request_tick().await {
                TickOutcome::Closed => break,
                outcome => {
                    let health = session.health();
                    debug!(
                        "{}: tick {:?} (state {:?}, {} requests, {} messages)",
                        session.name(),
                        outcome,
                        health.connection,
                        health.requests_sent,
                        health.messages_received
                    );
                }
            }
        }
        debug!("{}: poller stopped", session.name());
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use xgen_client::SessionConfig;
    use xgen_devkit::MockTransport;

    #[tokio::test(start_paused = true)]
    async fn test_poller_requests_then_waits_for_reply() {
        let transport = Arc::new(MockTransport::new());
        let cfg = SessionConfig::new("Roof", "c1", "acct", "pw");
        let period = cfg.tick_period();
        let session = Session::new(cfg, transport.clone()).unwrap();

        let handle = spawn_poller(session.clone(), period);

        // First tick fires immediately; the next two fall inside the interval.
        tokio::time::sleep(period * 2 + Duration::from_secs(1)).await;
        assert_eq!(transport.find_messages_by_topic("xgen/acct/app").len(), 1);

        // Past the interval the pending request times out and is re-sent.
        tokio::time::sleep(period * 2).await;
        assert_eq!(transport.find_messages_by_topic("xgen/acct/app").len(), 2);

        session.shutdown().await;
        tokio::time::sleep(period).await;
        assert!(handle.is_finished());
    }
}
