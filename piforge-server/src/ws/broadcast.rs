use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, trace};

use crate::{AppState, ws::status_frame};

/// Push a fresh status frame to every open connection once per `period`,
/// starting one period from now, until the server shuts down.
pub async fn run(state: AppState, period: Duration) {
    let cancellation_token = state.ws_graceful_shutdown.token.child_token();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(period_ms = period.as_millis() as u64, "status broadcast started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sockets = state.sockets.read().await;
                if sockets.is_empty() {
                    continue;
                }

                let frame = match status_frame(&state.identity) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!(error = %e, "failed to encode status message");
                        continue;
                    }
                };

                let delivered = sockets.broadcast(&frame);
                trace!(delivered, open = sockets.len(), "status broadcast");
            }
            _ = cancellation_token.cancelled() => break,
        }
    }
    debug!("status broadcast stopped");
}

#[cfg(test)]
mod tests {
    use piforge_proto::ServiceStatus;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_broadcast_waits_one_period() {
        let state = AppState::new(ServiceStatus::default(), "unused.html");
        let (_, mut frames) = state.sockets.write().await.register();

        let task = tokio::spawn(run(state.clone(), Duration::from_secs(5)));

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(frames.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let frame = frames.try_recv().unwrap();
        assert_eq!(frame[0], 0x81);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(frames.try_recv().is_ok());

        state.ws_graceful_shutdown.token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_without_connections_is_harmless() {
        let state = AppState::new(ServiceStatus::default(), "unused.html");
        let task = tokio::spawn(run(state.clone(), Duration::from_secs(1)));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(state.sockets.read().await.is_empty());

        state.ws_graceful_shutdown.token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn late_connection_still_gets_broadcasts() {
        let state = AppState::new(ServiceStatus::default(), "unused.html");
        let task = tokio::spawn(run(state.clone(), Duration::from_secs(1)));

        // a few ticks go by with nobody listening
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let (_, mut frames) = state.sockets.write().await.register();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(frames.try_recv().unwrap()[0], 0x81);

        state.ws_graceful_shutdown.token.cancel();
        task.await.unwrap();
    }
}
