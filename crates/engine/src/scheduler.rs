use crate::event::Timer;
use std::time::Duration;
use tokio::sync::mpsc;

/// Delivers a [`Timer`] back to the engine after a delay.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration, timer: Timer);
}

/// One spawned sleep per timer, posting into the engine's timer channel.
pub struct TokioScheduler {
    timers: mpsc::UnboundedSender<Timer>,
}

impl TokioScheduler {
    pub fn new(timers: mpsc::UnboundedSender<Timer>) -> Self {
        Self { timers }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, timer: Timer) {
        let timers = self.timers.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if timers.send(timer).is_err() {
                tracing::debug!(action = %timer.action, "Engine is gone; dropping timer.");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::RequestKind;

    #[tokio::test]
    async fn timers_fire_after_their_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);
        let timer = Timer {
            action: RequestKind::FetchData,
            epoch: 3,
        };

        scheduler.schedule(Duration::from_millis(20), timer);
        assert!(rx.try_recv().is_err());

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, timer);
    }
}
