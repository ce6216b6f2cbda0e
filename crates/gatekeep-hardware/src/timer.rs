//! Fixed-interval reconnect timer.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Periodic reconnect trigger.
///
/// While armed, a background task sends one tick per `period` on the
/// channel returned by [`ReconnectTimer::new`]. At most one task exists at a
/// time: arming an armed timer and disarming a disarmed one are no-ops.
#[derive(Debug)]
pub struct ReconnectTimer {
    period: Duration,
    tick_tx: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl ReconnectTimer {
    /// Create a disarmed timer and the receiver its ticks arrive on.
    pub fn new(period: Duration) -> (Self, mpsc::Receiver<()>) {
        // A single slot is enough: a pending tick already means "retry now".
        let (tick_tx, tick_rx) = mpsc::channel(1);
        (
            Self {
                period,
                tick_tx,
                task: None,
            },
            tick_rx,
        )
    }

    /// Arm the timer. Returns `false` if it was already armed.
    pub fn arm(&mut self) -> bool {
        if self.is_armed() {
            return false;
        }

        let period = self.period;
        let tick_tx = self.tick_tx.clone();
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                // Full channel: a tick is already pending
                if let Err(mpsc::error::TrySendError::Closed(())) = tick_tx.try_send(()) {
                    break;
                }
            }
        }));
        true
    }

    /// Disarm the timer. Returns `false` if it was not armed.
    pub fn disarm(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Whether a timer task is currently armed.
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Interval between ticks.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_arming_twice_yields_one_timer() {
        let (mut timer, mut ticks) = ReconnectTimer::new(Duration::from_secs(5));

        assert!(timer.arm());
        assert!(!timer.arm());
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_millis(5_001)).await;
        assert!(ticks.try_recv().is_ok());
        assert!(ticks.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_before_period() {
        let (mut timer, mut ticks) = ReconnectTimer::new(Duration::from_secs(5));
        timer.arm();

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(ticks.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_is_idempotent() {
        let (mut timer, mut ticks) = ReconnectTimer::new(Duration::from_secs(5));

        assert!(!timer.disarm());
        timer.arm();
        assert!(timer.disarm());
        assert!(!timer.disarm());
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(ticks.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_after_disarm() {
        let (mut timer, mut ticks) = ReconnectTimer::new(Duration::from_secs(5));
        timer.arm();
        timer.disarm();
        assert!(timer.arm());

        tokio::time::sleep(Duration::from_millis(5_001)).await;
        assert!(ticks.try_recv().is_ok());
    }
}
