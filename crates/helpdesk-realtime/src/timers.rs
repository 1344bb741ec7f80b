//! Named, cancellable timers that post messages into an actor mailbox.
//!
//! A [`Timer`] holds at most one running task. Starting it again replaces
//! (and cancels) the previous task; dropping it cancels too.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A named slot for one periodic or one-shot task.
pub struct Timer {
    name: &'static str,
    running: Option<Running>,
}

impl Timer {
    /// Empty timer slot.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: None,
        }
    }

    /// Post `make()` to `tx` every `period`, first after one full period.
    pub fn start_every<T, F>(&mut self, period: Duration, tx: mpsc::Sender<T>, make: F)
    where
        T: Send + 'static,
        F: Fn() -> T + Send + 'static,
    {
        let name = self.name;
        self.spawn(move |cancel| async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        trace!(timer = name, "tick");
                        if tx.send(make()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Post `msg` to `tx` once after `delay`.
    pub fn start_after<T>(&mut self, delay: Duration, tx: mpsc::Sender<T>, msg: T)
    where
        T: Send + 'static,
    {
        let name = self.name;
        self.spawn(move |cancel| async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = time::sleep(delay) => {
                    trace!(timer = name, "fired");
                    let _ = tx.send(msg).await;
                }
            }
        });
    }

    /// Stop the running task, if any.
    pub fn cancel(&mut self) {
        if let Some(running) = self.running.take() {
            trace!(timer = self.name, "cancelled");
            running.cancel.cancel();
        }
    }

    /// Whether a task is armed and has not finished.
    pub fn is_active(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.cancel.is_cancelled() && !r.handle.is_finished())
    }

    fn spawn<F, Fut>(&mut self, body: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(body(cancel.clone()));
        self.running = Some(Running { cancel, handle });
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn periodic_ticks_after_full_period() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = Timer::new("heartbeat");
        timer.start_every(Duration::from_secs(30), tx, || "beat");

        time::sleep(Duration::from_secs(29)).await;
        assert!(rx.try_recv().is_err());

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.try_recv().unwrap(), "beat");

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(rx.try_recv().unwrap(), "beat");
        assert!(timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_ticks() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = Timer::new("heartbeat");
        timer.start_every(Duration::from_secs(1), tx, || ());
        timer.cancel();
        assert!(!timer.is_active());

        time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_fires_once() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = Timer::new("reconnect");
        timer.start_after(Duration::from_secs(5), tx, 7u64);

        time::sleep(Duration::from_millis(4_900)).await;
        assert!(rx.try_recv().is_err());
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.try_recv().unwrap(), 7);

        time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = Timer::new("reconnect");
        timer.start_after(Duration::from_secs(5), tx.clone(), 1u64);
        time::sleep(Duration::from_secs(3)).await;
        timer.start_after(Duration::from_secs(5), tx, 2u64);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(rx.try_recv().unwrap(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let (tx, mut rx) = mpsc::channel(8);
        {
            let mut timer = Timer::new("reconnect");
            timer.start_after(Duration::from_secs(1), tx, ());
        }
        time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }
}
