use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A background activity driven by a fixed delay between ticks.
#[async_trait]
pub(crate) trait Periodic: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn tick(&self);
}

/// Runs `worker` every `period` until `cancel` fires. A tick that already
/// started runs to completion.
pub(crate) fn spawn_periodic<P>(
    worker: P,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    P: Periodic,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => worker.tick().await,
            }
        }
        debug!("{} stopped", worker.name());
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use crate::periodic::{spawn_periodic, Periodic};

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl Periodic for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        async fn tick(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_cancelled() -> anyhow::Result<()> {
        let ticks = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let handle = spawn_periodic(
            Counter(ticks.clone()),
            Duration::from_millis(100),
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        cancel.cancel();
        handle.await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        Ok(())
    }
}
