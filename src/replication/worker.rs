//! Background replication loop: ticks on an interval, replicates whatever
//! partition is lagging, and stops cleanly on cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::interfaces::{LsmTableOpener, PartitionWriter, ReplicationScheme};
use super::wire::ReplicationTransport;
use super::LsmPartitionReplication;

pub struct ReplicationWorker<S, W, O, T> {
    replication: Arc<LsmPartitionReplication<S, W, O, T>>,
    tick_interval: Duration,
    shutdown: CancellationToken,
}

impl<S, W, O, T> ReplicationWorker<S, W, O, T>
where
    S: ReplicationScheme + 'static,
    W: PartitionWriter + 'static,
    O: LsmTableOpener + 'static,
    T: ReplicationTransport + 'static,
{
    /// Spawn the worker loop on the current tokio runtime. Drop or cancel the
    /// returned token to stop it after its current tick.
    pub fn spawn(
        replication: Arc<LsmPartitionReplication<S, W, O, T>>,
        tick_interval: Duration,
    ) -> (JoinHandle<()>, CancellationToken) {
        let shutdown = CancellationToken::new();
        let worker = ReplicationWorker { replication, tick_interval, shutdown: shutdown.clone() };
        (tokio::spawn(worker.run()), shutdown)
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.shutdown.cancelled() => break,
            }
            if !self.replication.needs_replication() {
                continue;
            }
            match self.replication.replicate().await {
                Ok(true) => log::debug!("replication caught up"),
                Ok(false) => log::warn!("replication incomplete, will retry on next tick"),
                Err(err) => log::error!("replication attempt failed: {err}"),
            }
        }
    }
}
