//! Update pump: the single entry point for data coming from accessories.
//!
//! Pushed events and scheduled polls are sent as [`InboundUpdate`] messages
//! on one `mpsc` channel. A dispatcher task fans them out to one worker per
//! accessory; each worker applies its messages strictly in arrival order, and
//! workers of different accessories run concurrently.
//!
//! The dispatcher never waits on a worker. When an accessory's queue is full
//! the message is dropped and the worker is asked to resync: once its queue
//! is drained it polls the accessory, which supersedes every dropped message.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use hkbridge_domain::id::{Aid, ServiceRef};
use hkbridge_domain::service::CharacteristicUpdates;

use crate::ports::{AccessoryTransport, EventPublisher};
use crate::reconciler::Reconciler;

/// One message for the pump.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundUpdate {
    /// Changed values only (event notification, poll diff).
    Partial {
        service: ServiceRef,
        values: CharacteristicUpdates,
    },
    /// The complete value set of a service.
    Snapshot {
        service: ServiceRef,
        values: CharacteristicUpdates,
    },
    /// Request a full poll of the accessory.
    Poll(Aid),
}

impl InboundUpdate {
    #[must_use]
    pub fn aid(&self) -> Aid {
        match self {
            Self::Partial { service, .. } | Self::Snapshot { service, .. } => service.aid,
            Self::Poll(aid) => *aid,
        }
    }
}

struct Worker {
    sender: mpsc::Sender<InboundUpdate>,
    resync: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Queue `update` without waiting. Returns the update back if the worker
    /// is gone.
    fn offer(&self, aid: Aid, update: InboundUpdate) -> Result<(), InboundUpdate> {
        match self.sender.try_send(update) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(update)) => {
                if !self.resync.swap(true, Ordering::AcqRel) {
                    if matches!(update, InboundUpdate::Poll(_)) {
                        tracing::debug!(%aid, "update worker busy, poll coalesced");
                    } else {
                        tracing::warn!(%aid, "update worker queue full, resync scheduled");
                    }
                }
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(update)) => Err(update),
        }
    }
}

/// Dispatcher of inbound updates to per-accessory workers.
pub struct UpdatePump<T, P> {
    reconciler: Arc<Reconciler<T, P>>,
    inbound: mpsc::Receiver<InboundUpdate>,
    worker_capacity: usize,
}

impl<T, P> UpdatePump<T, P>
where
    T: AccessoryTransport + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Spawn the dispatcher.
    ///
    /// The task ends once every sender of `inbound` is dropped and all
    /// queued updates have been applied.
    pub fn start(
        reconciler: Arc<Reconciler<T, P>>,
        inbound: mpsc::Receiver<InboundUpdate>,
        worker_capacity: usize,
    ) -> JoinHandle<()> {
        let pump = Self {
            reconciler,
            inbound,
            worker_capacity: worker_capacity.max(1),
        };
        tokio::spawn(pump.run())
    }

    async fn run(mut self) {
        let mut workers: HashMap<Aid, Worker> = HashMap::new();
        while let Some(update) = self.inbound.recv().await {
            let aid = update.aid();
            let worker = workers
                .entry(aid)
                .or_insert_with(|| self.spawn_worker(aid));
            if let Err(update) = worker.offer(aid, update) {
                tracing::warn!(%aid, "update worker stopped unexpectedly, restarting");
                let replacement = self.spawn_worker(aid);
                if replacement.offer(aid, update).is_err() {
                    tracing::error!(%aid, "update dropped, worker unavailable");
                }
                workers.insert(aid, replacement);
            }
        }

        tracing::debug!(workers = workers.len(), "inbound channel closed, draining workers");
        for (aid, worker) in workers {
            drop(worker.sender);
            if let Err(err) = worker.handle.await {
                tracing::warn!(%aid, %err, "update worker ended abnormally");
            }
        }
    }

    fn spawn_worker(&self, aid: Aid) -> Worker {
        let (sender, receiver) = mpsc::channel(self.worker_capacity);
        let resync = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_worker(
            Arc::clone(&self.reconciler),
            aid,
            receiver,
            Arc::clone(&resync),
        ));
        tracing::debug!(%aid, "update worker started");
        Worker {
            sender,
            resync,
            handle,
        }
    }
}

async fn run_worker<T, P>(
    reconciler: Arc<Reconciler<T, P>>,
    aid: Aid,
    mut receiver: mpsc::Receiver<InboundUpdate>,
    resync: Arc<AtomicBool>,
) where
    T: AccessoryTransport + Send + Sync,
    P: EventPublisher + Send + Sync,
{
    loop {
        // The resync poll only runs on an empty queue, so it is never
        // followed by messages older than the values it reads.
        let update = match receiver.try_recv() {
            Ok(update) => update,
            Err(mpsc::error::TryRecvError::Empty) if resync.swap(false, Ordering::AcqRel) => {
                InboundUpdate::Poll(aid)
            }
            Err(mpsc::error::TryRecvError::Empty) => match receiver.recv().await {
                Some(update) => update,
                None => break,
            },
            Err(mpsc::error::TryRecvError::Disconnected) => {
                if !resync.swap(false, Ordering::AcqRel) {
                    break;
                }
                InboundUpdate::Poll(aid)
            }
        };
        let result = match update {
            InboundUpdate::Partial { service, values } => {
                reconciler.apply_update(service, values).await.map(drop)
            }
            InboundUpdate::Snapshot { service, values } => {
                reconciler.apply_full_snapshot(service, values).await.map(drop)
            }
            InboundUpdate::Poll(aid) => reconciler.poll(aid).await.map(drop),
        };
        if let Err(err) = result {
            tracing::warn!(%aid, %err, "failed to apply inbound update");
        }
    }
    tracing::debug!(%aid, "update worker stopped");
}

/// Periodic poller feeding [`InboundUpdate::Poll`] for every mirrored
/// accessory into the pump.
pub struct Poller<T, P> {
    reconciler: Arc<Reconciler<T, P>>,
    sender: mpsc::Sender<InboundUpdate>,
    interval: Duration,
}

impl<T, P> Poller<T, P>
where
    T: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    /// Spawn the poll loop. The first round is sent immediately.
    ///
    /// The task ends when the pump's receiver is gone.
    pub fn start(
        reconciler: Arc<Reconciler<T, P>>,
        sender: mpsc::Sender<InboundUpdate>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let poller = Self {
            reconciler,
            sender,
            interval,
        };
        tokio::spawn(poller.run())
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            for aid in self.reconciler.aids() {
                match self.sender.try_send(InboundUpdate::Poll(aid)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!(%aid, "update pump saturated, poll skipped this round");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::debug!("update pump closed, poller stopping");
                        return;
                    }
                }
            }
        }
    }
}
