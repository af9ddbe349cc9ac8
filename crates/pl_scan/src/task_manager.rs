//! Detached scan execution, decoupled from stream consumers.
//!
//! A scan runs on its own tokio task: the HTTP/SSE request that started it
//! can disconnect, time out, or reattach without touching the producer.
//! Each scan owns a replay buffer (last 1000 events) plus a broadcast
//! channel; late subscribers get the buffer first, then the live feed.
//! Only an explicit pause aborts the producer.
//!
//! A sweeper loop (same shape as the other background loops in this
//! codebase: `tokio::select!` over a sleep and a watch-shutdown) evicts
//! tasks that completed more than a TTL ago.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pl_core::ScanEvent;

/// Events retained for replay to late/reconnecting subscribers.
pub const REPLAY_CAPACITY: usize = 1000;
/// Completed tasks are evicted this long after finishing.
pub const DEFAULT_TASK_TTL: Duration = Duration::from_secs(3600);

/// One detached scan run.
pub struct ScanTask {
    scan_id: Uuid,
    tx: broadcast::Sender<ScanEvent>,
    buffer: Mutex<VecDeque<ScanEvent>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    completed_at: Mutex<Option<Instant>>,
}

impl ScanTask {
    fn new(scan_id: Uuid) -> Arc<Self> {
        let (tx, _) = broadcast::channel(REPLAY_CAPACITY);
        Arc::new(Self {
            scan_id,
            tx,
            buffer: Mutex::new(VecDeque::with_capacity(REPLAY_CAPACITY)),
            handle: Mutex::new(None),
            completed_at: Mutex::new(None),
        })
    }

    /// Record and broadcast one event.  Send errors (no live subscriber)
    /// are expected — the buffer still retains the event for replay.
    pub fn publish(&self, event: ScanEvent) {
        {
            let mut buf = self.buffer.lock();
            if buf.len() == REPLAY_CAPACITY {
                buf.pop_front();
            }
            buf.push_back(event.clone());
        }
        let _ = self.tx.send(event);
    }

    fn subscribe(&self) -> Subscription {
        // Buffer snapshot before subscribing would lose events published in
        // between; subscribing first can only duplicate, and the replay is
        // capped, so take the receiver first.
        let live = self.tx.subscribe();
        let replay: Vec<ScanEvent> = self.buffer.lock().iter().cloned().collect();
        Subscription { replay, live }
    }

    fn mark_completed(&self) {
        let mut done = self.completed_at.lock();
        if done.is_none() {
            *done = Some(Instant::now());
        }
    }

    fn is_completed(&self) -> bool {
        self.completed_at.lock().is_some()
    }

    fn completed_since(&self, ttl: Duration) -> bool {
        self.completed_at
            .lock()
            .map(|at| at.elapsed() >= ttl)
            .unwrap_or(false)
    }

    /// Abort the producer.  Returns false when the task already finished.
    fn pause(&self) -> bool {
        if self.is_completed() {
            return false;
        }
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
        self.mark_completed();
        true
    }
}

/// Replay + live view over one scan's event stream.
pub struct Subscription {
    pub replay: Vec<ScanEvent>,
    pub live: broadcast::Receiver<ScanEvent>,
}

/// A handle producers use to emit events into their task's stream.
#[derive(Clone)]
pub struct EventPublisher {
    task: Arc<ScanTask>,
}

impl EventPublisher {
    pub fn publish(&self, event: ScanEvent) {
        self.task.publish(event);
    }

    pub fn scan_id(&self) -> Uuid {
        self.task.scan_id
    }
}

#[derive(Clone, Default)]
pub struct ScanTaskManager {
    tasks: Arc<RwLock<HashMap<Uuid, Arc<ScanTask>>>>,
}

impl ScanTaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `producer` as a detached task for `scan_id`.  The future runs
    /// to completion regardless of any consumer's lifetime.
    pub async fn start<F, Fut>(&self, scan_id: Uuid, producer: F)
    where
        F: FnOnce(EventPublisher) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let task = ScanTask::new(scan_id);
        let publisher = EventPublisher { task: task.clone() };

        let for_join = task.clone();
        let handle = tokio::spawn(async move {
            producer(publisher).await;
            for_join.mark_completed();
            debug!(scan_id = %scan_id, "scan producer finished");
        });
        *task.handle.lock() = Some(handle);

        let mut tasks = self.tasks.write().await;
        if let Some(previous) = tasks.insert(scan_id, task) {
            // Re-registering the same scan id should not leak a producer.
            warn!(scan_id = %scan_id, "replacing an existing scan task");
            previous.pause();
        }
    }

    /// Replay-then-live view of a scan's events; None for unknown ids.
    pub async fn subscribe(&self, scan_id: Uuid) -> Option<Subscription> {
        let tasks = self.tasks.read().await;
        tasks.get(&scan_id).map(|t| t.subscribe())
    }

    /// Abort a running scan.  Re-entrant: pausing a finished or already
    /// paused scan returns false.
    pub async fn pause(&self, scan_id: Uuid) -> bool {
        let task = {
            let tasks = self.tasks.read().await;
            tasks.get(&scan_id).cloned()
        };
        match task {
            Some(task) => {
                let paused = task.pause();
                if paused {
                    info!(scan_id = %scan_id, "scan paused");
                }
                paused
            }
            None => false,
        }
    }

    pub async fn is_running(&self, scan_id: Uuid) -> bool {
        let tasks = self.tasks.read().await;
        tasks
            .get(&scan_id)
            .map(|t| !t.is_completed())
            .unwrap_or(false)
    }

    /// Drop buffers of scans completed more than `ttl` ago.
    pub async fn evict_completed(&self, ttl: Duration) -> usize {
        let mut tasks = self.tasks.write().await;
        let expired: Vec<Uuid> = tasks
            .iter()
            .filter(|(_, t)| t.completed_since(ttl))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some(task) = tasks.remove(id) {
                // The producer is long gone; a live handle here is a bug.
                if let Some(handle) = task.handle.lock().take() {
                    handle.abort();
                }
                debug!(scan_id = %id, "evicted completed scan buffer");
            }
        }
        expired.len()
    }
}

/// Spawn the periodic eviction sweep.  Returns the task handle and a
/// shutdown sender (`true` stops the loop).
pub fn spawn_sweeper(
    manager: ScanTaskManager,
    interval: Duration,
    ttl: Duration,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "scan buffer sweeper started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("scan buffer sweeper shutting down");
                        return;
                    }
                }
            }
            let evicted = manager.evict_completed(ttl).await;
            if evicted > 0 {
                info!(evicted, "evicted expired scan buffers");
            }
        }
    });

    (handle, shutdown_tx)
}
