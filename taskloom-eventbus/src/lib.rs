#![deny(missing_docs)]
//! Event Bus (C2): in-process typed pub/sub with per-task ordered
//! fan-out (§4.2).
//!
//! [`EventBus`] is a thin fan-out layer over [`taskloom_taskspace`]: a
//! publish assigns a durable `seq` via C1 before broadcasting, and a
//! subscription replays history from `events.log` before tailing a live
//! `tokio::sync::broadcast` channel — a subscriber never observes a gap
//! between "caught up" and "live" regardless of when it attaches.

mod error;

pub use error::EventBusError;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::Stream;
use tokio::sync::broadcast;

use taskloom_taskspace::TaskspaceStore;
use taskloom_types::{Event, TaskId};

/// Per-subscriber bounded queue depth (§4.2). A subscriber that falls
/// this far behind the live broadcast is disconnected with
/// [`EventBusError::SlowConsumer`] rather than silently dropping events.
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

struct TaskChannel {
    tx: broadcast::Sender<Event>,
}

/// In-process typed pub/sub fabric, backed by a [`TaskspaceStore`] for
/// durable sequencing and historical replay.
pub struct EventBus {
    store: Arc<TaskspaceStore>,
    channels: Mutex<HashMap<TaskId, Arc<TaskChannel>>>,
    queue_depth: usize,
}

impl EventBus {
    /// Build a bus over `store`, using the default per-subscriber queue
    /// depth of [`DEFAULT_QUEUE_DEPTH`].
    pub fn new(store: Arc<TaskspaceStore>) -> Self {
        Self::with_queue_depth(store, DEFAULT_QUEUE_DEPTH)
    }

    /// Build a bus with an explicit per-subscriber queue depth.
    pub fn with_queue_depth(store: Arc<TaskspaceStore>, queue_depth: usize) -> Self {
        Self {
            store,
            channels: Mutex::new(HashMap::new()),
            queue_depth,
        }
    }

    fn channel_for(&self, task_id: &TaskId) -> Arc<TaskChannel> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(task_id.clone())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(self.queue_depth);
                Arc::new(TaskChannel { tx })
            })
            .clone()
    }

    /// Append `event` to the task's taskspace, assigning its durable
    /// `seq`, then broadcast it to any live subscribers. Returns the
    /// event as persisted (with `seq` filled in).
    pub async fn publish(&self, task_id: &TaskId, event: Event) -> Result<Event, EventBusError> {
        let event = self.store.append_event(task_id, event).await?;
        let channel = self.channel_for(task_id);
        // No live subscriber is not an error: replay will pick this up
        // from events.log for anyone who subscribes later.
        let _ = channel.tx.send(event.clone());
        tracing::debug!(target: "eventbus", task_id = %task_id, seq = event.seq, "published event");
        Ok(event)
    }

    /// Subscribe to one task's events starting at `from_seq`: replays
    /// `events.log` for `seq >= from_seq`, then tails the live broadcast
    /// channel, deduplicating anything replay already yielded.
    ///
    /// The returned stream ends (yielding a final `SlowConsumer` error)
    /// if the subscriber falls behind the bounded live queue before
    /// catching up — the caller should reconnect with `from_seq` set to
    /// the last `seq` it observed.
    pub fn subscribe(
        &self,
        task_id: TaskId,
        from_seq: u64,
    ) -> impl Stream<Item = Result<Event, EventBusError>> + Send + 'static {
        let store = Arc::clone(&self.store);
        let channel = self.channel_for(&task_id);
        let mut live = channel.tx.subscribe();

        async_stream::stream! {
            let replayed = match store.read_events(&task_id, from_seq).await {
                Ok(events) => events,
                Err(e) => {
                    yield Err(EventBusError::from(e));
                    return;
                }
            };
            let mut last_seq = replayed.last().map(|e| e.seq);
            for event in replayed {
                last_seq = Some(event.seq);
                yield Ok(event);
            }

            loop {
                match live.recv().await {
                    Ok(event) => {
                        if let Some(seen) = last_seq {
                            if event.seq <= seen {
                                continue;
                            }
                        }
                        last_seq = Some(event.seq);
                        yield Ok(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        yield Err(EventBusError::SlowConsumer { task_id: task_id.to_string() });
                        return;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }

    /// Subscribe across all tasks that have ever published through this
    /// bus, for dashboards. Per-task ordering is preserved; no ordering
    /// is guaranteed across tasks, and tasks that start publishing after
    /// this call are not observed.
    pub fn subscribe_all(&self) -> impl Stream<Item = Result<Event, EventBusError>> + Send + 'static {
        use futures::stream::{self, StreamExt};

        let task_ids: Vec<TaskId> = self.channels.lock().unwrap().keys().cloned().collect();
        let streams: Vec<_> = task_ids
            .into_iter()
            .map(|task_id| Box::pin(self.subscribe(task_id, 0)))
            .collect();
        stream::select_all(streams)
    }
}
