//! Update Queue & Worker.
//!
//! A single persistent background task is the only consumer of the queue.
//! The queue and the currently-running package name share one guard: a
//! `tokio::sync::Mutex` wrapping both fields, paired with a `Notify` acting
//! as the condition variable that wakes the worker when the queue goes from
//! empty to non-empty.

use crate::cache::InfoCache;
use crate::db::DbController;
use crate::reconciler;
use crate::repository::RepositoryResolver;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

struct QueueState {
    queue: VecDeque<String>,
    current: Option<String>,
}

/// Single-consumer FIFO queue of package names with set semantics on
/// enqueue, plus the worker task that drains it.
pub struct UpdateQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    running: Arc<AtomicBool>,
    db: Arc<dyn DbController>,
    cache: Arc<InfoCache>,
    resolver: Arc<dyn RepositoryResolver>,
}

impl UpdateQueue {
    pub fn new(
        db: Arc<dyn DbController>,
        cache: Arc<InfoCache>,
        resolver: Arc<dyn RepositoryResolver>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                queue: VecDeque::new(),
                current: None,
            })),
            notify: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            db,
            cache,
            resolver,
        }
    }

    /// Enqueue `name` if it isn't already queued, and make sure the worker
    /// task is running. A no-op if `name` is already present — two
    /// back-to-back triggers collapse to one entry.
    pub async fn trigger_update(&self, name: &str) {
        {
            let mut state = self.state.lock().await;
            if !state.queue.iter().any(|queued| queued == name) {
                state.queue.push_back(name.to_string());
            }
        }
        self.notify.notify_one();
        self.ensure_worker_running();
    }

    /// True iff `name` is currently being reconciled or is waiting in the
    /// queue.
    pub async fn is_scheduled_for_update(&self, name: &str) -> bool {
        let state = self.state.lock().await;
        state.current.as_deref() == Some(name) || state.queue.iter().any(|queued| queued == name)
    }

    fn ensure_worker_running(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = self.state.clone();
        let notify = self.notify.clone();
        let running = self.running.clone();
        let db = self.db.clone();
        let cache = self.cache.clone();
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            worker_loop(state, notify, db, cache, resolver).await;
            // Only reached if the loop itself exits, which it never does
            // by design — kept so a future trigger_update can respawn it
            // if it somehow did.
            running.store(false, Ordering::SeqCst);
        });
    }
}

async fn worker_loop(
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    db: Arc<dyn DbController>,
    cache: Arc<InfoCache>,
    resolver: Arc<dyn RepositoryResolver>,
) {
    loop {
        let name = loop {
            let mut guard = state.lock().await;
            if let Some(name) = guard.queue.pop_front() {
                guard.current = Some(name.clone());
                break name;
            }
            drop(guard);
            notify.notified().await;
        };

        // Run the reconciler on its own task so a panic escaping it is
        // caught as a JoinError rather than killing this loop.
        let db_for_task = db.clone();
        let cache_for_task = cache.clone();
        let resolver_for_task = resolver.clone();
        let name_for_task = name.clone();
        let result = tokio::spawn(async move {
            reconciler::reconcile(
                db_for_task.as_ref(),
                cache_for_task.as_ref(),
                resolver_for_task.as_ref(),
                &name_for_task,
            )
            .await
        })
        .await;

        if let Err(join_err) = result {
            log::warn!("reconciler panicked while updating `{}`: {}", name, join_err);
        }

        state.lock().await.current = None;
    }
}
