//! Plumbing shared by the pipelines: the state cell, the event bus and the
//! set of spawned pipeline tasks.

use crate::events::{ComposerEvent, EventBus};
use crate::state::CompositionState;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handles of in-flight pipeline work, aborted on session teardown.
#[derive(Default)]
pub(crate) struct TaskSet {
    handles: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl TaskSet {
    /// Spawn onto the ambient Tokio runtime. Ignored once closed.
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut handles = self.handles.lock();
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        handles.retain(|h| !h.is_finished());
        handles.push(tokio::spawn(task));
    }

    pub(crate) fn abort_all(&self) {
        let mut handles = self.handles.lock();
        self.closed.store(true, Ordering::SeqCst);
        for handle in handles.drain(..) {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }
}

/// What every pipeline task needs from its session.
#[derive(Clone)]
pub(crate) struct Shared {
    pub(crate) state: Arc<watch::Sender<CompositionState>>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) tasks: Arc<TaskSet>,
}

impl Shared {
    pub(crate) fn new(initial: CompositionState) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state: Arc::new(state),
            events: Arc::new(EventBus::default()),
            tasks: Arc::new(TaskSet::default()),
        }
    }

    /// One atomic state-update step; observers are always notified.
    pub(crate) fn update<R: Default>(&self, f: impl FnOnce(&mut CompositionState) -> R) -> R {
        let mut out = R::default();
        self.state.send_if_modified(|state| {
            out = f(state);
            true
        });
        out
    }

    /// Atomic state-update step that may decline; observers are notified
    /// only when `f` returns `Some`.
    pub(crate) fn update_if<R>(
        &self,
        f: impl FnOnce(&mut CompositionState) -> Option<R>,
    ) -> Option<R> {
        let mut out = None;
        self.state.send_if_modified(|state| {
            out = f(state);
            out.is_some()
        });
        out
    }

    pub(crate) fn snapshot(&self) -> CompositionState {
        self.state.borrow().clone()
    }

    pub(crate) fn emit(&self, event: ComposerEvent) {
        self.events.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_update_if_notifies_only_on_change() {
        let shared = Shared::new(CompositionState::default());
        let mut rx = shared.state.subscribe();

        let declined: Option<()> = shared.update_if(|_| None);
        assert!(declined.is_none());
        assert!(!rx.has_changed().unwrap());

        shared.update_if(|s| {
            s.is_executing = true;
            Some(())
        });
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_executing);
    }

    #[tokio::test]
    async fn test_update_always_notifies_and_returns() {
        let shared = Shared::new(CompositionState::default());
        let mut rx = shared.state.subscribe();

        let len = shared.update(|s| {
            s.generated_query_text = "{ books }".to_string();
            s.generated_query_text.len()
        });
        assert_eq!(len, 9);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().can_execute());

        shared.update(|_| ());
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_all_stops_pending_tasks() {
        let tasks = TaskSet::default();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        assert_eq!(tasks.pending(), 1);

        tasks.abort_all();
        tokio::task::yield_now().await;
        assert_eq!(tasks.pending(), 0);

        tasks.spawn(async {});
        assert_eq!(tasks.pending(), 0);
    }
}
