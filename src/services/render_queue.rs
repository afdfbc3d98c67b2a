use std::{
    collections::{HashSet, VecDeque},
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::Notify;

#[derive(Debug)]
struct QueueState<K> {
    pending: VecDeque<K>,
    queued: HashSet<K>,
    in_flight: HashSet<K>,
    dirty: HashSet<K>,
    closed: bool,
}

impl<K> Default for QueueState<K> {
    fn default() -> Self {
        Self { pending: VecDeque::new(), queued: HashSet::new(), in_flight: HashSet::new(), dirty: HashSet::new(), closed: false }
    }
}

/// Work queue of keys to render.
///
/// A key is queued at most once and handed to at most one worker at a time. A key pushed while it is being rendered
/// is queued again once the worker calls [`RenderQueue::done`].
#[derive(Debug)]
pub struct RenderQueue<K> {
    state: Arc<Mutex<QueueState<K>>>,
    notify: Arc<Notify>,
}

impl<K> Clone for RenderQueue<K> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state), notify: Arc::clone(&self.notify) }
    }
}

impl<K> Default for RenderQueue<K> {
    fn default() -> Self {
        Self { state: Arc::new(Mutex::new(QueueState::default())), notify: Arc::new(Notify::new()) }
    }
}

impl<K> RenderQueue<K>
where
    K: Clone + Eq + Hash,
{
    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false if the queue is closed.
    pub fn push(&self, key: K) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        if state.in_flight.contains(&key) {
            state.dirty.insert(key);
        } else if state.queued.insert(key.clone()) {
            state.pending.push_back(key);
            self.notify.notify_one();
        }
        true
    }

    pub fn extend(&self, keys: impl IntoIterator<Item = K>) {
        for key in keys {
            self.push(key);
        }
    }

    /// Waits for the next key, `None` once the queue is closed.
    pub async fn next(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(key) = state.pending.pop_front() {
                    state.queued.remove(&key);
                    state.in_flight.insert(key.clone());
                    if !state.pending.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Releases a key taken with [`RenderQueue::next`].
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.in_flight.remove(key);
        if state.dirty.remove(key) && !state.closed && state.queued.insert(key.clone()) {
            state.pending.push_back(key.clone());
            self.notify.notify_one();
        }
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
