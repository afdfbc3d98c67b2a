use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
    },
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::CdsError;
use crate::{common::ResourceKey, stunner_config::StunnerConfig};

pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Default)]
struct TopicState {
    last: Option<Arc<StunnerConfig>>,
    retired: bool,
    subscribers: HashMap<u64, mpsc::Sender<Arc<StunnerConfig>>>,
}

impl TopicState {
    /// Nothing left to serve: no subscriber, and either no config or the final empty one of a retired Gateway.
    fn is_idle(&self) -> bool {
        self.subscribers.is_empty() && (self.last.is_none() || self.retired)
    }

    fn fan_out(&mut self, key: &ResourceKey, config: Arc<StunnerConfig>) -> usize {
        let mut delivered = 0;
        self.subscribers.retain(|id, sender| match sender.try_send(config.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            },
            Err(TrySendError::Full(_)) => {
                warn!("subscriber {id} of {key} is too slow, dropping it");
                false
            },
            Err(TrySendError::Closed(_)) => false,
        });
        delivered
    }
}

#[derive(Debug, Default)]
struct Topic {
    state: Mutex<TopicState>,
}

impl Topic {
    fn lock(&self) -> MutexGuard<'_, TopicState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct DistributorInner {
    topics: RwLock<HashMap<ResourceKey, Topic>>,
    queue_capacity: usize,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl DistributorInner {
    fn read_topics(&self) -> RwLockReadGuard<'_, HashMap<ResourceKey, Topic>> {
        self.topics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_topics(&self) -> RwLockWriteGuard<'_, HashMap<ResourceKey, Topic>> {
        self.topics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the state of `key`, creating the topic if needed.
    ///
    /// The topic map stays read locked while `f` runs, topics are only removed under the write lock.
    fn with_topic<T>(&self, key: &ResourceKey, f: impl FnOnce(&mut TopicState) -> T) -> T {
        {
            let topics = self.read_topics();
            if let Some(topic) = topics.get(key) {
                let mut state = topic.lock();
                return f(&mut state);
            }
        }
        let mut topics = self.write_topics();
        let topic = topics.entry(key.clone()).or_default();
        let mut state = topic.lock();
        f(&mut state)
    }

    fn remove_if_idle(&self, key: &ResourceKey) {
        let mut topics = self.write_topics();
        if topics.get(key).is_some_and(|topic| topic.lock().is_idle()) {
            topics.remove(key);
            debug!("dropped topic {key}");
        }
    }

    fn unwatch(&self, key: &ResourceKey, id: u64) {
        let idle = {
            let topics = self.read_topics();
            let Some(topic) = topics.get(key) else {
                return;
            };
            let mut state = topic.lock();
            state.subscribers.remove(&id);
            state.is_idle()
        };
        if idle {
            self.remove_if_idle(key);
        }
        debug!("unwatch {key} subscriber {id}");
    }
}

/// Latest rendered config per Gateway and the subscribers waiting for the next one.
///
/// Each key has its own lock, publishing never waits for a subscriber: a subscriber whose queue is full is dropped
/// and has to watch again.
#[derive(Clone, Debug)]
pub struct ConfigDistributor {
    inner: Arc<DistributorInner>,
}

impl Default for ConfigDistributor {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ConfigDistributor {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(DistributorInner {
                topics: RwLock::new(HashMap::new()),
                queue_capacity: queue_capacity.max(1),
                next_id: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Stores `config` as the latest for `key` and fans it out, returns the number of subscribers it was queued for.
    pub fn publish(&self, key: &ResourceKey, config: StunnerConfig) -> Result<usize, CdsError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(CdsError::Closed);
        }
        let delivered = self.inner.with_topic(key, |state| {
            state.retired = false;
            if state.last.as_deref() == Some(&config) {
                return None;
            }
            let config = Arc::new(config);
            state.last = Some(config.clone());
            Some(state.fan_out(key, config))
        });
        match delivered {
            Some(delivered) => {
                info!("published config for {key} to {delivered} subscribers");
                Ok(delivered)
            },
            None => Ok(0),
        }
    }

    /// Publishes the empty config of a Gateway that is gone or no longer managed.
    ///
    /// Current subscribers receive it. The topic is dropped once nobody watches it, a later [`publish`](Self::publish)
    /// brings it back.
    pub fn retire(&self, key: &ResourceKey) -> Result<usize, CdsError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(CdsError::Closed);
        }
        let config = Arc::new(StunnerConfig::empty(&key.to_string()));
        let (delivered, idle) = self.inner.with_topic(key, |state| {
            state.retired = true;
            let delivered = if state.last.as_ref() == Some(&config) {
                0
            } else {
                state.last = Some(config.clone());
                state.fan_out(key, config)
            };
            (delivered, state.is_idle())
        });
        if idle {
            self.inner.remove_if_idle(key);
        }
        info!("retired {key}, {delivered} subscribers notified");
        Ok(delivered)
    }

    pub fn load(&self, key: &ResourceKey) -> Option<Arc<StunnerConfig>> {
        self.inner.read_topics().get(key).and_then(|topic| topic.lock().last.clone())
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.load(key).is_some()
    }

    /// Registers a subscriber, the latest config, if any, is already queued when this returns.
    pub fn watch(&self, key: &ResourceKey) -> Result<Subscription, CdsError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(CdsError::Closed);
        }
        let (sender, receiver) = mpsc::channel(self.inner.queue_capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.with_topic(key, |state| {
            if let Some(last) = &state.last {
                // capacity is at least one and the channel is fresh
                let _ = sender.try_send(last.clone());
            }
            state.subscribers.insert(id, sender);
        });
        if self.inner.closed.load(Ordering::Acquire) {
            self.inner.unwatch(key, id);
        }
        debug!("watch {key} subscriber {id}");
        Ok(Subscription { id, key: key.clone(), receiver, distributor: Arc::downgrade(&self.inner) })
    }

    /// Latest configs in key order, optionally restricted to one namespace.
    pub fn list(&self, namespace: Option<&str>) -> Vec<Arc<StunnerConfig>> {
        let topics = self.inner.read_topics();
        let mut configs: Vec<(&ResourceKey, Arc<StunnerConfig>)> = topics
            .iter()
            .filter(|(key, _)| namespace.map_or(true, |namespace| key.namespace == namespace))
            .filter_map(|(key, topic)| topic.lock().last.clone().map(|config| (key, config)))
            .collect();
        configs.sort_by(|(this, _), (other, _)| this.cmp(other));
        let configs = configs.into_iter().map(|(_, config)| config).collect();
        configs
    }

    #[cfg(test)]
    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self.inner.read_topics().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn subscriber_count(&self, key: &ResourceKey) -> usize {
        self.inner.read_topics().get(key).map_or(0, |topic| topic.lock().subscribers.len())
    }

    /// Ends every open subscription and refuses further publishes and watches.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for topic in self.inner.read_topics().values() {
            topic.lock().subscribers.clear();
        }
        info!("config distribution stopped");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Stream of configs for one key, unregisters itself when dropped.
///
/// The stream ends when the subscriber was dropped for being too slow or the distributor shut down.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    key: ResourceKey,
    receiver: mpsc::Receiver<Arc<StunnerConfig>>,
    distributor: Weak<DistributorInner>,
}

impl Subscription {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub async fn recv(&mut self) -> Option<Arc<StunnerConfig>> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = Arc<StunnerConfig>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(distributor) = self.distributor.upgrade() {
            distributor.unwatch(&self.key, self.id);
        }
    }
}
