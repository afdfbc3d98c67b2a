mod index;
mod object;
mod references;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use index::ReferenceIndex;
pub use object::{Kind, Object, ObjectRef, StoredKind};
use tokio::sync::broadcast;
use tracing::debug;

use crate::common::ResourceKey;

const CHANGES_CHANNEL_CAPACITY: usize = 1024;

#[derive(thiserror::Error, Debug, PartialEq, PartialOrd)]
pub enum StorageError {
    #[error("store lock poisoned")]
    LockingError,
}

/// Something a store mutation requires to be rendered again.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderTarget {
    GatewayClass(ResourceKey),
    Gateway(ResourceKey),
}

impl std::fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderTarget::GatewayClass(key) => write!(f, "GatewayClass/{key}"),
            RenderTarget::Gateway(key) => write!(f, "Gateway/{key}"),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<Kind, BTreeMap<ResourceKey, Object>>,
    index: ReferenceIndex,
}

impl Inner {
    fn impacted(&self, origin: &ObjectRef) -> BTreeSet<RenderTarget> {
        self.index
            .impacted(origin)
            .into_iter()
            .filter_map(|impacted| match impacted.kind {
                Kind::Gateway => Some(RenderTarget::Gateway(impacted.key)),
                Kind::GatewayClass => Some(RenderTarget::GatewayClass(impacted.key)),
                _ => None,
            })
            .collect()
    }
}

/// Mirror of the cluster objects the renderer consumes.
///
/// Every mutation reports the render targets it affects, computed from the reverse reference index both before
/// and after the change, and broadcasts them to subscribers.
#[derive(Clone)]
pub struct Store {
    inner: Arc<RwLock<Inner>>,
    changes: broadcast::Sender<BTreeSet<RenderTarget>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGES_CHANNEL_CAPACITY);
        Self { inner: Arc::new(RwLock::new(Inner::default())), changes }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StorageError> {
        self.inner.read().map_err(|_| StorageError::LockingError)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StorageError> {
        self.inner.write().map_err(|_| StorageError::LockingError)
    }

    pub fn upsert(&self, object: impl Into<Object>) -> Result<BTreeSet<RenderTarget>, StorageError> {
        let object = object.into();
        let origin = object.object_ref();
        let impacted = {
            let mut inner = self.write()?;
            let unchanged = inner
                .objects
                .get(&origin.kind)
                .and_then(|objects| objects.get(&origin.key))
                .is_some_and(|stored| stored.resource_version().is_some() && stored.resource_version() == object.resource_version());
            if unchanged {
                return Ok(BTreeSet::new());
            }
            let mut impacted = inner.impacted(&origin);
            inner.index.replace(&origin, references::references(&object));
            inner.objects.entry(origin.kind).or_default().insert(origin.key.clone(), object);
            impacted.extend(inner.impacted(&origin));
            impacted
        };
        debug!("upsert {origin} impacts {impacted:?}");
        self.notify(&impacted);
        Ok(impacted)
    }

    pub fn delete(&self, kind: Kind, key: &ResourceKey) -> Result<BTreeSet<RenderTarget>, StorageError> {
        let origin = ObjectRef::new(kind, key.clone());
        let impacted = {
            let mut inner = self.write()?;
            let Some(_) = inner.objects.get_mut(&kind).and_then(|objects| objects.remove(key)) else {
                return Ok(BTreeSet::new());
            };
            let mut impacted = inner.impacted(&origin);
            inner.index.remove(&origin);
            impacted.extend(inner.impacted(&origin));
            impacted
        };
        debug!("delete {origin} impacts {impacted:?}");
        self.notify(&impacted);
        Ok(impacted)
    }

    fn notify(&self, impacted: &BTreeSet<RenderTarget>) {
        if !impacted.is_empty() {
            // no receivers is fine, nobody renders yet
            let _ = self.changes.send(impacted.clone());
        }
    }

    pub fn get(&self, kind: Kind, key: &ResourceKey) -> Result<Option<Object>, StorageError> {
        Ok(self.read()?.objects.get(&kind).and_then(|objects| objects.get(key)).cloned())
    }

    pub fn get_resource<K: StoredKind>(&self, key: &ResourceKey) -> Result<Option<Arc<K>>, StorageError> {
        Ok(self.get(K::KIND, key)?.as_ref().and_then(K::downcast).cloned())
    }

    pub fn list(&self, kind: Kind) -> Result<Vec<Object>, StorageError> {
        Ok(self.read()?.objects.get(&kind).map(|objects| objects.values().cloned().collect()).unwrap_or_default())
    }

    pub fn keys(&self, kind: Kind) -> Result<BTreeSet<ResourceKey>, StorageError> {
        Ok(self.read()?.objects.get(&kind).map(|objects| objects.keys().cloned().collect()).unwrap_or_default())
    }

    pub fn impacted_gateways(&self, kind: Kind, key: &ResourceKey) -> Result<BTreeSet<ResourceKey>, StorageError> {
        let impacted = self.read()?.impacted(&ObjectRef::new(kind, key.clone()));
        Ok(impacted
            .into_iter()
            .filter_map(|target| match target {
                RenderTarget::Gateway(key) => Some(key),
                RenderTarget::GatewayClass(_) => None,
            })
            .collect())
    }

    /// Every target known to the store, used to resync after missed notifications.
    pub fn render_targets(&self) -> Result<BTreeSet<RenderTarget>, StorageError> {
        let inner = self.read()?;
        let classes = inner.objects.get(&Kind::GatewayClass).into_iter().flat_map(|objects| objects.keys().cloned().map(RenderTarget::GatewayClass));
        let gateways = inner.objects.get(&Kind::Gateway).into_iter().flat_map(|objects| objects.keys().cloned().map(RenderTarget::Gateway));
        Ok(classes.chain(gateways).collect())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BTreeSet<RenderTarget>> {
        self.changes.subscribe()
    }

    /// Consistent read-only snapshot, mutations wait until the view is dropped.
    pub fn view(&self) -> Result<StoreView<'_>, StorageError> {
        Ok(StoreView { inner: self.read()? })
    }
}

pub struct StoreView<'a> {
    inner: RwLockReadGuard<'a, Inner>,
}

impl StoreView<'_> {
    pub fn get<K: StoredKind>(&self, key: &ResourceKey) -> Option<Arc<K>> {
        self.inner.objects.get(&K::KIND).and_then(|objects| objects.get(key)).and_then(K::downcast).cloned()
    }

    pub fn list<K: StoredKind>(&self) -> Vec<Arc<K>> {
        self.inner.objects.get(&K::KIND).map(|objects| objects.values().filter_map(K::downcast).cloned().collect()).unwrap_or_default()
    }

    pub fn list_namespaced<K: StoredKind>(&self, namespace: &str) -> Vec<Arc<K>> {
        self.inner
            .objects
            .get(&K::KIND)
            .map(|objects| objects.iter().filter(|(key, _)| key.namespace == namespace).filter_map(|(_, object)| K::downcast(object)).cloned().collect())
            .unwrap_or_default()
    }
}
