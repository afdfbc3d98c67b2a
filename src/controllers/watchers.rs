use std::{collections::BTreeSet, sync::Arc};

use futures::{future::join_all, FutureExt, StreamExt};
use k8s_openapi::api::{
    core::v1::{Endpoints, Namespace, Node, Secret, Service},
    discovery::v1::EndpointSlice,
};
use kube::{
    runtime::{watcher, WatchStreamExt},
    Api, Client,
};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::{
    api::{Dataplane, Gateway, GatewayClass, GatewayConfig, StaticService, UDPRoute},
    common::ResourceKey,
    store::{StorageError, Store, StoredKind},
};

/// Mirrors every consumed kind from the API server into the [`Store`].
#[derive(TypedBuilder)]
pub struct StoreWatchers {
    client: Client,
    store: Store,
}

impl StoreWatchers {
    pub async fn start(self) -> crate::Result<()> {
        let watchers = vec![
            self.watch::<GatewayClass>().boxed(),
            self.watch::<GatewayConfig>().boxed(),
            self.watch::<Dataplane>().boxed(),
            self.watch::<Gateway>().boxed(),
            self.watch::<UDPRoute>().boxed(),
            self.watch::<Service>().boxed(),
            self.watch::<EndpointSlice>().boxed(),
            self.watch::<Endpoints>().boxed(),
            self.watch::<StaticService>().boxed(),
            self.watch::<Secret>().boxed(),
            self.watch::<Node>().boxed(),
            self.watch::<Namespace>().boxed(),
        ];
        for res in join_all(watchers).await {
            res?;
        }
        Ok(())
    }

    async fn watch<K: StoredKind>(&self) -> crate::Result<()> {
        let api: Api<K> = Api::all(self.client.clone());
        let mut events = watcher(api, watcher::Config::default()).default_backoff().boxed();
        let mut sync = InitialSync::default();
        info!("{} watcher started", K::KIND);
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => sync.apply(&self.store, event)?,
                Err(e) => warn!("{} watcher error {e}", K::KIND),
            }
        }
        info!("{} watcher stopped", K::KIND);
        Ok(())
    }
}

/// Tracks the objects listed during a (re)list so that objects deleted while the watch was down get removed.
#[derive(Debug, Default)]
struct InitialSync {
    listed: Option<BTreeSet<ResourceKey>>,
}

impl InitialSync {
    fn apply<K: StoredKind>(&mut self, store: &Store, event: watcher::Event<K>) -> Result<(), StorageError> {
        match event {
            watcher::Event::Init => {
                self.listed = Some(BTreeSet::new());
            },
            watcher::Event::InitApply(object) => {
                let object = K::wrap(Arc::new(object));
                if let Some(listed) = &mut self.listed {
                    listed.insert(object.key());
                }
                store.upsert(object)?;
            },
            watcher::Event::Apply(object) => {
                store.upsert(K::wrap(Arc::new(object)))?;
            },
            watcher::Event::Delete(object) => {
                let key = K::wrap(Arc::new(object)).key();
                store.delete(K::KIND, &key)?;
            },
            watcher::Event::InitDone => {
                let listed = self.listed.take().unwrap_or_default();
                for stale in store.keys(K::KIND)?.difference(&listed) {
                    debug!("{} {stale} disappeared while not watching", K::KIND);
                    store.delete(K::KIND, stale)?;
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{common::fixtures, store::Kind};

    #[test]
    pub fn test_events_are_mirrored() {
        let store = Store::new();
        let mut sync = InitialSync::default();
        sync.apply(&store, watcher::Event::Apply(fixtures::gateway())).unwrap();
        assert_eq!(store.keys(Kind::Gateway).unwrap(), BTreeSet::from([ResourceKey::namespaced("gateway-1", "stunner")]));

        sync.apply(&store, watcher::Event::Delete(fixtures::gateway())).unwrap();
        assert!(store.keys(Kind::Gateway).unwrap().is_empty());
    }

    #[test]
    pub fn test_relist_removes_stale_objects() {
        let store = Store::new();
        let mut sync = InitialSync::default();
        let mut gateway_2 = fixtures::gateway();
        gateway_2.metadata.name = Some("gateway-2".to_owned());
        sync.apply(&store, watcher::Event::Apply(fixtures::gateway())).unwrap();
        sync.apply(&store, watcher::Event::Apply(gateway_2)).unwrap();

        sync.apply::<crate::api::Gateway>(&store, watcher::Event::Init).unwrap();
        sync.apply(&store, watcher::Event::InitApply(fixtures::gateway())).unwrap();
        sync.apply::<crate::api::Gateway>(&store, watcher::Event::InitDone).unwrap();
        assert_eq!(store.keys(Kind::Gateway).unwrap(), BTreeSet::from([ResourceKey::namespaced("gateway-1", "stunner")]));
    }
}
