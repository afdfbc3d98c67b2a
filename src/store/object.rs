use std::{fmt::Display, sync::Arc};

use k8s_openapi::api::{
    core::v1::{Endpoints, Namespace, Node, Secret, Service},
    discovery::v1::EndpointSlice,
};
use kube::Resource;
use serde::de::DeserializeOwned;

use crate::{
    api::{Dataplane, Gateway, GatewayClass, GatewayConfig, StaticService, UDPRoute},
    common::{ResourceKey, DEFAULT_NAMESPACE_NAME},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    GatewayClass,
    GatewayConfig,
    Gateway,
    UDPRoute,
    Service,
    EndpointSlice,
    Endpoints,
    Secret,
    Node,
    Namespace,
    Dataplane,
    StaticService,
}

impl Kind {
    pub const ALL: [Kind; 12] = [
        Kind::GatewayClass,
        Kind::GatewayConfig,
        Kind::Gateway,
        Kind::UDPRoute,
        Kind::Service,
        Kind::EndpointSlice,
        Kind::Endpoints,
        Kind::Secret,
        Kind::Node,
        Kind::Namespace,
        Kind::Dataplane,
        Kind::StaticService,
    ];

    pub fn is_namespaced(self) -> bool {
        !matches!(self, Kind::GatewayClass | Kind::Node | Kind::Namespace | Kind::Dataplane)
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Identity of a stored object across kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub kind: Kind,
    pub key: ResourceKey,
}

impl ObjectRef {
    pub fn new(kind: Kind, key: ResourceKey) -> Self {
        Self { kind, key }
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.key)
    }
}

#[derive(Clone, Debug)]
pub enum Object {
    GatewayClass(Arc<GatewayClass>),
    GatewayConfig(Arc<GatewayConfig>),
    Gateway(Arc<Gateway>),
    UDPRoute(Arc<UDPRoute>),
    Service(Arc<Service>),
    EndpointSlice(Arc<EndpointSlice>),
    Endpoints(Arc<Endpoints>),
    Secret(Arc<Secret>),
    Node(Arc<Node>),
    Namespace(Arc<Namespace>),
    Dataplane(Arc<Dataplane>),
    StaticService(Arc<StaticService>),
}

/// Kubernetes types the store keeps, with their typed access in and out of [`Object`].
pub trait StoredKind: Resource<DynamicType = ()> + Clone + DeserializeOwned + std::fmt::Debug + Send + Sync + 'static {
    const KIND: Kind;
    fn wrap(object: Arc<Self>) -> Object;
    fn downcast(object: &Object) -> Option<&Arc<Self>>;
}

macro_rules! stored_kinds {
    ($($kind:ident),* $(,)?) => {
        $(
            impl StoredKind for $kind {
                const KIND: Kind = Kind::$kind;

                fn wrap(object: Arc<Self>) -> Object {
                    Object::$kind(object)
                }

                fn downcast(object: &Object) -> Option<&Arc<Self>> {
                    match object {
                        Object::$kind(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$kind> for Object {
                fn from(object: $kind) -> Self {
                    Object::$kind(Arc::new(object))
                }
            }

            impl From<Arc<$kind>> for Object {
                fn from(object: Arc<$kind>) -> Self {
                    Object::$kind(object)
                }
            }
        )*

        impl Object {
            pub fn kind(&self) -> Kind {
                match self {
                    $(Object::$kind(_) => Kind::$kind,)*
                }
            }

            fn meta(&self) -> &kube::api::ObjectMeta {
                match self {
                    $(Object::$kind(inner) => inner.meta(),)*
                }
            }
        }
    };
}

stored_kinds!(GatewayClass, GatewayConfig, Gateway, UDPRoute, Service, EndpointSlice, Endpoints, Secret, Node, Namespace, Dataplane, StaticService);

impl Object {
    pub fn key(&self) -> ResourceKey {
        let meta = self.meta();
        let name = meta.name.clone().unwrap_or_default();
        if self.kind().is_namespaced() {
            let namespace = meta.namespace.clone().filter(|ns| !ns.is_empty()).unwrap_or_else(|| DEFAULT_NAMESPACE_NAME.to_owned());
            ResourceKey { namespace, name }
        } else {
            ResourceKey::new(&name)
        }
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.kind(), self.key())
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.meta().resource_version.as_deref()
    }
}
