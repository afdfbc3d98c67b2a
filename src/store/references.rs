use crate::{
    common::{ResourceKey, DEFAULT_DATAPLANE_NAME, DEFAULT_NAMESPACE_NAME, GATEWAY_API_GROUP_NAME, RELATED_GATEWAY_ANNOTATION, SERVICE_NAME_LABEL, STUNNER_GROUP_NAME},
    store::{Kind, Object, ObjectRef},
};

/// `dependent` must be re-rendered whenever `dependency` changes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub dependent: ObjectRef,
    pub dependency: ObjectRef,
}

impl Edge {
    fn new(dependent: ObjectRef, dependency: ObjectRef) -> Self {
        Self { dependent, dependency }
    }
}

/// Node edges are not tied to a single Node, any Node may carry the external address.
pub fn any_node() -> ObjectRef {
    ObjectRef::new(Kind::Node, ResourceKey::new("*"))
}

pub fn references(object: &Object) -> Vec<Edge> {
    let this = object.object_ref();
    let namespace = this.key.namespace.clone();
    let mut edges = vec![];
    match object {
        Object::GatewayClass(class) => {
            if let Some(parameters) = &class.spec.parameters_ref {
                if parameters.group == STUNNER_GROUP_NAME && parameters.kind == "GatewayConfig" {
                    let key = ResourceKey::referenced(&parameters.name, parameters.namespace.as_ref(), DEFAULT_NAMESPACE_NAME);
                    edges.push(Edge::new(this.clone(), ObjectRef::new(Kind::GatewayConfig, key)));
                }
            }
        },
        Object::GatewayConfig(config) => {
            if let Some(auth_ref) = &config.spec.auth_ref {
                let key = ResourceKey::referenced(&auth_ref.name, auth_ref.namespace.as_ref(), &namespace);
                edges.push(Edge::new(this.clone(), ObjectRef::new(Kind::Secret, key)));
            }
            let dataplane = config.spec.dataplane.clone().unwrap_or_else(|| DEFAULT_DATAPLANE_NAME.to_owned());
            edges.push(Edge::new(this.clone(), ObjectRef::new(Kind::Dataplane, ResourceKey::new(&dataplane))));
        },
        Object::Gateway(gateway) => {
            edges.push(Edge::new(this.clone(), ObjectRef::new(Kind::GatewayClass, ResourceKey::new(&gateway.spec.gateway_class_name))));
            for listener in &gateway.spec.listeners {
                for certificate in listener.tls.iter().flat_map(|tls| tls.certificate_refs.iter()) {
                    let key = ResourceKey::referenced(&certificate.name, certificate.namespace.as_ref(), &namespace);
                    edges.push(Edge::new(this.clone(), ObjectRef::new(Kind::Secret, key)));
                }
            }
        },
        Object::UDPRoute(route) => {
            for parent in &route.spec.parent_refs {
                if parent.group.as_deref().unwrap_or(GATEWAY_API_GROUP_NAME) == GATEWAY_API_GROUP_NAME && parent.kind.as_deref().unwrap_or("Gateway") == "Gateway" {
                    let key = ResourceKey::referenced(&parent.name, parent.namespace.as_ref(), &namespace);
                    edges.push(Edge::new(ObjectRef::new(Kind::Gateway, key), this.clone()));
                }
            }
            for backend in route.spec.rules.iter().flat_map(|rule| rule.backend_refs.iter()) {
                let key = ResourceKey::referenced(&backend.name, backend.namespace.as_ref(), &namespace);
                let kind = match (backend.group.as_deref().unwrap_or_default(), backend.kind.as_deref().unwrap_or("Service")) {
                    (STUNNER_GROUP_NAME, "StaticService") => Kind::StaticService,
                    _ => Kind::Service,
                };
                edges.push(Edge::new(this.clone(), ObjectRef::new(kind, key)));
            }
            edges.push(Edge::new(this.clone(), ObjectRef::new(Kind::Namespace, ResourceKey::new(&namespace))));
        },
        Object::Service(service) => {
            let related = service.metadata.annotations.as_ref().and_then(|annotations| annotations.get(RELATED_GATEWAY_ANNOTATION));
            if let Some(Ok(gateway)) = related.map(|related| related.parse::<ResourceKey>()) {
                edges.push(Edge::new(ObjectRef::new(Kind::Gateway, gateway), this.clone()));
                let service_type = service.spec.as_ref().and_then(|spec| spec.type_.as_deref()).unwrap_or("ClusterIP");
                if matches!(service_type, "NodePort" | "LoadBalancer") {
                    edges.push(Edge::new(this.clone(), any_node()));
                }
            }
        },
        Object::EndpointSlice(slice) => {
            if let Some(service) = slice.metadata.labels.as_ref().and_then(|labels| labels.get(SERVICE_NAME_LABEL)) {
                edges.push(Edge::new(ObjectRef::new(Kind::Service, ResourceKey::namespaced(service, &namespace)), this.clone()));
            }
        },
        Object::Endpoints(_) => {
            edges.push(Edge::new(ObjectRef::new(Kind::Service, this.key.clone()), this.clone()));
        },
        Object::Secret(_) | Object::Node(_) | Object::Namespace(_) | Object::Dataplane(_) | Object::StaticService(_) => {},
    }
    edges
}
