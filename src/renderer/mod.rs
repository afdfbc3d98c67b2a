mod address;
mod auth;
mod cluster;
mod listener;
mod validation;

use std::sync::Arc;

pub use auth::{normalize_auth_type, AuthError};
use itertools::Itertools;
pub use listener::{ListenerError, Protocol};
use tracing::debug;
use typed_builder::TypedBuilder;
pub use validation::{
    ConditionOutcome, ConditionType, GatewayClassResult, GatewayResult, ListenerResult, Reason, RouteResult, ValidationResult,
};

use self::listener::{ListenerState, RelayRange};
use crate::{
    api::{Dataplane, Gateway, GatewayClass, GatewayConfig},
    common::{ResourceKey, DEFAULT_CLUSTER_DOMAIN, DEFAULT_DATAPLANE_NAME, MAX_RELAY_PORT_ANNOTATION, MIN_RELAY_PORT_ANNOTATION, STUNNER_GROUP_NAME},
    store::StoreView,
    stunner_config::{AdminConfig, ListenerConfig, StunnerConfig, CONFIG_VERSION, DEFAULT_HEALTH_CHECK_ENDPOINT, DEFAULT_LOG_LEVEL},
};

const DEFAULT_MIN_RELAY_PORT: i32 = 32768;
const DEFAULT_MAX_RELAY_PORT: i32 = 65535;
const DEFAULT_METRICS_ENDPOINT: &str = "http://:8080/metrics";
const LISTENER_ADDRESS: &str = "$STUNNER_ADDR";

/// Explicit inputs of a render besides the store contents.
#[derive(Clone, Debug, TypedBuilder)]
pub struct RenderContext {
    #[builder(setter(into))]
    pub controller_name: String,
    #[builder(default = true)]
    pub enable_endpoint_discovery: bool,
    #[builder(default = false)]
    pub enable_relay_to_cluster_ip: bool,
    #[builder(default = DEFAULT_CLUSTER_DOMAIN.to_owned(), setter(into))]
    pub cluster_domain: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderOutcome {
    pub config: StunnerConfig,
    pub results: Vec<ValidationResult>,
    /// The Gateway exists and belongs to this controller.
    pub managed: bool,
}

struct ClassParameters {
    config: Arc<GatewayConfig>,
    dataplane: Arc<Dataplane>,
}

/// Turns a Gateway and everything it references into a [`StunnerConfig`] and the validation results for status.
///
/// Rendering is a pure function of the store view and the [`RenderContext`], bad input degrades the config and is
/// reported through the results, never as an error.
#[derive(Clone, Debug)]
pub struct Renderer {
    context: RenderContext,
}

impl Renderer {
    pub fn new(context: RenderContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    /// Validates a GatewayClass on its own, `None` when the class is missing or belongs to another controller.
    pub fn render_gateway_class(&self, view: &StoreView, key: &ResourceKey) -> Option<ValidationResult> {
        let class = view.get::<GatewayClass>(key)?;
        if class.spec.controller_name != self.context.controller_name {
            return None;
        }
        let (result, _) = Self::validate_gateway_class(view, &class);
        Some(ValidationResult::GatewayClass(result))
    }

    fn validate_gateway_class(view: &StoreView, class: &GatewayClass) -> (GatewayClassResult, Option<ClassParameters>) {
        let outcome = |status, reason, message: &str| GatewayClassResult {
            key: ResourceKey::from_resource(class),
            generation: class.metadata.generation,
            accepted: ConditionOutcome::new(ConditionType::Accepted, status, reason, message),
        };

        let Some(parameters) = &class.spec.parameters_ref else {
            return (outcome(false, Reason::InvalidParameters, "missing parametersRef"), None);
        };
        if parameters.group != STUNNER_GROUP_NAME || parameters.kind != "GatewayConfig" {
            return (outcome(false, Reason::InvalidParameters, &format!("invalid parametersRef {}/{}", parameters.group, parameters.kind)), None);
        }
        let Some(namespace) = parameters.namespace.as_ref().filter(|namespace| !namespace.is_empty()) else {
            return (outcome(false, Reason::InvalidParameters, "parametersRef must name a namespace"), None);
        };
        let config_key = ResourceKey::namespaced(&parameters.name, namespace);
        let Some(config) = view.get::<GatewayConfig>(&config_key) else {
            return (outcome(false, Reason::InvalidParameters, &format!("GatewayConfig {config_key} not found")), None);
        };
        if config.spec.auth_ref.is_none() {
            if let Some(Err(e)) = config.spec.auth_type.as_deref().map(normalize_auth_type) {
                return (outcome(false, Reason::InvalidParameters, &e.to_string()), None);
            }
        }
        let dataplane_name = config.spec.dataplane.clone().unwrap_or_else(|| DEFAULT_DATAPLANE_NAME.to_owned());
        let Some(dataplane) = view.get::<Dataplane>(&ResourceKey::new(&dataplane_name)) else {
            return (outcome(false, Reason::WaitingForController, &format!("Dataplane {dataplane_name} not found")), None);
        };
        (outcome(true, Reason::Accepted, "GatewayClass accepted"), Some(ClassParameters { config, dataplane }))
    }

    pub fn render(&self, view: &StoreView, key: &ResourceKey) -> RenderOutcome {
        let name = key.to_string();
        let unmanaged = || RenderOutcome { config: StunnerConfig::empty(&name), results: vec![], managed: false };

        let Some(gateway) = view.get::<Gateway>(key) else {
            debug!("gateway {key} not found, rendering empty config");
            return unmanaged();
        };
        let generation = gateway.metadata.generation;
        let rejected = |reason, message: String| GatewayResult {
            key: key.clone(),
            generation,
            conditions: vec![
                ConditionOutcome::new(ConditionType::Accepted, false, reason, message.clone()),
                ConditionOutcome::new(ConditionType::Programmed, false, reason, message),
            ],
            listeners: vec![],
            addresses: vec![],
        };

        let Some(class) = view.get::<GatewayClass>(&ResourceKey::new(&gateway.spec.gateway_class_name)) else {
            let result = rejected(Reason::Pending, format!("GatewayClass {} not found", gateway.spec.gateway_class_name));
            return RenderOutcome { config: StunnerConfig::empty(&name), results: vec![ValidationResult::Gateway(result)], managed: true };
        };
        if class.spec.controller_name != self.context.controller_name {
            return unmanaged();
        }

        let (class_result, parameters) = Self::validate_gateway_class(view, &class);
        let Some(parameters) = parameters else {
            let result = rejected(Reason::Invalid, format!("GatewayClass {} not accepted: {}", gateway.spec.gateway_class_name, class_result.accepted.message));
            return RenderOutcome {
                config: StunnerConfig::empty(&name),
                results: vec![ValidationResult::GatewayClass(class_result), ValidationResult::Gateway(result)],
                managed: true,
            };
        };

        let relay_range = relay_range(&gateway, &parameters.config);
        let mut listeners: Vec<ListenerState> =
            gateway.spec.listeners.iter().map(|spec| listener::validate_listener(view, &key.namespace, spec, relay_range)).collect();
        listener::detect_conflicts(&mut listeners);

        let address_required = address::address_required(&gateway);
        for listener in listeners.iter_mut().filter(|listener| listener.is_valid()) {
            if let Some(public) = address::resolve_public_address(view, &gateway, key, listener) {
                listener.public_address = Some(public.address);
                listener.public_port = Some(public.port);
            }
        }

        let (clusters, route_results) = cluster::render_routes(view, &self.context, key, &mut listeners);

        let listener_configs = listeners
            .iter()
            .filter(|listener| listener.is_valid())
            .filter_map(|listener| {
                Some(ListenerConfig {
                    name: format!("{name}/{}", listener.spec.name),
                    protocol: listener.protocol?.to_string(),
                    public_address: listener.public_address.clone(),
                    public_port: listener.public_port,
                    address: LISTENER_ADDRESS.to_owned(),
                    port: listener.spec.port,
                    min_relay_port: relay_range.min,
                    max_relay_port: relay_range.max,
                    cert: listener.cert.clone(),
                    key: listener.key.clone(),
                    routes: listener.routes.clone(),
                })
            })
            .collect();

        let programmed = listeners.iter().filter(|listener| listener.is_valid()).all(|listener| !address_required || listener.public_address.is_some());
        let gateway_result = GatewayResult {
            key: key.clone(),
            generation,
            conditions: vec![
                ConditionOutcome::new(ConditionType::Accepted, true, Reason::Accepted, "gateway accepted"),
                if programmed {
                    ConditionOutcome::new(ConditionType::Programmed, true, Reason::Programmed, "dataplane configuration successfully rendered")
                } else {
                    ConditionOutcome::new(ConditionType::Programmed, false, Reason::AddressNotAssigned, "public address not yet assigned")
                },
            ],
            listeners: listeners.iter().map(|listener| listener_result(listener, address_required)).collect(),
            addresses: listeners.iter().filter_map(|listener| listener.public_address.clone()).unique().collect(),
        };

        let config = StunnerConfig {
            version: CONFIG_VERSION.to_owned(),
            admin: admin_config(&name, &parameters),
            auth: auth::resolve_auth(view, &parameters.config),
            listeners: listener_configs,
            clusters,
        };

        let mut results = vec![ValidationResult::GatewayClass(class_result), ValidationResult::Gateway(gateway_result)];
        results.extend(route_results.into_iter().map(ValidationResult::Route));
        RenderOutcome { config, results, managed: true }
    }
}

fn relay_range(gateway: &Gateway, config: &GatewayConfig) -> RelayRange {
    let annotation = |name: &str| gateway.metadata.annotations.as_ref().and_then(|annotations| annotations.get(name)).and_then(|value| value.parse::<i32>().ok());
    RelayRange {
        min: annotation(MIN_RELAY_PORT_ANNOTATION).or(config.spec.min_port).unwrap_or(DEFAULT_MIN_RELAY_PORT),
        max: annotation(MAX_RELAY_PORT_ANNOTATION).or(config.spec.max_port).unwrap_or(DEFAULT_MAX_RELAY_PORT),
    }
}

fn admin_config(name: &str, parameters: &ClassParameters) -> AdminConfig {
    let spec = &parameters.config.spec;
    let metrics_enabled = parameters.dataplane.spec.enable_metrics_endpoint.unwrap_or(false);
    AdminConfig {
        name: name.to_owned(),
        loglevel: spec.log_level.clone().unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned()),
        metrics_endpoint: metrics_enabled.then(|| spec.metrics_endpoint.clone().unwrap_or_else(|| DEFAULT_METRICS_ENDPOINT.to_owned())),
        health_check_endpoint: Some(spec.health_check_endpoint.clone().unwrap_or_else(|| DEFAULT_HEALTH_CHECK_ENDPOINT.to_owned())),
    }
}

fn listener_result(listener: &ListenerState, address_required: bool) -> ListenerResult {
    let ready = if !listener.is_valid() {
        ConditionOutcome::new(ConditionType::Ready, false, Reason::NotReady, "listener is not valid")
    } else if address_required && listener.public_address.is_none() {
        ConditionOutcome::new(ConditionType::Ready, false, Reason::AddressNotAssigned, "public address not yet assigned")
    } else {
        ConditionOutcome::new(ConditionType::Ready, true, Reason::Ready, "listener ready")
    };
    ListenerResult {
        name: listener.spec.name.clone(),
        supported_kinds: listener.supported_kinds.clone(),
        attached_routes: i32::try_from(listener.routes.len()).unwrap_or(i32::MAX),
        conditions: vec![listener.accepted.clone(), listener.resolved_refs.clone(), listener.conflicted.clone(), ready],
    }
}
