use std::{fmt::Display, str::FromStr};

use k8s_openapi::api::core::v1::Secret;
use thiserror::Error;

use super::{
    auth::secret_value,
    validation::{ConditionOutcome, ConditionType, Reason},
};
use crate::{
    api::{GatewayListener, RouteGroupKind},
    common::{ResourceKey, STUNNER_GROUP_NAME},
    store::StoreView,
};

pub const UDP_ROUTE_KIND: &str = "UDPRoute";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ListenerError {
    #[error("unsupported protocol {0}")]
    UnsupportedProtocol(String),
    #[error("invalid port {0}")]
    InvalidPort(i32),
    #[error("invalid relay port range {0}-{1}")]
    InvalidRelayRange(i32, i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    TurnUdp,
    TurnTcp,
    TurnTls,
    TurnDtls,
}

impl Protocol {
    pub fn is_tls(self) -> bool {
        matches!(self, Protocol::TurnTls | Protocol::TurnDtls)
    }

    /// Transport that shares the port space with this protocol.
    pub fn is_udp_family(self) -> bool {
        matches!(self, Protocol::TurnUdp | Protocol::TurnDtls)
    }
}

impl FromStr for Protocol {
    type Err = ListenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UDP" | "TURN-UDP" => Ok(Protocol::TurnUdp),
            "TCP" | "TURN-TCP" => Ok(Protocol::TurnTcp),
            "TLS" | "TURN-TLS" => Ok(Protocol::TurnTls),
            "DTLS" | "TURN-DTLS" => Ok(Protocol::TurnDtls),
            _ => Err(ListenerError::UnsupportedProtocol(s.to_owned())),
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Protocol::TurnUdp => "TURN-UDP",
            Protocol::TurnTcp => "TURN-TCP",
            Protocol::TurnTls => "TURN-TLS",
            Protocol::TurnDtls => "TURN-DTLS",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayRange {
    pub min: i32,
    pub max: i32,
}

impl RelayRange {
    pub fn validate(self) -> Result<Self, ListenerError> {
        if (1..=65535).contains(&self.min) && (1..=65535).contains(&self.max) && self.min <= self.max {
            Ok(self)
        } else {
            Err(ListenerError::InvalidRelayRange(self.min, self.max))
        }
    }
}

/// Everything the renderer decided about one Gateway listener.
#[derive(Clone, Debug)]
pub struct ListenerState {
    pub spec: GatewayListener,
    pub protocol: Option<Protocol>,
    pub accepted: ConditionOutcome,
    pub resolved_refs: ConditionOutcome,
    pub conflicted: ConditionOutcome,
    pub supported_kinds: Vec<RouteGroupKind>,
    pub cert: Option<String>,
    pub key: Option<String>,
    pub public_address: Option<String>,
    pub public_port: Option<i32>,
    pub routes: Vec<String>,
}

impl ListenerState {
    /// Rendered into the config and open for route attachment.
    pub fn is_valid(&self) -> bool {
        self.accepted.status && self.resolved_refs.status && !self.conflicted.status
    }

    pub fn accepts_routes(&self) -> bool {
        self.is_valid() && !self.supported_kinds.is_empty()
    }
}

pub fn udp_route_kind() -> RouteGroupKind {
    RouteGroupKind { group: Some(STUNNER_GROUP_NAME.to_owned()), kind: UDP_ROUTE_KIND.to_owned() }
}

fn validate_port(port: i32) -> Result<i32, ListenerError> {
    if (1..=65535).contains(&port) {
        Ok(port)
    } else {
        Err(ListenerError::InvalidPort(port))
    }
}

/// Validates protocol, port and relay range, then resolves the TLS certificate and allowed route kinds.
pub fn validate_listener(view: &StoreView, gateway_namespace: &str, listener: &GatewayListener, relay_range: RelayRange) -> ListenerState {
    let mut state = ListenerState {
        spec: listener.clone(),
        protocol: None,
        accepted: ConditionOutcome::new(ConditionType::Accepted, true, Reason::Accepted, "listener accepted"),
        resolved_refs: ConditionOutcome::new(ConditionType::ResolvedRefs, true, Reason::ResolvedRefs, "listener references resolved"),
        conflicted: ConditionOutcome::new(ConditionType::Conflicted, false, Reason::NoConflicts, "no conflicts"),
        supported_kinds: vec![],
        cert: None,
        key: None,
        public_address: None,
        public_port: None,
        routes: vec![],
    };

    let protocol = match listener.protocol.parse::<Protocol>() {
        Ok(protocol) => protocol,
        Err(e) => {
            state.accepted = ConditionOutcome::new(ConditionType::Accepted, false, Reason::UnsupportedProtocol, e.to_string());
            return state;
        },
    };
    state.protocol = Some(protocol);

    if let Err(e) = validate_port(listener.port).and_then(|_| relay_range.validate()) {
        state.accepted = ConditionOutcome::new(ConditionType::Accepted, false, Reason::UnsupportedValue, e.to_string());
        return state;
    }

    if protocol.is_tls() {
        match resolve_certificate(view, gateway_namespace, listener) {
            Some((cert, key)) => {
                state.cert = Some(cert);
                state.key = Some(key);
            },
            None => {
                state.resolved_refs =
                    ConditionOutcome::new(ConditionType::ResolvedRefs, false, Reason::InvalidCertificateRef, "missing or invalid certificate reference");
            },
        }
    }

    let requested_kinds = listener.allowed_routes.as_ref().map(|allowed| allowed.kinds.clone()).unwrap_or_default();
    if requested_kinds.is_empty() {
        state.supported_kinds = vec![udp_route_kind()];
    } else {
        let (supported, unsupported): (Vec<_>, Vec<_>) = requested_kinds.into_iter().partition(|kind| kind.kind == UDP_ROUTE_KIND);
        state.supported_kinds = supported.into_iter().map(|_| udp_route_kind()).take(1).collect();
        if !unsupported.is_empty() && state.resolved_refs.status {
            state.resolved_refs = ConditionOutcome::new(ConditionType::ResolvedRefs, false, Reason::InvalidRouteKinds, "unsupported route kinds requested");
        }
    }
    state
}

fn resolve_certificate(view: &StoreView, gateway_namespace: &str, listener: &GatewayListener) -> Option<(String, String)> {
    let reference = listener.tls.as_ref()?.certificate_refs.first()?;
    let core_group = reference.group.as_deref().unwrap_or_default().is_empty();
    if !core_group || reference.kind.as_deref().unwrap_or("Secret") != "Secret" {
        return None;
    }
    let secret = view.get::<Secret>(&ResourceKey::referenced(&reference.name, reference.namespace.as_ref(), gateway_namespace))?;
    Some((secret_value(&secret, "tls.crt")?, secret_value(&secret, "tls.key")?))
}

/// Marks every listener that shares a port and transport family with an earlier one.
pub fn detect_conflicts(listeners: &mut [ListenerState]) {
    for current in 1..listeners.len() {
        let Some(protocol) = listeners[current].protocol.filter(|_| listeners[current].accepted.status) else {
            continue;
        };
        let port = listeners[current].spec.port;
        let clash = listeners[..current].iter().find(|earlier| {
            earlier.accepted.status
                && !earlier.conflicted.status
                && earlier.spec.port == port
                && earlier.protocol.is_some_and(|other| other.is_udp_family() == protocol.is_udp_family())
        });
        if let Some(earlier) = clash {
            let message = format!("port {port} already used by listener {}", earlier.spec.name);
            listeners[current].conflicted = ConditionOutcome::new(ConditionType::Conflicted, true, Reason::ProtocolConflict, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::fixtures;

    const RANGE: RelayRange = RelayRange { min: 1, max: 2 };

    fn listener(yaml: &str) -> GatewayListener {
        fixtures::parse(yaml)
    }

    #[test]
    pub fn test_protocols() {
        assert_eq!("udp".parse::<Protocol>(), Ok(Protocol::TurnUdp));
        assert_eq!("TURN-TLS".parse::<Protocol>(), Ok(Protocol::TurnTls));
        assert_eq!(Protocol::TurnDtls.to_string(), "TURN-DTLS");
        assert!("HTTP".parse::<Protocol>().is_err());
    }

    #[test]
    pub fn test_invalid_listeners() {
        let store = fixtures::base_store();
        let view = store.view().unwrap();
        let state = validate_listener(&view, "stunner", &listener("{name: l, port: 1, protocol: HTTP}"), RANGE);
        assert_eq!(state.accepted.reason, Reason::UnsupportedProtocol);
        let state = validate_listener(&view, "stunner", &listener("{name: l, port: 70000, protocol: UDP}"), RANGE);
        assert_eq!(state.accepted.reason, Reason::UnsupportedValue);
        let state = validate_listener(&view, "stunner", &listener("{name: l, port: 1, protocol: UDP}"), RelayRange { min: 10, max: 2 });
        assert_eq!(state.accepted.reason, Reason::UnsupportedValue);
        assert!(!state.is_valid());
    }

    #[test]
    pub fn test_tls_certificate() {
        let store = fixtures::base_store();
        let tls = "{name: tls, port: 443, protocol: TLS, tls: {certificateRefs: [{name: tls-secret}]}}";
        let state = validate_listener(&store.view().unwrap(), "stunner", &listener(tls), RANGE);
        assert_eq!(state.resolved_refs.reason, Reason::InvalidCertificateRef);
        assert!(!state.is_valid());

        store.upsert(fixtures::tls_secret()).unwrap();
        let state = validate_listener(&store.view().unwrap(), "stunner", &listener(tls), RANGE);
        assert!(state.is_valid());
        assert_eq!(state.cert.as_deref(), Some("testcert"));
        assert_eq!(state.key.as_deref(), Some("testkey"));
    }

    #[test]
    pub fn test_route_kinds() {
        let store = fixtures::base_store();
        let view = store.view().unwrap();
        let state = validate_listener(&view, "stunner", &listener("{name: l, port: 1, protocol: UDP, allowedRoutes: {kinds: [{kind: HTTPRoute}]}}"), RANGE);
        assert_eq!(state.resolved_refs.reason, Reason::InvalidRouteKinds);
        assert!(!state.accepts_routes());
    }

    #[test]
    pub fn test_conflicts() {
        let store = fixtures::base_store();
        let view = store.view().unwrap();
        let mut listeners = vec![
            validate_listener(&view, "stunner", &listener("{name: udp, port: 1, protocol: UDP}"), RANGE),
            validate_listener(&view, "stunner", &listener("{name: tcp, port: 1, protocol: TCP}"), RANGE),
            validate_listener(&view, "stunner", &listener("{name: dtls, port: 1, protocol: DTLS}"), RANGE),
            validate_listener(&view, "stunner", &listener("{name: udp-2, port: 2, protocol: UDP}"), RANGE),
        ];
        detect_conflicts(&mut listeners);
        let conflicted: Vec<_> = listeners.iter().map(|listener| listener.conflicted.status).collect();
        assert_eq!(conflicted, vec![false, false, true, false]);
    }
}
