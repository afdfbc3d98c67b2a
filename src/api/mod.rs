mod gateway;
mod route;
mod stunner;

pub use gateway::{
    AllowedRoutes, FromNamespaces, Gateway, GatewayAddress, GatewayClass, GatewayClassSpec, GatewayClassStatus, GatewayListener, GatewaySpec,
    GatewayStatus, GatewayTlsConfig, ListenerStatus, ParametersReference, RouteGroupKind, RouteNamespaces, SecretObjectReference,
};
pub use route::{BackendRef, ParentReference, RouteParentStatus, RouteRule, RouteStatus, UDPRoute, UDPRouteSpec};
pub use stunner::{AuthSecretReference, Dataplane, DataplaneSpec, GatewayConfig, GatewayConfigSpec, StaticService, StaticServiceSpec};
