use k8s_openapi::api::{
    core::v1::{Endpoints, Namespace, Node, Secret, Service},
    discovery::v1::EndpointSlice,
};
use serde::de::DeserializeOwned;

use crate::{
    api::{Dataplane, Gateway, GatewayClass, GatewayConfig, StaticService, UDPRoute},
    store::{Object, Store},
};

pub const CONTROLLER_NAME: &str = "stunner.l7mp.io/gateway-operator";

pub fn parse<K: DeserializeOwned>(yaml: &str) -> K {
    serde_yaml::from_str(yaml).unwrap()
}

pub fn dataplane() -> Dataplane {
    parse(
        r"
apiVersion: stunner.l7mp.io/v1
kind: Dataplane
metadata:
  name: default
spec:
  image: l7mp/stunnerd:latest
  command: [stunnerd]
  args: [-w, --udp-thread-num=16]
  replicas: 1
  enableMetricsEndpoint: false
",
    )
}

pub fn gateway_config() -> GatewayConfig {
    parse(
        r"
apiVersion: stunner.l7mp.io/v1
kind: GatewayConfig
metadata:
  name: gatewayconfig-ok
  namespace: stunner
spec:
  realm: stunner.l7mp.io
  authType: plaintext
  userName: user-1
  password: pass-1
  logLevel: all:INFO
",
    )
}

pub fn gateway_class() -> GatewayClass {
    parse(
        r"
apiVersion: gateway.networking.k8s.io/v1
kind: GatewayClass
metadata:
  name: gatewayclass-ok
spec:
  controllerName: stunner.l7mp.io/gateway-operator
  parametersRef:
    group: stunner.l7mp.io
    kind: GatewayConfig
    name: gatewayconfig-ok
    namespace: stunner
",
    )
}

/// UDP listener on port 1 and TCP listener on port 2, both with relay range 1-2.
pub fn gateway() -> Gateway {
    parse(
        r"
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata:
  name: gateway-1
  namespace: stunner
  annotations:
    stunner.l7mp.io/min-relay-port: '1'
    stunner.l7mp.io/max-relay-port: '2'
spec:
  gatewayClassName: gatewayclass-ok
  listeners:
  - name: udp
    port: 1
    protocol: UDP
  - name: tcp
    port: 2
    protocol: TCP
  addresses:
  - type: IPAddress
    value: 1.2.3.4
",
    )
}

/// Attaches to the UDP listener of `gateway-1` only.
pub fn udp_route() -> UDPRoute {
    parse(
        r"
apiVersion: stunner.l7mp.io/v1
kind: UDPRoute
metadata:
  name: udproute-ok
  namespace: stunner
spec:
  parentRefs:
  - name: gateway-1
    sectionName: udp
  rules:
  - backendRefs:
    - name: testservice-ok
      namespace: testnamespace
",
    )
}

pub fn service() -> Service {
    parse(
        r"
apiVersion: v1
kind: Service
metadata:
  name: testservice-ok
  namespace: testnamespace
spec:
  type: ClusterIP
  clusterIP: 10.0.0.10
  ports:
  - name: udp-ok
    port: 1
    protocol: UDP
",
    )
}

pub fn endpoint_slice() -> EndpointSlice {
    parse(
        r"
apiVersion: discovery.k8s.io/v1
kind: EndpointSlice
metadata:
  name: testservice-ok-slice
  namespace: testnamespace
  labels:
    kubernetes.io/service-name: testservice-ok
addressType: IPv4
endpoints:
- addresses: [1.2.3.4]
  conditions:
    ready: true
- addresses: [1.2.3.5]
  conditions:
    ready: true
- addresses: [1.2.3.6]
  conditions:
    ready: true
- addresses: [1.2.3.7]
- addresses: [1.2.3.8]
  conditions:
    ready: false
ports:
- name: udp-ok
  port: 1
  protocol: UDP
",
    )
}

pub fn endpoints() -> Endpoints {
    parse(
        r"
apiVersion: v1
kind: Endpoints
metadata:
  name: testservice-ok
  namespace: testnamespace
subsets:
- addresses:
  - ip: 1.2.3.4
  - ip: 1.2.3.5
  notReadyAddresses:
  - ip: 1.2.3.9
",
    )
}

pub fn static_service() -> StaticService {
    parse(
        r"
apiVersion: stunner.l7mp.io/v1
kind: StaticService
metadata:
  name: staticservice-ok
  namespace: stunner
spec:
  prefixes:
  - 10.11.12.13/32
  - 10.11.12.0/24
",
    )
}

/// TLS Secret, `tls.crt` is `testcert` and `tls.key` is `testkey`.
pub fn tls_secret() -> Secret {
    parse(
        r"
apiVersion: v1
kind: Secret
metadata:
  name: tls-secret
  namespace: stunner
type: kubernetes.io/tls
data:
  tls.crt: dGVzdGNlcnQ=
  tls.key: dGVzdGtleQ==
",
    )
}

pub fn auth_secret() -> Secret {
    parse(
        r"
apiVersion: v1
kind: Secret
metadata:
  name: auth-secret
  namespace: stunner
stringData:
  type: longterm
  secret: my-shared-secret
",
    )
}

pub fn load_balancer_service() -> Service {
    parse(
        r"
apiVersion: v1
kind: Service
metadata:
  name: gateway-1
  namespace: stunner
  annotations:
    stunner.l7mp.io/related-gateway-name: stunner/gateway-1
spec:
  type: LoadBalancer
  ports:
  - name: udp
    port: 1
    protocol: UDP
    nodePort: 30001
  - name: tcp
    port: 2
    protocol: TCP
    nodePort: 30002
status:
  loadBalancer:
    ingress:
    - ip: 5.6.7.8
",
    )
}

pub fn node(name: &str, external_ip: &str) -> Node {
    parse(&format!(
        r"
apiVersion: v1
kind: Node
metadata:
  name: {name}
status:
  addresses:
  - type: InternalIP
    address: 192.168.0.1
  - type: ExternalIP
    address: {external_ip}
"
    ))
}

pub fn namespace(name: &str, labels: &[(&str, &str)]) -> Namespace {
    let mut namespace: Namespace = parse(&format!(
        r"
apiVersion: v1
kind: Namespace
metadata:
  name: {name}
"
    ));
    namespace.metadata.labels = Some(labels.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect());
    namespace
}

/// Store holding a managed class, its config and dataplane, `gateway-1` and `udproute-ok` with a backend Service.
pub fn base_store() -> Store {
    let store = Store::new();
    let objects: Vec<Object> = vec![
        dataplane().into(),
        gateway_config().into(),
        gateway_class().into(),
        gateway().into(),
        udp_route().into(),
        service().into(),
        namespace("stunner", &[]).into(),
        namespace("testnamespace", &[]).into(),
    ];
    for object in objects {
        store.upsert(object).unwrap();
    }
    store
}
