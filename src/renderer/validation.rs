use std::fmt::Display;

use crate::{
    api::{ParentReference, RouteGroupKind},
    common::ResourceKey,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConditionType {
    Accepted,
    ResolvedRefs,
    Conflicted,
    Programmed,
    Ready,
}

impl Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Gateway API condition reasons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reason {
    Accepted,
    InvalidParameters,
    WaitingForController,
    Pending,
    Invalid,
    Programmed,
    AddressNotAssigned,
    UnsupportedProtocol,
    UnsupportedValue,
    ProtocolConflict,
    NoConflicts,
    ResolvedRefs,
    InvalidCertificateRef,
    InvalidRouteKinds,
    Ready,
    NotReady,
    NoMatchingParent,
    NotAllowedByListeners,
    BackendNotFound,
    InvalidKind,
}

impl Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionOutcome {
    pub condition_type: ConditionType,
    pub status: bool,
    pub reason: Reason,
    pub message: String,
}

impl ConditionOutcome {
    pub fn new(condition_type: ConditionType, status: bool, reason: Reason, message: impl Into<String>) -> Self {
        Self { condition_type, status, reason, message: message.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayClassResult {
    pub key: ResourceKey,
    pub generation: Option<i64>,
    pub accepted: ConditionOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerResult {
    pub name: String,
    pub supported_kinds: Vec<RouteGroupKind>,
    pub attached_routes: i32,
    pub conditions: Vec<ConditionOutcome>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayResult {
    pub key: ResourceKey,
    pub generation: Option<i64>,
    pub conditions: Vec<ConditionOutcome>,
    pub listeners: Vec<ListenerResult>,
    pub addresses: Vec<String>,
}

/// Outcome for one parent reference of a route that points at the rendered Gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteResult {
    pub key: ResourceKey,
    pub generation: Option<i64>,
    pub parent_ref: ParentReference,
    pub conditions: Vec<ConditionOutcome>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationResult {
    GatewayClass(GatewayClassResult),
    Gateway(GatewayResult),
    Route(RouteResult),
}

impl ValidationResult {
    pub fn key(&self) -> &ResourceKey {
        match self {
            ValidationResult::GatewayClass(result) => &result.key,
            ValidationResult::Gateway(result) => &result.key,
            ValidationResult::Route(result) => &result.key,
        }
    }

    pub fn conditions(&self) -> Vec<&ConditionOutcome> {
        match self {
            ValidationResult::GatewayClass(result) => vec![&result.accepted],
            ValidationResult::Gateway(result) => result.conditions.iter().collect(),
            ValidationResult::Route(result) => result.conditions.iter().collect(),
        }
    }
}
