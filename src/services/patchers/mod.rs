mod gateway_class_patcher;
mod gateway_patcher;
mod patcher;
mod udp_route_patcher;

pub use gateway_class_patcher::GatewayClassPatcherService;
pub use gateway_patcher::GatewayPatcherService;
pub use patcher::{Operation, PatchContext, Patcher};
pub use udp_route_patcher::UDPRoutePatcherService;
