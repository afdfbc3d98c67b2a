mod config_map_writer;
pub mod patchers;
mod render_queue;
mod render_service;

pub use config_map_writer::ConfigMapWriterService;
pub use patchers::{GatewayClassPatcherService, GatewayPatcherService, Patcher, UDPRoutePatcherService};
pub use render_service::RenderService;
