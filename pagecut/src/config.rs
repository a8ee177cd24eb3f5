//! Application configuration.
//!
//! Values come from an optional `pagecut` config file and `PAGECUT__*`
//! environment variables, in that order.

mod loader;
mod settings;

pub use loader::{load_config, load_config_from};
pub use settings::{
    AppConfig, CaptureConfig, ExportConfig, RenderConfig, SectionTypeSetting, StorageConfig,
};
