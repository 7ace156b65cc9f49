#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CommonArgs;
pub use toml_config::{
    AppConfig, BoardConfig, MailConfig, MondayConfig, RouteConfig, RouterConfig, StorageConfig,
    WebhookConfig, ZohoConfig,
};
