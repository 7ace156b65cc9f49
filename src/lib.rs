pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{LocalStorage, MondayClient, ZohoClient};
pub use config::AppConfig;
pub use core::{FileUploader, JobEngine, UploadLedger};
pub use utils::error::{Result, SyncError};
