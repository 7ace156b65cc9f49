pub mod checkpoint;
pub mod document;
pub mod engine;
pub mod ledger;
pub mod mail_cleaner;
pub mod uploader;

pub use checkpoint::{CheckpointStore, ProgressCheckpoint};
pub use engine::JobEngine;
pub use ledger::UploadLedger;
pub use mail_cleaner::MailCleaner;
pub use uploader::FileUploader;
