pub mod attachments;
pub mod clear_column;
pub mod email_migration;
pub mod lead_sync;

pub use attachments::AttachmentDownloadJob;
pub use clear_column::ClearColumnJob;
pub use email_migration::EmailMigrationJob;
pub use lead_sync::{LeadSyncJob, LEAD_FIELDS};
