pub mod monday;
pub mod storage;
pub mod zoho;

pub use monday::MondayClient;
pub use storage::{sanitize_file_name, LocalStorage};
pub use zoho::ZohoClient;
