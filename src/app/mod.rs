pub mod jobs;
pub mod router;
pub mod webhook;

pub use router::WebhookForwarder;
pub use webhook::{EventOutcome, WebhookProcessor};
