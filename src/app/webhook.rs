use crate::adapters::storage::sanitize_file_name;
use crate::adapters::{LocalStorage, MondayClient};
use crate::config::{AppConfig, WebhookConfig};
use crate::core::{FileUploader, UploadLedger};
use crate::domain::model::{AssetRef, EventKind, UploadReport, WebhookEnvelope, WebhookEvent};
use crate::domain::ports::{BoardApi, Storage};
use crate::utils::error::Result;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// 單一事件的處理結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Ignored,
    MissingEmail,
    MissingFiles,
    LookedUp { items: usize },
    Transferred { files: usize, report: UploadReport },
}

pub struct WebhookProcessor {
    monday: Arc<MondayClient>,
    uploader: FileUploader<MondayClient>,
    downloads: LocalStorage,
    email_column: String,
    file_column: String,
}

impl WebhookProcessor {
    pub fn new(
        monday: Arc<MondayClient>,
        uploader: FileUploader<MondayClient>,
        downloads: LocalStorage,
        webhook: &WebhookConfig,
    ) -> Self {
        Self {
            monday,
            uploader,
            downloads,
            email_column: webhook.email_column.clone(),
            file_column: webhook.file_column.clone(),
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let monday = Arc::new(MondayClient::new(&config.monday)?);
        let ledger = UploadLedger::load(config.ledger_path()).await?;
        let uploader = FileUploader::new(Arc::clone(&monday), config.boards.clone(), Arc::new(Mutex::new(ledger)));

        Ok(Self::new(
            monday,
            uploader,
            LocalStorage::new(&config.storage.download_dir),
            &config.webhook,
        ))
    }

    pub async fn handle_event(&self, event: &WebhookEvent) -> Result<EventOutcome> {
        let kind = event.event_kind();
        match &kind {
            EventKind::CreatePulse => {}
            EventKind::UpdateColumnValue if event.column_id.as_deref() == Some(self.file_column.as_str()) => {}
            _ => {
                tracing::debug!("Ignoring {} event", event.kind);
                return Ok(EventOutcome::Ignored);
            }
        }

        let Some(email) = event.email(&self.email_column) else {
            tracing::info!("📭 Email not found in the {} event", event.kind);
            return Ok(EventOutcome::MissingEmail);
        };

        let files = event.files(&self.file_column);
        if files.is_empty() {
            if kind != EventKind::CreatePulse {
                tracing::info!("📭 Files not found in the event");
                return Ok(EventOutcome::MissingFiles);
            }

            let items = self
                .uploader
                .api()
                .find_items_by_email(&self.uploader.lookups(), &email)
                .await?;
            tracing::info!("🔍 {} matching item(s) for {}", items.len(), email);
            return Ok(EventOutcome::LookedUp { items: items.len() });
        }

        tracing::info!("📡 {} file(s) received for {}", files.len(), email);
        let mut report = UploadReport::default();
        for file in &files {
            match self.transfer_file(&email, file).await {
                Ok(file_report) => report.merge(&file_report),
                Err(e) => {
                    tracing::error!("❌ Could not transfer {} (asset {}): {}", file.name, file.asset_id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(EventOutcome::Transferred {
            files: files.len(),
            report,
        })
    }

    async fn transfer_file(&self, email: &str, file: &AssetRef) -> Result<UploadReport> {
        let url = self.monday.asset_public_url(&file.asset_id).await?;
        tracing::debug!("Public URL for asset {}: {}", file.asset_id, url);

        let data = self.monday.download(&url).await?;
        let relative = format!("{}/{}", sanitize_file_name(email), unique_download_name(&file.name));
        let path = self.downloads.write_file(&relative, &data).await?;
        tracing::info!("💾 Downloaded {} ({} bytes)", path.display(), data.len());

        self.uploader.process_file_upload(email, &file.name, &path).await
    }
}

/// 每次下載使用不同檔名，並行事件不會互相覆寫同一個檔案
fn unique_download_name(name: &str) -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{}-{}",
        chrono::Utc::now().timestamp_millis(),
        seq,
        sanitize_file_name(name)
    )
}

/// challenge 為 null、空字串、false 或 0 時不視為握手
pub(crate) fn challenge_of(body: &Value) -> Option<&Value> {
    body.get("challenge").filter(|challenge| match challenge {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    })
}

pub(crate) fn challenge_response(challenge: &Value) -> Response {
    tracing::info!("🤝 Responding to challenge");
    (StatusCode::OK, Json(json!({ "challenge": challenge }))).into_response()
}

pub(crate) fn invalid_payload() -> Response {
    (StatusCode::BAD_REQUEST, "Invalid payload").into_response()
}

pub fn router(processor: Arc<WebhookProcessor>, path: &str) -> Router {
    Router::new()
        .route(path, post(handle_webhook))
        .route("/health", get(health))
        .route("/oauth/callback", get(oauth_callback))
        .with_state(processor)
}

async fn handle_webhook(
    State(processor): State<Arc<WebhookProcessor>>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = payload else {
        tracing::warn!("⚠️ Rejected malformed webhook payload");
        return invalid_payload();
    };

    if let Some(challenge) = challenge_of(&body) {
        return challenge_response(challenge);
    }

    tracing::debug!("Webhook received: {}", body);
    let envelope: WebhookEnvelope = match serde_json::from_value(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("⚠️ Webhook payload does not match the event shape: {}", e);
            return invalid_payload();
        }
    };
    let Some(event) = envelope.event else {
        return invalid_payload();
    };

    match processor.handle_event(&event).await {
        Ok(outcome) => {
            tracing::debug!("Webhook outcome: {:?}", outcome);
            (StatusCode::OK, "Webhook received and processed.").into_response()
        }
        Err(e) => {
            tracing::error!("❌ Error processing the webhook: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error processing the webhook.").into_response()
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
}

/// OAuth 授權碼回呼，只回顯授權碼供手動換發 refresh token
async fn oauth_callback(Query(params): Query<CallbackParams>) -> Response {
    match params.code.filter(|code| !code.is_empty()) {
        Some(code) => {
            tracing::info!("🔑 Auth code received");
            (StatusCode::OK, format!("Auth code received: {}", code)).into_response()
        }
        None => (StatusCode::BAD_REQUEST, "No auth code received").into_response(),
    }
}

pub async fn serve(config: &AppConfig) -> Result<()> {
    let processor = Arc::new(WebhookProcessor::from_config(config).await?);
    let app = router(processor, &config.webhook.path);

    let addr = format!("{}:{}", config.webhook.host, config.webhook.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🚀 Webhook server listening on {}{}", addr, config.webhook.path);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_detection() {
        assert!(challenge_of(&json!({"challenge": "abc"})).is_some());
        assert!(challenge_of(&json!({"challenge": 3})).is_some());
        assert!(challenge_of(&json!({"challenge": ""})).is_none());
        assert!(challenge_of(&json!({"challenge": null, "event": {}})).is_none());
        assert!(challenge_of(&json!({"event": {}})).is_none());
    }

    #[test]
    fn test_download_names_are_unique() {
        let first = unique_download_name("scan.pdf");
        let second = unique_download_name("scan.pdf");
        assert_ne!(first, second);
        assert!(first.ends_with("-scan.pdf"));
        assert!(!unique_download_name("a/b.pdf").contains('/'));
    }
}
