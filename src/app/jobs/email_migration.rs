use crate::adapters::storage::sanitize_file_name;
use crate::adapters::{LocalStorage, MondayClient, ZohoClient};
use crate::core::document::render_mail_pdf;
use crate::core::{FileUploader, MailCleaner};
use crate::domain::model::{CrmRecord, EmailSummary, JobReport, MailEntry};
use crate::domain::ports::{Storage, SyncJob};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

const NO_CONTENT: &str = "No content available";

/// 把 CRM 記錄的郵件往來整理成一份 PDF，並上傳到看板上對應的 item
pub struct EmailMigrationJob {
    crm: Arc<ZohoClient>,
    uploader: FileUploader<MondayClient>,
    cleaner: MailCleaner,
    mails: LocalStorage,
    module: String,
    name_field: String,
    limit: Option<usize>,
}

impl EmailMigrationJob {
    pub fn new(
        crm: Arc<ZohoClient>,
        uploader: FileUploader<MondayClient>,
        cleaner: MailCleaner,
        mails: LocalStorage,
        module: impl Into<String>,
    ) -> Self {
        Self {
            crm,
            uploader,
            cleaner,
            mails,
            module: module.into(),
            name_field: "Full_Name".to_string(),
            limit: None,
        }
    }

    pub fn with_name_field(mut self, field: impl Into<String>) -> Self {
        self.name_field = field.into();
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    fn record_name<'a>(&self, record: &'a CrmRecord) -> &'a str {
        record
            .fields
            .get(&self.name_field)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| record.display_name())
            .unwrap_or(record.id.as_str())
    }

    async fn mail_entry(&self, record_id: &str, email: EmailSummary) -> MailEntry {
        let content = match email.content.filter(|c| !c.trim().is_empty()) {
            Some(content) => content,
            None => match self.crm.email_content(&self.module, record_id, &email.message_id).await {
                Ok(Some(content)) => content,
                Ok(None) => NO_CONTENT.to_string(),
                Err(e) => {
                    tracing::warn!("⚠️ Could not fetch content of message {}: {}", email.message_id, e);
                    NO_CONTENT.to_string()
                }
            },
        };

        MailEntry {
            subject: email.subject,
            from: email.from,
            to: email.to,
            sent_time: email.sent_time,
            content: self.cleaner.clean(&content),
        }
    }

    /// 回傳是否有檔案上傳
    async fn migrate_record(&self, record: &CrmRecord, email: &str) -> Result<bool> {
        let name = self.record_name(record);
        let emails = self.crm.record_emails(&self.module, &record.id).await?;
        if emails.is_empty() {
            tracing::info!("📭 No emails found for {}", name);
            return Ok(false);
        }

        let mut entries = Vec::with_capacity(emails.len());
        for summary in emails {
            entries.push(self.mail_entry(&record.id, summary).await);
        }

        let title = format!("emails-{}", sanitize_file_name(name));
        let pdf = render_mail_pdf(&title, &entries)?;
        let path = self
            .mails
            .write_file(&format!("{}/{}.pdf", sanitize_file_name(email), title), &pdf)
            .await?;
        tracing::info!("📄 PDF with {} emails created: {}", entries.len(), path.display());

        let report = self
            .uploader
            .process_file_upload(email, &format!("emails-{}.pdf", name), &path)
            .await?;
        Ok(report.uploaded > 0)
    }
}

#[async_trait]
impl SyncJob for EmailMigrationJob {
    fn name(&self) -> &str {
        "email-migration"
    }

    async fn run(&self) -> Result<JobReport> {
        let fields = ["id", self.name_field.as_str(), "Email"];
        let records = self.crm.list_records(&self.module, &fields, self.limit).await?;
        let mut report = JobReport::default();

        for record in &records {
            report.processed += 1;
            let Some(email) = record.email() else {
                tracing::info!("Record {} has no email, skipping", self.record_name(record));
                report.skipped += 1;
                continue;
            };

            match self.migrate_record(record, email).await {
                Ok(true) => report.updated += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::error!("❌ Email migration failed for {}: {}", email, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
