use crate::adapters::storage::sanitize_file_name;
use crate::adapters::{LocalStorage, MondayClient, ZohoClient};
use crate::core::FileUploader;
use crate::domain::model::{CrmRecord, JobReport};
use crate::domain::ports::{Storage, SyncJob};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// 下載 CRM 記錄的附件，可選擇再上傳到看板
pub struct AttachmentDownloadJob {
    crm: Arc<ZohoClient>,
    storage: LocalStorage,
    uploader: Option<FileUploader<MondayClient>>,
    module: String,
    limit: Option<usize>,
}

impl AttachmentDownloadJob {
    pub fn new(crm: Arc<ZohoClient>, storage: LocalStorage, module: impl Into<String>) -> Self {
        Self {
            crm,
            storage,
            uploader: None,
            module: module.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_uploader(mut self, uploader: FileUploader<MondayClient>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// 回傳下載成功的附件數
    async fn download_record(&self, record: &CrmRecord, email: &str) -> Result<usize> {
        let attachments = self.crm.attachments(&self.module, &record.id).await?;
        let mut downloaded = 0;

        for attachment in &attachments {
            let data = match self
                .crm
                .download_attachment(&self.module, &record.id, &attachment.id)
                .await
            {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!("❌ Error downloading attachment {}: {}", attachment.file_name, e);
                    continue;
                }
            };

            let relative = format!("{}/{}", sanitize_file_name(email), sanitize_file_name(&attachment.file_name));
            let path = self.storage.write_file(&relative, &data).await?;
            tracing::info!("💾 Saved {}", path.display());
            downloaded += 1;

            if let Some(uploader) = &self.uploader {
                if let Err(e) = uploader
                    .process_file_upload(email, &attachment.file_name, &path)
                    .await
                {
                    tracing::error!("❌ Upload of {} failed: {}", path.display(), e);
                }
            }
        }

        Ok(downloaded)
    }
}

#[async_trait]
impl SyncJob for AttachmentDownloadJob {
    fn name(&self) -> &str {
        "attachment-download"
    }

    async fn run(&self) -> Result<JobReport> {
        let records = self
            .crm
            .list_records(&self.module, &["id", "Full_Name", "Email"], self.limit)
            .await?;
        let mut report = JobReport::default();

        for record in &records {
            report.processed += 1;
            let Some(email) = record.email() else {
                report.skipped += 1;
                continue;
            };

            match self.download_record(record, email).await {
                Ok(0) => report.skipped += 1,
                Ok(count) => {
                    tracing::info!("📎 {} attachment(s) for {}", count, email);
                    report.updated += 1;
                }
                Err(e) => {
                    tracing::error!("❌ Error fetching attachments for {}: {}", email, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
