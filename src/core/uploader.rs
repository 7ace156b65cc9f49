use crate::config::BoardConfig;
use crate::core::ledger::UploadLedger;
use crate::domain::model::{BoardLookup, UploadReport};
use crate::domain::ports::BoardApi;
use crate::utils::error::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// 把本機檔案上傳到所有 email 相符的 item，並以 ledger 確保每個 board 只上傳一次
pub struct FileUploader<B: BoardApi> {
    api: Arc<B>,
    boards: Vec<BoardConfig>,
    ledger: Arc<Mutex<UploadLedger>>,
}

impl<B: BoardApi> Clone for FileUploader<B> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            boards: self.boards.clone(),
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<B: BoardApi> FileUploader<B> {
    pub fn new(api: Arc<B>, boards: Vec<BoardConfig>, ledger: Arc<Mutex<UploadLedger>>) -> Self {
        Self { api, boards, ledger }
    }

    pub fn api(&self) -> &B {
        &self.api
    }

    pub fn ledger(&self) -> Arc<Mutex<UploadLedger>> {
        Arc::clone(&self.ledger)
    }

    pub fn lookups(&self) -> Vec<BoardLookup> {
        self.boards.iter().map(BoardConfig::lookup).collect()
    }

    /// `file_name` 為 ledger key 與上傳檔名，`file_path` 為實際下載位置
    pub async fn process_file_upload(&self, email: &str, file_name: &str, file_path: &Path) -> Result<UploadReport> {
        let items = self.api.find_items_by_email(&self.lookups(), email).await?;
        let mut report = UploadReport {
            matched: items.len(),
            ..UploadReport::default()
        };

        if items.is_empty() {
            tracing::info!("🔍 No items found for {}, nothing to upload", email);
            return Ok(report);
        }

        let data = tokio::fs::read(file_path).await?;

        // 檢查、上傳、寫入紀錄期間都持有鎖，避免並行請求重複上傳
        let mut ledger = self.ledger.lock().await;

        for item in items {
            let Some(column_id) = self
                .boards
                .iter()
                .find(|board| board.id == item.board_id)
                .and_then(|board| board.file_column.as_deref())
            else {
                tracing::info!("No file column mapped for board {}, skipping item {}", item.board_id, item.id);
                report.skipped += 1;
                continue;
            };

            if ledger.contains(item.board_id, email, file_name) {
                tracing::info!(
                    "⏭️ {} already uploaded for {} on board {}",
                    file_name,
                    email,
                    item.board_id
                );
                report.skipped += 1;
                continue;
            }

            match self
                .api
                .upload_file_to_column(&item.id, column_id, file_name, data.clone())
                .await
            {
                Ok(asset_id) => {
                    tracing::info!(
                        "✅ Uploaded {} to item {} on board {} (asset {})",
                        file_name,
                        item.id,
                        item.board_id,
                        asset_id
                    );
                    ledger.record(item.board_id, email, file_name);
                    if let Err(e) = ledger.save().await {
                        tracing::error!("❌ Could not persist upload ledger: {}", e);
                    }
                    report.uploaded += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "❌ Upload of {} to item {} on board {} failed: {}",
                        file_name,
                        item.id,
                        item.board_id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::SyncError;
    use crate::domain::model::BoardItem;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MockBoardApi {
        items: Vec<BoardItem>,
        fail_items: Vec<String>,
        uploads: StdMutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl BoardApi for MockBoardApi {
        async fn find_items_by_email(&self, _boards: &[BoardLookup], email: &str) -> Result<Vec<BoardItem>> {
            if email.is_empty() {
                return Err(SyncError::MissingEmail);
            }
            Ok(self.items.clone())
        }

        async fn upload_file_to_column(
            &self,
            item_id: &str,
            column_id: &str,
            file_name: &str,
            _data: Vec<u8>,
        ) -> Result<String> {
            if self.fail_items.iter().any(|id| id == item_id) {
                return Err(SyncError::ApiError {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.uploads.lock().unwrap().push((
                item_id.to_string(),
                column_id.to_string(),
                file_name.to_string(),
            ));
            Ok("asset-1".to_string())
        }
    }

    fn board(id: u64, file_column: Option<&str>) -> BoardConfig {
        BoardConfig {
            id,
            email_column: "email".to_string(),
            file_column: file_column.map(str::to_string),
            owner_column: None,
            owner_text_column: None,
            notes_column: None,
        }
    }

    fn item(board_id: u64, id: &str) -> BoardItem {
        BoardItem {
            board_id,
            id: id.to_string(),
        }
    }

    async fn setup(api: MockBoardApi, dir: &TempDir) -> (FileUploader<MockBoardApi>, std::path::PathBuf) {
        let file = dir.path().join("scan.pdf");
        std::fs::write(&file, b"%PDF").unwrap();
        let ledger = UploadLedger::load(dir.path().join("ledger.json")).await.unwrap();
        let uploader = FileUploader::new(
            Arc::new(api),
            vec![board(1, Some("files_a")), board(2, Some("files_b")), board(3, None)],
            Arc::new(Mutex::new(ledger)),
        );
        (uploader, file)
    }

    #[tokio::test]
    async fn test_uploads_once_per_board() {
        let dir = TempDir::new().unwrap();
        let api = MockBoardApi {
            items: vec![item(1, "10"), item(2, "20"), item(3, "30")],
            ..Default::default()
        };
        let (uploader, file) = setup(api, &dir).await;

        let first = uploader.process_file_upload("jane@example.com", "scan.pdf", &file).await.unwrap();
        assert_eq!(first.matched, 3);
        assert_eq!(first.uploaded, 2);
        assert_eq!(first.skipped, 1);

        let second = uploader.process_file_upload("jane@example.com", "scan.pdf", &file).await.unwrap();
        assert_eq!(second.uploaded, 0);
        assert_eq!(second.skipped, 3);

        let uploads = uploader.api().uploads.lock().unwrap().clone();
        assert_eq!(
            uploads,
            vec![
                ("10".to_string(), "files_a".to_string(), "scan.pdf".to_string()),
                ("20".to_string(), "files_b".to_string(), "scan.pdf".to_string()),
            ]
        );

        let reloaded = UploadLedger::load(dir.path().join("ledger.json")).await.unwrap();
        assert!(reloaded.contains(2, "jane@example.com", "scan.pdf"));
    }

    #[tokio::test]
    async fn test_logical_name_is_ledger_key() {
        let dir = TempDir::new().unwrap();
        let api = MockBoardApi {
            items: vec![item(1, "10")],
            ..Default::default()
        };
        let (uploader, _) = setup(api, &dir).await;
        let downloaded = dir.path().join("1700000000000-1-lab_results.pdf");
        std::fs::write(&downloaded, b"%PDF").unwrap();

        let report = uploader
            .process_file_upload("jane@example.com", "lab:results.pdf", &downloaded)
            .await
            .unwrap();
        assert_eq!(report.uploaded, 1);

        let uploads = uploader.api().uploads.lock().unwrap().clone();
        assert_eq!(uploads[0].2, "lab:results.pdf");

        let ledger = uploader.ledger();
        let ledger = ledger.lock().await;
        assert!(ledger.contains(1, "jane@example.com", "lab:results.pdf"));
        assert!(!ledger.contains(1, "jane@example.com", "1700000000000-1-lab_results.pdf"));
    }

    #[tokio::test]
    async fn test_failed_upload_is_not_recorded() {
        let dir = TempDir::new().unwrap();
        let api = MockBoardApi {
            items: vec![item(1, "10"), item(2, "20")],
            fail_items: vec!["20".to_string()],
            ..Default::default()
        };
        let (uploader, file) = setup(api, &dir).await;

        let report = uploader.process_file_upload("jane@example.com", "scan.pdf", &file).await.unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.failed, 1);

        let ledger = uploader.ledger();
        let ledger = ledger.lock().await;
        assert!(ledger.contains(1, "jane@example.com", "scan.pdf"));
        assert!(!ledger.contains(2, "jane@example.com", "scan.pdf"));
    }

    #[tokio::test]
    async fn test_no_items_uploads_nothing() {
        let dir = TempDir::new().unwrap();
        let (uploader, file) = setup(MockBoardApi::default(), &dir).await;

        let report = uploader.process_file_upload("nobody@example.com", "scan.pdf", &file).await.unwrap();
        assert_eq!(report, UploadReport::default());
    }

    #[tokio::test]
    async fn test_missing_email_is_error() {
        let dir = TempDir::new().unwrap();
        let (uploader, file) = setup(MockBoardApi::default(), &dir).await;

        let err = uploader.process_file_upload("", "scan.pdf", &file).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingEmail));
    }
}
