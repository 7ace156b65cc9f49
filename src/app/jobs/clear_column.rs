use crate::adapters::MondayClient;
use crate::domain::model::{BoardId, JobReport};
use crate::domain::ports::SyncJob;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// 清空 board 上所有 item 的指定欄位
pub struct ClearColumnJob {
    monday: Arc<MondayClient>,
    board_id: BoardId,
    column_id: String,
}

impl ClearColumnJob {
    pub fn new(monday: Arc<MondayClient>, board_id: BoardId, column_id: impl Into<String>) -> Self {
        Self {
            monday,
            board_id,
            column_id: column_id.into(),
        }
    }
}

#[async_trait]
impl SyncJob for ClearColumnJob {
    fn name(&self) -> &str {
        "clear-column"
    }

    async fn run(&self) -> Result<JobReport> {
        let item_ids = self.monday.board_item_ids(self.board_id).await?;
        let mut report = JobReport::default();

        for item_id in &item_ids {
            report.processed += 1;
            match self.monday.clear_column(self.board_id, item_id, &self.column_id).await {
                Ok(_) => report.updated += 1,
                Err(e) => {
                    tracing::error!("❌ Could not clear {} on item {}: {}", self.column_id, item_id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
