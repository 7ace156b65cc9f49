use crate::domain::model::{BoardItem, BoardLookup, JobReport};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

pub trait Storage: Send + Sync {
    /// 寫入檔案並回傳實際寫入的位置
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<PathBuf>> + Send;
}

/// 看板平台上查詢 item 與上傳檔案的能力
#[async_trait]
pub trait BoardApi: Send + Sync {
    async fn find_items_by_email(&self, boards: &[BoardLookup], email: &str) -> Result<Vec<BoardItem>>;

    async fn upload_file_to_column(
        &self,
        item_id: &str,
        column_id: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<String>;
}

#[async_trait]
pub trait SyncJob: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self) -> Result<JobReport>;
}
