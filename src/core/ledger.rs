use crate::domain::model::BoardId;
use crate::utils::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

type Entries = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// 已上傳檔案紀錄：board → email → 檔名
///
/// 只有上傳成功後才會寫入，因此同一個檔案不會重複上傳到同一個 board。
#[derive(Debug, Clone, Default)]
pub struct UploadLedger {
    path: PathBuf,
    entries: Entries,
}

impl UploadLedger {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Entries::new(),
        }
    }

    /// 載入紀錄檔；檔案不存在、空白或格式錯誤時視為空紀錄
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("📒 No upload ledger at {}, starting empty", path.display());
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Self::empty(path));
        }

        let entries = match serde_json::from_str::<Entries>(&content) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("⚠️ Upload ledger {} is corrupt ({}), starting empty", path.display(), e);
                Entries::new()
            }
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, board_id: BoardId, email: &str, file_name: &str) -> bool {
        self.files_for(board_id, email).iter().any(|f| f == file_name)
    }

    /// 新增一筆紀錄；已存在時回傳 false
    pub fn record(&mut self, board_id: BoardId, email: &str, file_name: &str) -> bool {
        let files = self
            .entries
            .entry(board_id.to_string())
            .or_default()
            .entry(email.to_string())
            .or_default();

        if files.iter().any(|f| f == file_name) {
            return false;
        }
        files.push(file_name.to_string());
        true
    }

    pub fn files_for(&self, board_id: BoardId, email: &str) -> &[String] {
        self.entries
            .get(&board_id.to_string())
            .and_then(|emails| emails.get(email))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.values().flat_map(|emails| emails.values()).map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.entries).await
    }
}

/// 先寫到同目錄的暫存檔再 rename，避免中斷時留下半個檔案
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
