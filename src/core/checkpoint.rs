use crate::core::ledger::write_json_atomic;
use crate::domain::model::de;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 批次作業的進度紀錄，用來從上次中斷處繼續
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCheckpoint {
    #[serde(default)]
    pub last_lead_email: String,
    #[serde(deserialize_with = "de::string_or_number")]
    pub last_lead_id: String,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<Option<ProgressCheckpoint>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                tracing::warn!("⚠️ Ignoring unreadable checkpoint {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    pub async fn save(&self, checkpoint: &ProgressCheckpoint) -> Result<()> {
        write_json_atomic(&self.path, checkpoint).await
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_load_clear() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        assert_eq!(store.load().await.unwrap(), None);

        let checkpoint = ProgressCheckpoint {
            last_lead_email: "jane@example.com".to_string(),
            last_lead_id: "42".to_string(),
        };
        store.save(&checkpoint).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("progress.json")).unwrap();
        assert!(raw.contains("\"lastLeadId\": \"42\""));
        assert_eq!(store.load().await.unwrap(), Some(checkpoint));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_numeric_lead_id_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, r#"{"lastLeadEmail":"a@b.c","lastLeadId":5000123}"#).unwrap();

        let checkpoint = CheckpointStore::new(&path).load().await.unwrap().unwrap();
        assert_eq!(checkpoint.last_lead_id, "5000123");
    }
}
