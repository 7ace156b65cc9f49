use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

pub type BoardId = u64;

/// Webhook 外層封包：握手時只有 `challenge`，一般事件只有 `event`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<WebhookEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    CreatePulse,
    UpdateColumnValue,
    Other(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "de::lenient_u64")]
    pub board_id: Option<BoardId>,
    #[serde(default, deserialize_with = "de::lenient_u64")]
    pub pulse_id: Option<u64>,
    #[serde(default)]
    pub column_id: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub column_values: Option<Map<String, Value>>,
}

/// 事件中引用的檔案資產
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub asset_id: String,
    pub name: String,
}

impl WebhookEvent {
    pub fn event_kind(&self) -> EventKind {
        match self.kind.as_str() {
            "create_pulse" => EventKind::CreatePulse,
            "update_column_value" => EventKind::UpdateColumnValue,
            other => EventKind::Other(other.to_string()),
        }
    }

    /// 從 email 欄位讀取 email，優先 `.email`，其次 `.text`
    pub fn email(&self, email_column: &str) -> Option<String> {
        let column = self.column_values.as_ref()?.get(email_column)?;
        ["email", "text"]
            .iter()
            .filter_map(|key| column.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn files(&self, file_column: &str) -> Vec<AssetRef> {
        let files = match self.event_kind() {
            EventKind::CreatePulse => self
                .column_values
                .as_ref()
                .and_then(|values| values.get(file_column))
                .and_then(|column| column.get("files")),
            EventKind::UpdateColumnValue if self.column_id.as_deref() == Some(file_column) => {
                self.value.as_ref().and_then(|value| value.get("files"))
            }
            _ => None,
        };

        files
            .and_then(Value::as_array)
            .map(|files| files.iter().filter_map(asset_ref).collect())
            .unwrap_or_default()
    }
}

fn asset_ref(file: &Value) -> Option<AssetRef> {
    let asset_id = match file.get("assetId")? {
        Value::Number(n) => n.to_string(),
        Value::String(s) if !s.is_empty() => s.clone(),
        _ => return None,
    };
    let name = file
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("asset-{}", asset_id));
    Some(AssetRef { asset_id, name })
}

/// 依 email 查詢時，每個 board 使用的欄位
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardLookup {
    pub board_id: BoardId,
    pub email_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardItem {
    pub board_id: BoardId,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BoardUser {
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,
    pub name: String,
}

/// CRM 記錄；只固定 `id`，其餘欄位保留原樣
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmRecord {
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

impl CrmRecord {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn email(&self) -> Option<&str> {
        self.str_field("Email")
    }

    pub fn display_name(&self) -> Option<&str> {
        self.str_field("Full_Name").or_else(|| self.str_field("Name"))
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.fields
            .get("Owner")
            .and_then(|owner| owner.get("name"))
            .and_then(Value::as_str)
    }

    pub fn notes(&self) -> Option<&str> {
        self.str_field("Notes")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSummary {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub message_id: String,
    pub content: Option<String>,
    pub sent_time: Option<String>,
}

/// 要寫進 PDF 的單封郵件
#[derive(Debug, Clone)]
pub struct MailEntry {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub sent_time: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Attachment {
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,
    #[serde(rename = "File_Name")]
    pub file_name: String,
}

/// 上傳結果統計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub matched: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl UploadReport {
    pub fn merge(&mut self, other: &UploadReport) {
        self.matched += other.matched;
        self.uploaded += other.uploaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// 批次作業結果統計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub processed: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed: {}, updated: {}, skipped: {}, failed: {}",
            self.processed, self.updated, self.skipped, self.failed
        )
    }
}

pub(crate) mod de {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        })
    }

    pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "expected string or number, got {}",
                other
            ))),
        }
    }
}
