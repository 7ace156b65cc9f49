use crate::domain::model::{BoardId, BoardLookup};
use crate::utils::error::{Result, SyncError};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_unique,
    validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub monday: MondayConfig,
    #[serde(default)]
    pub boards: Vec<BoardConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    pub zoho: Option<ZohoConfig>,
    pub router: Option<RouterConfig>,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MondayConfig {
    #[serde(default = "default_monday_api_url")]
    pub api_url: String,
    #[serde(default = "default_monday_file_url")]
    pub file_upload_url: String,
    pub api_key: String,
    pub api_version: Option<String>,
    pub timeout_seconds: Option<u64>,
    /// 查詢發生 GraphQL 錯誤後，放棄該 board 前的等待秒數
    pub error_backoff_seconds: Option<u64>,
}

impl MondayConfig {
    pub fn error_backoff_seconds(&self) -> u64 {
        self.error_backoff_seconds.unwrap_or(10)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    pub id: BoardId,
    pub email_column: String,
    pub file_column: Option<String>,
    /// people 欄位，填入 CRM owner
    pub owner_column: Option<String>,
    /// 文字欄位，填入 CRM owner 名稱
    pub owner_text_column: Option<String>,
    pub notes_column: Option<String>,
}

impl BoardConfig {
    pub fn lookup(&self) -> BoardLookup {
        BoardLookup {
            board_id: self.id,
            email_column: self.email_column.clone(),
        }
    }

    pub fn has_lead_columns(&self) -> bool {
        self.owner_column.is_some() || self.owner_text_column.is_some() || self.notes_column.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub download_dir: String,
    pub ledger_path: String,
    pub checkpoint_path: String,
    pub mails_dir: String,
    pub attachments_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: "./files-uploaded".to_string(),
            ledger_path: "./state/uploaded-files.json".to_string(),
            checkpoint_path: "./state/progress.json".to_string(),
            mails_dir: "./mails-downloads".to_string(),
            attachments_dir: "./crm-attachments".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub email_column: String,
    pub file_column: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            path: "/webhook".to_string(),
            email_column: "e_mail__1".to_string(),
            file_column: "upload_file__1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZohoConfig {
    #[serde(default = "default_zoho_accounts_url")]
    pub accounts_url: String,
    #[serde(default = "default_zoho_api_domain")]
    pub api_domain: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_cache_path")]
    pub token_cache_path: String,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_router_port")]
    pub port: u16,
    #[serde(default = "default_router_path")]
    pub path: String,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub board_id: BoardId,
    pub target: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailConfig {
    /// 額外要從郵件內容移除的區塊（正規表達式）
    #[serde(default)]
    pub notice_patterns: Vec<String>,
}

fn default_monday_api_url() -> String {
    "https://api.monday.com/v2".to_string()
}

fn default_monday_file_url() -> String {
    "https://api.monday.com/v2/file".to_string()
}

fn default_zoho_accounts_url() -> String {
    "https://accounts.zoho.eu".to_string()
}

fn default_zoho_api_domain() -> String {
    "https://www.zohoapis.eu".to_string()
}

fn default_token_cache_path() -> String {
    "./state/access-token.json".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_router_port() -> u16 {
    3000
}

fn default_router_path() -> String {
    "/webhook".to_string()
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| SyncError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 載入並驗證配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn ledger_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.ledger_path)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.checkpoint_path)
    }

    pub fn zoho(&self) -> Result<&ZohoConfig> {
        self.zoho.as_ref().ok_or_else(|| SyncError::MissingConfigError {
            field: "zoho".to_string(),
        })
    }

    pub fn router(&self) -> Result<&RouterConfig> {
        self.router.as_ref().ok_or_else(|| SyncError::MissingConfigError {
            field: "router".to_string(),
        })
    }
}

/// 替換環境變數，支援 `${VAR}` 與 `${VAR:-default}`；找不到的變數保持原樣
pub fn substitute_env_vars(content: &str) -> String {
    static ENV_VAR: OnceLock<Regex> = OnceLock::new();
    let re = ENV_VAR.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid env var pattern")
    });

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match (std::env::var(var_name), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => caps[0].to_string(),
        }
    })
    .into_owned()
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validate_url("monday.api_url", &self.monday.api_url)?;
        validate_url("monday.file_upload_url", &self.monday.file_upload_url)?;
        validate_non_empty_string("monday.api_key", &self.monday.api_key)?;
        if self.monday.api_key.starts_with("${") {
            return Err(SyncError::InvalidConfigValueError {
                field: "monday.api_key".to_string(),
                value: self.monday.api_key.clone(),
                reason: "Environment variable is not set".to_string(),
            });
        }
        if let Some(timeout) = self.monday.timeout_seconds {
            validate_positive_number("monday.timeout_seconds", timeout, 1)?;
        }

        validate_unique("boards.id", self.boards.iter().map(|b| b.id))?;
        for board in &self.boards {
            validate_non_empty_string(&format!("boards.{}.email_column", board.id), &board.email_column)?;
        }

        validate_path("storage.download_dir", &self.storage.download_dir)?;
        validate_path("storage.ledger_path", &self.storage.ledger_path)?;
        validate_path("storage.checkpoint_path", &self.storage.checkpoint_path)?;
        validate_path("storage.mails_dir", &self.storage.mails_dir)?;
        validate_path("storage.attachments_dir", &self.storage.attachments_dir)?;

        validate_positive_number("webhook.port", u64::from(self.webhook.port), 1)?;
        validate_non_empty_string("webhook.email_column", &self.webhook.email_column)?;
        validate_non_empty_string("webhook.file_column", &self.webhook.file_column)?;
        if !self.webhook.path.starts_with('/') {
            return Err(SyncError::InvalidConfigValueError {
                field: "webhook.path".to_string(),
                value: self.webhook.path.clone(),
                reason: "Path must start with '/'".to_string(),
            });
        }

        if let Some(zoho) = &self.zoho {
            validate_url("zoho.accounts_url", &zoho.accounts_url)?;
            validate_url("zoho.api_domain", &zoho.api_domain)?;
            validate_non_empty_string("zoho.client_id", &zoho.client_id)?;
            validate_non_empty_string("zoho.client_secret", &zoho.client_secret)?;
            validate_non_empty_string("zoho.refresh_token", &zoho.refresh_token)?;
            validate_path("zoho.token_cache_path", &zoho.token_cache_path)?;
        }

        if let Some(router) = &self.router {
            validate_unique("router.routes.board_id", router.routes.iter().map(|r| r.board_id))?;
            for route in &router.routes {
                validate_url(&format!("router.routes.{}.target", route.board_id), &route.target)?;
            }
        }

        for pattern in &self.mail.notice_patterns {
            Regex::new(pattern).map_err(|e| SyncError::InvalidConfigValueError {
                field: "mail.notice_patterns".to_string(),
                value: pattern.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }
}
