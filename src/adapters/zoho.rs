use crate::config::ZohoConfig;
use crate::domain::model::{Attachment, CrmRecord, EmailSummary};
use crate::utils::error::{Result, SyncError};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;

const MAX_PER_PAGE: usize = 200;
/// 快取的 token 一律視為一小時有效
const CACHED_TOKEN_LIFETIME_SECS: i64 = 3600;
const EXPIRY_MARGIN_SECS: i64 = 60;

/// 磁碟上的 token 快取格式
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenCache {
    access_token: String,
    /// 取得時間（毫秒）
    timestamp: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct RecordsPage {
    #[serde(default)]
    data: Vec<CrmRecord>,
    info: Option<PageInfo>,
}

#[derive(Deserialize)]
struct PageInfo {
    more_records: Option<bool>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct EmailsResponse {
    #[serde(rename = "Emails", default)]
    emails: Vec<RawEmail>,
}

#[derive(Deserialize)]
struct RawEmail {
    subject: Option<String>,
    from: Option<Address>,
    #[serde(default)]
    to: Vec<Address>,
    message_id: String,
    content: Option<String>,
    time: Option<String>,
    sent_time: Option<String>,
}

#[derive(Deserialize)]
struct Address {
    email: Option<String>,
}

#[derive(Deserialize)]
struct EmailDetail {
    #[serde(default)]
    email_related_list: Vec<EmailBody>,
}

#[derive(Deserialize)]
struct EmailBody {
    content: Option<String>,
}

#[derive(Deserialize)]
struct AttachmentsResponse {
    #[serde(default)]
    data: Vec<Attachment>,
}

impl From<RawEmail> for EmailSummary {
    fn from(raw: RawEmail) -> Self {
        EmailSummary {
            subject: raw.subject.unwrap_or_default(),
            from: raw.from.and_then(|a| a.email).unwrap_or_default(),
            to: raw
                .to
                .into_iter()
                .filter_map(|a| a.email)
                .collect::<Vec<_>>()
                .join(", "),
            message_id: raw.message_id,
            content: raw.content,
            sent_time: raw.time.or(raw.sent_time),
        }
    }
}

/// CRM（Zoho）REST API 客戶端，內含 OAuth token 管理
#[derive(Debug)]
pub struct ZohoClient {
    client: Client,
    config: ZohoConfig,
    token: Mutex<Option<CachedToken>>,
}

impl ZohoClient {
    pub fn new(config: &ZohoConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        Ok(Self {
            client: builder.build()?,
            config: config.clone(),
            token: Mutex::new(None),
        })
    }

    /// 取得 access token：記憶體 → 磁碟快取 → refresh token 換發
    pub async fn access_token(&self, force_refresh: bool) -> Result<String> {
        let mut current = self.token.lock().await;
        let now = Utc::now();

        if !force_refresh {
            if let Some(token) = current.as_ref().filter(|t| t.expires_at > now) {
                return Ok(token.value.clone());
            }

            if let Some(cached) = self.load_cache().await {
                let issued = Utc.timestamp_millis_opt(cached.timestamp).single();
                let expires_at = issued.map(|issued| {
                    issued + ChronoDuration::seconds(CACHED_TOKEN_LIFETIME_SECS - EXPIRY_MARGIN_SECS)
                });
                if let Some(expires_at) = expires_at.filter(|at| *at > now) {
                    tracing::debug!("🔑 Using cached access token");
                    *current = Some(CachedToken {
                        value: cached.access_token.clone(),
                        expires_at,
                    });
                    return Ok(cached.access_token);
                }
            }
        }

        let token = self.refresh_access_token().await?;
        let value = token.value.clone();
        *current = Some(token);
        Ok(value)
    }

    async fn refresh_access_token(&self) -> Result<CachedToken> {
        let url = format!("{}/oauth/v2/token", self.config.accounts_url.trim_end_matches('/'));
        tracing::info!("🔑 Refreshing CRM access token");

        let response = self
            .client
            .post(&url)
            .query(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: Option<TokenResponse> = serde_json::from_str(&body).ok();

        let Some(TokenResponse {
            access_token: Some(access_token),
            expires_in,
            ..
        }) = parsed
        else {
            return Err(SyncError::AuthError {
                message: format!("Token refresh failed ({}): {}", status, body),
            });
        };

        if !status.is_success() {
            return Err(SyncError::AuthError {
                message: format!("Token refresh failed ({}): {}", status, body),
            });
        }

        let now = Utc::now();
        let lifetime = expires_in.unwrap_or(CACHED_TOKEN_LIFETIME_SECS) - EXPIRY_MARGIN_SECS;
        self.save_cache(&TokenCache {
            access_token: access_token.clone(),
            timestamp: now.timestamp_millis(),
        })
        .await;

        tracing::info!("✅ Access token obtained");
        Ok(CachedToken {
            value: access_token,
            expires_at: now + ChronoDuration::seconds(lifetime.max(0)),
        })
    }

    async fn load_cache(&self) -> Option<TokenCache> {
        let content = tokio::fs::read_to_string(&self.config.token_cache_path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!("⚠️ Ignoring unreadable token cache {}: {}", self.config.token_cache_path, e);
                None
            }
        }
    }

    async fn save_cache(&self, cache: &TokenCache) {
        let path = Path::new(&self.config.token_cache_path);
        let result = async {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, serde_json::to_vec(cache)?).await?;
            Ok::<_, SyncError>(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("⚠️ Could not write token cache {}: {}", path.display(), e);
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/crm/{}", self.config.api_domain.trim_end_matches('/'), path)
    }

    /// 帶授權的 GET；收到 401 INVALID_TOKEN 時強制換發 token 並重試一次
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let mut force_refresh = false;

        loop {
            let token = self.access_token(force_refresh).await?;
            let response = self
                .client
                .get(url)
                .header(AUTHORIZATION, format!("Zoho-oauthtoken {}", token))
                .query(query)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                let body = response.text().await?;
                if !force_refresh && body.contains("INVALID_TOKEN") {
                    tracing::warn!("🔑 Access token rejected, renewing");
                    force_refresh = true;
                    continue;
                }
                return Err(SyncError::AuthError { message: body });
            }

            if !status.is_success() {
                return Err(SyncError::ApiError {
                    status: status.as_u16(),
                    body: response.text().await?,
                });
            }

            return Ok(response);
        }
    }

    /// GET 並解析 JSON；204 No Content 回傳 None
    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<Option<T>> {
        let response = self.get(url, query).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&body)?))
    }

    pub async fn list_records(&self, module: &str, fields: &[&str], limit: Option<usize>) -> Result<Vec<CrmRecord>> {
        let url = self.api_url(&format!("v3/{}", module));
        let per_page = limit.map_or(MAX_PER_PAGE, |l| l.clamp(1, MAX_PER_PAGE));
        let mut records: Vec<CrmRecord> = Vec::new();
        let mut page = 1usize;
        let mut page_token: Option<String> = None;

        tracing::info!("📡 Fetching {} records from CRM", module);

        loop {
            let mut query = vec![("fields", fields.join(",")), ("per_page", per_page.to_string())];
            match &page_token {
                Some(token) => query.push(("page_token", token.clone())),
                None => query.push(("page", page.to_string())),
            }

            let body = match self.get_json::<RecordsPage>(&url, &query).await {
                Ok(Some(body)) => body,
                Ok(None) => break,
                Err(e @ SyncError::AuthError { .. }) => return Err(e),
                Err(SyncError::ApiError { body, .. }) if body.contains("DISCRETE_PAGINATION_LIMIT_EXCEEDED") => {
                    tracing::warn!("⚠️ Pagination limit reached for {}: {}", module, body);
                    break;
                }
                Err(e) => {
                    tracing::error!("❌ Error fetching {} records: {}", module, e);
                    break;
                }
            };

            if body.data.is_empty() {
                break;
            }
            records.extend(body.data);
            tracing::debug!("Fetched page {}, total {} records", page, records.len());

            if let Some(limit) = limit {
                if records.len() >= limit {
                    records.truncate(limit);
                    break;
                }
            }

            let info = body.info.unwrap_or(PageInfo {
                more_records: Some(false),
                next_page_token: None,
            });
            if info.more_records == Some(false) {
                break;
            }
            match info.next_page_token {
                Some(token) => page_token = Some(token),
                None if page_token.is_some() => break,
                None => page += 1,
            }
        }

        tracing::info!("📊 Fetched {} {} records", records.len(), module);
        Ok(records)
    }

    pub async fn record_emails(&self, module: &str, record_id: &str) -> Result<Vec<EmailSummary>> {
        let url = self.api_url(&format!("v3/{}/{}/Emails", module, record_id));
        let emails = self
            .get_json::<EmailsResponse>(&url, &[])
            .await?
            .map(|body| body.emails)
            .unwrap_or_default();

        tracing::debug!("Found {} emails for record {}", emails.len(), record_id);
        Ok(emails.into_iter().map(EmailSummary::from).collect())
    }

    pub async fn email_content(&self, module: &str, record_id: &str, message_id: &str) -> Result<Option<String>> {
        let url = self.api_url(&format!("v3/{}/{}/Emails/{}", module, record_id, message_id));
        let detail = self.get_json::<EmailDetail>(&url, &[]).await?;

        Ok(detail
            .and_then(|d| d.email_related_list.into_iter().next())
            .and_then(|body| body.content))
    }

    pub async fn attachments(&self, module: &str, record_id: &str) -> Result<Vec<Attachment>> {
        let url = self.api_url(&format!("v2/{}/{}/Attachments", module, record_id));
        Ok(self
            .get_json::<AttachmentsResponse>(&url, &[])
            .await?
            .map(|body| body.data)
            .unwrap_or_default())
    }

    pub async fn download_attachment(&self, module: &str, record_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        let url = self.api_url(&format!("v2/{}/{}/Attachments/{}", module, record_id, attachment_id));
        let response = self.get(&url, &[]).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
