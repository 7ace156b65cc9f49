use crate::config::MondayConfig;
use crate::domain::model::{BoardId, BoardItem, BoardLookup, BoardUser};
use crate::domain::ports::BoardApi;
use crate::utils::error::{GraphQlError, Result, SyncError};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const ITEMS_BY_EMAIL_QUERY: &str = r#"
query ($boardId: ID!, $columnId: String!, $email: String!, $cursor: String) {
  items_page_by_column_values(
    board_id: $boardId,
    columns: [{column_id: $columnId, column_values: [$email]}],
    cursor: $cursor
  ) {
    cursor
    items {
      id
      name
      column_values(ids: [$columnId]) {
        id
        text
      }
    }
  }
}"#;

const ASSET_QUERY: &str = r#"
query ($ids: [ID!]!) {
  assets(ids: $ids) {
    id
    name
    public_url
  }
}"#;

const USERS_QUERY: &str = "query { users { id name } }";

const BOARD_ITEMS_QUERY: &str = r#"
query ($boardIds: [ID!], $limit: Int!) {
  boards(ids: $boardIds) {
    items_page(limit: $limit) {
      cursor
      items { id }
    }
  }
}"#;

const NEXT_ITEMS_QUERY: &str = r#"
query ($cursor: String!, $limit: Int!) {
  next_items_page(cursor: $cursor, limit: $limit) {
    cursor
    items { id }
  }
}"#;

const CHANGE_COLUMNS_MUTATION: &str = r#"
mutation ($boardId: ID!, $itemId: ID!, $values: JSON!) {
  change_multiple_column_values(board_id: $boardId, item_id: $itemId, column_values: $values) {
    id
  }
}"#;

const CLEAR_COLUMN_MUTATION: &str = r#"
mutation ($boardId: ID!, $itemId: ID!, $columnId: String!, $value: JSON!) {
  change_column_value(board_id: $boardId, item_id: $itemId, column_id: $columnId, value: $value) {
    id
  }
}"#;

const ITEMS_PAGE_LIMIT: u32 = 500;

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<RawGraphQlError>,
    error_message: Option<String>,
    error_code: Option<String>,
}

#[derive(Deserialize)]
struct RawGraphQlError {
    message: String,
    #[serde(default)]
    extensions: Option<Value>,
}

impl From<RawGraphQlError> for GraphQlError {
    fn from(raw: RawGraphQlError) -> Self {
        let code = raw
            .extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string);
        GraphQlError {
            message: raw.message,
            code,
        }
    }
}

#[derive(Deserialize)]
struct ItemsByColumnValues {
    items_page_by_column_values: ItemsPage<MatchedItem>,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "I: Deserialize<'de>"))]
struct ItemsPage<I> {
    cursor: Option<String>,
    #[serde(default)]
    items: Vec<I>,
}

#[derive(Deserialize)]
struct MatchedItem {
    id: String,
    #[serde(default)]
    column_values: Vec<ColumnText>,
}

#[derive(Deserialize)]
struct ColumnText {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ItemId {
    id: String,
}

#[derive(Deserialize)]
struct Assets {
    assets: Vec<Asset>,
}

#[derive(Deserialize)]
struct Asset {
    public_url: Option<String>,
}

#[derive(Deserialize)]
struct Users {
    users: Vec<BoardUser>,
}

#[derive(Deserialize)]
struct Boards {
    boards: Vec<BoardItems>,
}

#[derive(Deserialize)]
struct BoardItems {
    items_page: ItemsPage<ItemId>,
}

#[derive(Deserialize)]
struct NextItems {
    next_items_page: ItemsPage<ItemId>,
}

#[derive(Deserialize)]
struct AddFile {
    add_file_to_column: ItemId,
}

#[derive(Deserialize)]
struct ChangeColumns {
    change_multiple_column_values: ItemId,
}

#[derive(Deserialize)]
struct ChangeColumn {
    change_column_value: ItemId,
}

/// 看板平台（monday.com GraphQL API）客戶端
#[derive(Debug, Clone)]
pub struct MondayClient {
    client: Client,
    api_url: String,
    file_upload_url: String,
    api_key: String,
    api_version: Option<String>,
    error_backoff: Duration,
}

impl MondayClient {
    pub fn new(config: &MondayConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        Ok(Self {
            client: builder.build()?,
            api_url: config.api_url.clone(),
            file_upload_url: config.file_upload_url.clone(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            error_backoff: Duration::from_secs(config.error_backoff_seconds()),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.bearer_auth(&self.api_key);
        match &self.api_version {
            Some(version) => request.header("API-Version", version),
            None => request,
        }
    }

    async fn parse_graphql<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(SyncError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GraphQlResponse<T> = serde_json::from_str(&body)?;

        if !parsed.errors.is_empty() {
            return Err(SyncError::GraphQlError {
                errors: parsed.errors.into_iter().map(GraphQlError::from).collect(),
            });
        }
        if let Some(message) = parsed.error_message {
            return Err(SyncError::GraphQlError {
                errors: vec![GraphQlError {
                    message,
                    code: parsed.error_code,
                }],
            });
        }

        parsed.data.ok_or_else(|| SyncError::ProcessingError {
            message: "GraphQL response contained no data".to_string(),
        })
    }

    pub async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let response = self
            .authorized(self.client.post(&self.api_url))
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        Self::parse_graphql(response).await
    }

    pub async fn asset_public_url(&self, asset_id: &str) -> Result<String> {
        let data: Assets = self.graphql(ASSET_QUERY, json!({ "ids": [asset_id] })).await?;

        data.assets
            .into_iter()
            .find_map(|asset| asset.public_url)
            .ok_or_else(|| SyncError::NotFound {
                what: format!("public URL for asset {}", asset_id),
            })
    }

    /// 下載公開 URL 的內容（public URL 已帶簽章，不需授權標頭）
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::ApiError {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// 對單一 board 做 cursor 分頁查詢；錯誤只記錄，回傳目前已找到的 item
    async fn search_board(&self, board: &BoardLookup, email: &str) -> Vec<BoardItem> {
        let mut matches: Vec<BoardItem> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let variables = json!({
                "boardId": board.board_id.to_string(),
                "columnId": board.email_column,
                "email": email,
                "cursor": cursor,
            });

            let page = match self
                .graphql::<ItemsByColumnValues>(ITEMS_BY_EMAIL_QUERY, variables)
                .await
            {
                Ok(data) => data.items_page_by_column_values,
                Err(e) => {
                    tracing::error!("❌ Item search failed on board {} (page {}): {}", board.board_id, pages + 1, e);
                    if matches!(e, SyncError::GraphQlError { .. }) || e.is_transient() {
                        tracing::warn!(
                            "⏳ Waiting {:?} before giving up on board {}",
                            self.error_backoff,
                            board.board_id
                        );
                        tokio::time::sleep(self.error_backoff).await;
                    }
                    break;
                }
            };
            pages += 1;

            let exhausted = page.items.is_empty();
            for item in page.items {
                let is_match = item
                    .column_values
                    .iter()
                    .any(|column| column.text.as_deref() == Some(email));
                let found = BoardItem {
                    board_id: board.board_id,
                    id: item.id,
                };
                if is_match && !matches.contains(&found) {
                    matches.push(found);
                }
            }

            match page.cursor {
                Some(next) if !exhausted => cursor = Some(next),
                _ => break,
            }
        }

        if matches.is_empty() {
            tracing::info!("🔍 No items found for {} on board {} ({} pages)", email, board.board_id, pages);
        } else {
            tracing::info!(
                "🔍 Found {} item(s) for {} on board {} ({} pages)",
                matches.len(),
                email,
                board.board_id,
                pages
            );
        }

        matches
    }

    pub async fn users(&self) -> Result<Vec<BoardUser>> {
        let data: Users = self.graphql(USERS_QUERY, json!({})).await?;
        Ok(data.users)
    }

    /// 以名稱（不分大小寫）尋找使用者
    pub async fn find_user_by_name(&self, name: &str) -> Result<Option<BoardUser>> {
        let wanted = name.trim().to_lowercase();
        let user = self
            .users()
            .await?
            .into_iter()
            .find(|user| user.name.trim().to_lowercase() == wanted);

        if user.is_none() {
            tracing::info!("👤 User with name {} not found", name);
        }
        Ok(user)
    }

    pub async fn change_multiple_column_values(
        &self,
        board_id: BoardId,
        item_id: &str,
        values: &Value,
    ) -> Result<String> {
        let data: ChangeColumns = self
            .graphql(
                CHANGE_COLUMNS_MUTATION,
                json!({
                    "boardId": board_id.to_string(),
                    "itemId": item_id,
                    "values": values.to_string(),
                }),
            )
            .await?;
        Ok(data.change_multiple_column_values.id)
    }

    pub async fn clear_column(&self, board_id: BoardId, item_id: &str, column_id: &str) -> Result<String> {
        let data: ChangeColumn = self
            .graphql(
                CLEAR_COLUMN_MUTATION,
                json!({
                    "boardId": board_id.to_string(),
                    "itemId": item_id,
                    "columnId": column_id,
                    "value": json!({ "clear_all": true }).to_string(),
                }),
            )
            .await?;
        Ok(data.change_column_value.id)
    }

    /// 取得 board 上所有 item 的 id（items_page + next_items_page）
    pub async fn board_item_ids(&self, board_id: BoardId) -> Result<Vec<String>> {
        let data: Boards = self
            .graphql(
                BOARD_ITEMS_QUERY,
                json!({ "boardIds": [board_id.to_string()], "limit": ITEMS_PAGE_LIMIT }),
            )
            .await?;

        let mut page = data
            .boards
            .into_iter()
            .next()
            .map(|board| board.items_page)
            .ok_or_else(|| SyncError::NotFound {
                what: format!("board {}", board_id),
            })?;

        let mut ids = Vec::new();
        loop {
            let exhausted = page.items.is_empty();
            ids.extend(page.items.into_iter().map(|item| item.id));

            let Some(cursor) = page.cursor.filter(|_| !exhausted) else {
                break;
            };
            let next: NextItems = self
                .graphql(NEXT_ITEMS_QUERY, json!({ "cursor": cursor, "limit": ITEMS_PAGE_LIMIT }))
                .await?;
            page = next.next_items_page;
        }

        tracing::debug!("Retrieved {} items from board {}", ids.len(), board_id);
        Ok(ids)
    }
}

#[async_trait]
impl BoardApi for MondayClient {
    async fn find_items_by_email(&self, boards: &[BoardLookup], email: &str) -> Result<Vec<BoardItem>> {
        let email = email.trim();
        if email.is_empty() {
            return Err(SyncError::MissingEmail);
        }

        let searches = boards.iter().map(|board| self.search_board(board, email));
        let items: Vec<BoardItem> = join_all(searches).await.into_iter().flatten().collect();

        Ok(items)
    }

    async fn upload_file_to_column(
        &self,
        item_id: &str,
        column_id: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<String> {
        // item / column id 以 JSON 字串嵌入，避免破壞查詢語法
        let mutation = format!(
            "mutation ($file: File!) {{ add_file_to_column(item_id: {}, column_id: {}, file: $file) {{ id }} }}",
            serde_json::to_string(item_id)?,
            serde_json::to_string(column_id)?,
        );

        tracing::debug!("📤 Uploading {} ({} bytes) to item {}", file_name, data.len(), item_id);

        let part = Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(mime_guess::from_path(file_name).first_or_octet_stream().essence_str())?;
        let form = Form::new().text("query", mutation).part("variables[file]", part);

        let response = self
            .authorized(self.client.post(&self.file_upload_url))
            .multipart(form)
            .send()
            .await?;

        let data: AddFile = Self::parse_graphql(response).await?;
        Ok(data.add_file_to_column.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer) -> MondayClient {
        MondayClient::new(&MondayConfig {
            api_url: server.url("/v2"),
            file_upload_url: server.url("/v2/file"),
            api_key: "test-key".to_string(),
            api_version: Some("2023-10".to_string()),
            timeout_seconds: Some(5),
            error_backoff_seconds: Some(0),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_asset_public_url() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v2")
                .header("authorization", "Bearer test-key")
                .header("api-version", "2023-10")
                .body_contains("assets(ids: $ids)")
                .body_contains(r#""ids":["123"]"#);
            then.status(200).json_body(serde_json::json!({
                "data": {"assets": [{"id": "123", "name": "scan.pdf", "public_url": "https://files.example/scan.pdf"}]}
            }));
        });

        let url = client_for(&server).asset_public_url("123").await.unwrap();

        mock.assert();
        assert_eq!(url, "https://files.example/scan.pdf");
    }

    #[tokio::test]
    async fn test_asset_without_public_url_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v2");
            then.status(200).json_body(serde_json::json!({"data": {"assets": []}}));
        });

        let err = client_for(&server).asset_public_url("9").await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_graphql_errors_are_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v2");
            then.status(200).json_body(serde_json::json!({
                "data": null,
                "errors": [{"message": "invalid value", "extensions": {"code": "ColumnValueException"}}]
            }));
        });

        let err = client_for(&server)
            .change_multiple_column_values(1, "2", &serde_json::json!({"texto__1": "x"}))
            .await
            .unwrap_err();

        assert!(err.has_graphql_error("ColumnValueException"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v2");
            then.status(401).body("Not Authenticated");
        });

        let err = client_for(&server).users().await.unwrap_err();
        assert!(matches!(err, SyncError::ApiError { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_find_user_by_name_ignores_case() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v2").body_contains("users");
            then.status(200).json_body(serde_json::json!({
                "data": {"users": [{"id": 11, "name": "Ana Lopez"}, {"id": "12", "name": "Brian Kent"}]}
            }));
        });

        let client = client_for(&server);
        let user = client.find_user_by_name("ana lopez").await.unwrap().unwrap();
        assert_eq!(user.id, "11");
        assert!(client.find_user_by_name("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upload_file_to_column_sends_multipart() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v2/file")
                .header("authorization", "Bearer test-key")
                .body_contains(r#"add_file_to_column(item_id: "555", column_id: "archivo3__1", file: $file)"#)
                .body_contains(r#"name="variables[file]"; filename="scan.pdf""#)
                .body_contains("PDF-BYTES");
            then.status(200)
                .json_body(serde_json::json!({"data": {"add_file_to_column": {"id": "9001"}}}));
        });

        let asset_id = client_for(&server)
            .upload_file_to_column("555", "archivo3__1", "scan.pdf", b"PDF-BYTES".to_vec())
            .await
            .unwrap();

        mock.assert();
        assert_eq!(asset_id, "9001");
    }

    #[tokio::test]
    async fn test_board_item_ids_follows_cursor() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(POST).path("/v2").body_contains("items_page(limit: $limit)");
            then.status(200).json_body(serde_json::json!({
                "data": {"boards": [{"items_page": {"cursor": "c1", "items": [{"id": "1"}, {"id": "2"}]}}]}
            }));
        });
        let second = server.mock(|when, then| {
            when.method(POST).path("/v2").body_contains("next_items_page");
            then.status(200).json_body(serde_json::json!({
                "data": {"next_items_page": {"cursor": null, "items": [{"id": "3"}]}}
            }));
        });

        let ids = client_for(&server).board_item_ids(42).await.unwrap();

        first.assert();
        second.assert();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_upload_content_type_follows_extension() {
        let server = MockServer::start();
        let sheet = server.mock(|when, then| {
            when.method(POST)
                .path("/v2/file")
                .body_contains(r#"filename="labs.xlsx""#)
                .body_contains("Content-Type: application/vnd.openxmlformats-officedocument.spreadsheetml.sheet");
            then.status(200)
                .json_body(serde_json::json!({"data": {"add_file_to_column": {"id": "1"}}}));
        });
        let csv = server.mock(|when, then| {
            when.method(POST)
                .path("/v2/file")
                .body_contains(r#"filename="report.csv""#)
                .body_contains("Content-Type: text/csv");
            then.status(200)
                .json_body(serde_json::json!({"data": {"add_file_to_column": {"id": "2"}}}));
        });

        let client = client_for(&server);
        client
            .upload_file_to_column("555", "archivo3__1", "labs.xlsx", b"xlsx".to_vec())
            .await
            .unwrap();
        client
            .upload_file_to_column("555", "archivo3__1", "report.csv", b"a,b".to_vec())
            .await
            .unwrap();

        sheet.assert();
        csv.assert();
    }

    #[test]
    fn test_items_page_without_items_is_empty() {
        let page: ItemsPage<ItemId> = serde_json::from_value(serde_json::json!({"cursor": null})).unwrap();
        assert!(page.items.is_empty());
        assert!(page.cursor.is_none());

        let page: ItemsPage<MatchedItem> =
            serde_json::from_value(serde_json::json!({"cursor": "c", "items": [{"id": "7"}]})).unwrap();
        assert_eq!(page.items[0].id, "7");
        assert!(page.items[0].column_values.is_empty());
    }
}
