use crate::app::webhook::{challenge_of, challenge_response, invalid_payload};
use crate::config::RouterConfig;
use crate::domain::model::BoardId;
use crate::utils::error::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;

/// 依 boardId 把 webhook 轉送到對應的下游服務
#[derive(Debug, Clone)]
pub struct WebhookForwarder {
    client: Client,
    routes: Arc<HashMap<BoardId, String>>,
}

impl WebhookForwarder {
    pub fn new(config: &RouterConfig) -> Result<Self> {
        let routes = config
            .routes
            .iter()
            .map(|route| (route.board_id, route.target.clone()))
            .collect();

        Ok(Self {
            client: Client::builder().build()?,
            routes: Arc::new(routes),
        })
    }

    pub fn target(&self, board_id: BoardId) -> Option<&str> {
        self.routes.get(&board_id).map(String::as_str)
    }

    /// 原封不動轉送 body，回傳下游的狀態碼與內容
    pub async fn forward(&self, target: &str, body: Bytes) -> Result<(StatusCode, Bytes)> {
        let response = self
            .client
            .post(target)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        Ok((status, response.bytes().await?))
    }
}

fn board_id_of(body: &Value) -> Option<BoardId> {
    match body.get("event")?.get("boardId")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn router(forwarder: WebhookForwarder, path: &str) -> Router {
    Router::new()
        .route(path, post(route_webhook))
        .route("/health", get(|| async { "ok" }))
        .with_state(forwarder)
}

async fn route_webhook(State(forwarder): State<WebhookForwarder>, body: Bytes) -> Response {
    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return invalid_payload();
    };

    if let Some(challenge) = challenge_of(&payload) {
        return challenge_response(challenge);
    }

    if !payload.get("event").is_some_and(Value::is_object) {
        return invalid_payload();
    }

    let board_id = board_id_of(&payload);
    let Some(target) = board_id.and_then(|id| forwarder.target(id)) else {
        tracing::warn!("⚠️ No route for boardId {:?}", board_id);
        return (StatusCode::BAD_REQUEST, "Unknown boardId").into_response();
    };

    tracing::info!("📡 Forwarding webhook for board {:?} to {}", board_id, target);
    match forwarder.forward(target, body).await {
        Ok((status, response_body)) => (status, response_body).into_response(),
        Err(e) => {
            tracing::error!("❌ Error forwarding webhook: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error forwarding webhook").into_response()
        }
    }
}

pub async fn serve(config: &RouterConfig) -> Result<()> {
    let forwarder = WebhookForwarder::new(config)?;
    let app = router(forwarder, &config.path);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🚀 Webhook router listening on {}{} ({} routes)", addr, config.path, config.routes.len());

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use serde_json::json;

    #[test]
    fn test_board_id_accepts_number_or_string() {
        assert_eq!(board_id_of(&json!({"event": {"boardId": 1525879275}})), Some(1525879275));
        assert_eq!(board_id_of(&json!({"event": {"boardId": "42"}})), Some(42));
        assert_eq!(board_id_of(&json!({"event": {}})), None);
    }

    #[test]
    fn test_route_table() {
        let forwarder = WebhookForwarder::new(&RouterConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            path: "/webhook".to_string(),
            routes: vec![RouteConfig {
                board_id: 7,
                target: "http://localhost:3001/webhook".to_string(),
            }],
        })
        .unwrap();

        assert_eq!(forwarder.target(7), Some("http://localhost:3001/webhook"));
        assert_eq!(forwarder.target(8), None);
    }
}
