// ABOUTME: HTTP transport for the mirai bot API built on reqwest.
// ABOUTME: Maps each GatewayClient call onto its JSON endpoint and checks status codes.

use crate::traits::GatewayClient;
use crate::types::{AuthResponse, Friend, Group, MessageOrEvent};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

/// Default per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway client talking to a mirai HTTP API instance
#[derive(Clone)]
pub struct HttpGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGateway {
    /// Create a client for `base_url` (e.g. `http://localhost:8080`)
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(base_url, client))
    }

    /// Create a client reusing an existing reqwest client
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        let url = self.endpoint(path);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        if !response.status().is_success() {
            bail!("POST {} returned {}", url, response.status());
        }

        response
            .json()
            .await
            .with_context(|| format!("Invalid JSON from POST {}", url))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.endpoint(path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        if !response.status().is_success() {
            bail!("GET {} returned {}", url, response.status());
        }

        response
            .json()
            .await
            .with_context(|| format!("Invalid JSON from GET {}", url))
    }
}

/// Fail when a status envelope carries a non-zero `code`
fn ensure_ok(operation: &str, body: &Value) -> Result<()> {
    match body.get("code").and_then(Value::as_i64) {
        None | Some(0) => Ok(()),
        Some(code) => {
            let msg = body.get("msg").and_then(Value::as_str).unwrap_or("");
            bail!("{} rejected by gateway (code {}): {}", operation, code, msg)
        }
    }
}

/// Items come back either as a bare array or wrapped as `{code, data}`
fn unwrap_items(operation: &str, body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(_) => {
            ensure_ok(operation, &body)?;
            match body.get("data") {
                Some(Value::Array(items)) => Ok(items.clone()),
                _ => bail!("{} response has no 'data' array", operation),
            }
        }
        other => bail!("{} returned unexpected JSON: {}", operation, other),
    }
}

fn message_id(operation: &str, body: &Value) -> Result<i64> {
    ensure_ok(operation, body)?;
    body.get("messageId")
        .and_then(Value::as_i64)
        .with_context(|| format!("{} response has no messageId", operation))
}

#[async_trait]
impl GatewayClient for HttpGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn authenticate(&self, auth_key: &str) -> Result<AuthResponse> {
        self.post("auth", json!({ "authKey": auth_key })).await
    }

    async fn verify(&self, session_key: &str, account_id: i64) -> Result<()> {
        let body: Value = self
            .post("verify", json!({ "sessionKey": session_key, "qq": account_id }))
            .await?;
        ensure_ok("verify", &body)
    }

    async fn list_groups(&self, session_key: &str) -> Result<Vec<Group>> {
        let body: Value = self
            .get("groupList", &[("sessionKey", session_key.to_string())])
            .await?;
        unwrap_items("groupList", body)?
            .into_iter()
            .map(|item| serde_json::from_value(item).context("Malformed group entry"))
            .collect()
    }

    async fn list_friends(&self, session_key: &str) -> Result<Vec<Friend>> {
        let body: Value = self
            .get("friendList", &[("sessionKey", session_key.to_string())])
            .await?;
        unwrap_items("friendList", body)?
            .into_iter()
            .map(|item| serde_json::from_value(item).context("Malformed friend entry"))
            .collect()
    }

    async fn fetch_messages(&self, session_key: &str, count: usize) -> Result<Vec<MessageOrEvent>> {
        let body: Value = self
            .get(
                "fetchMessage",
                &[
                    ("sessionKey", session_key.to_string()),
                    ("count", count.to_string()),
                ],
            )
            .await?;
        unwrap_items("fetchMessage", body)?
            .into_iter()
            .map(MessageOrEvent::from_json)
            .collect()
    }

    async fn send_friend_message(
        &self,
        session_key: &str,
        target: i64,
        chain: Value,
    ) -> Result<i64> {
        let body: Value = self
            .post(
                "sendFriendMessage",
                json!({ "sessionKey": session_key, "target": target, "messageChain": chain }),
            )
            .await?;
        message_id("sendFriendMessage", &body)
    }

    async fn send_group_message(
        &self,
        session_key: &str,
        target: i64,
        chain: Value,
    ) -> Result<i64> {
        let body: Value = self
            .post(
                "sendGroupMessage",
                json!({ "sessionKey": session_key, "target": target, "messageChain": chain }),
            )
            .await?;
        message_id("sendGroupMessage", &body)
    }

    async fn release(&self, session_key: &str, account_id: i64) -> Result<()> {
        let body: Value = self
            .post("release", json!({ "sessionKey": session_key, "qq": account_id }))
            .await?;
        ensure_ok("release", &body)?;
        tracing::debug!(account_id, "Gateway session released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let gateway = HttpGateway::with_client("http://localhost:8080/", reqwest::Client::new());
        assert_eq!(gateway.base_url(), "http://localhost:8080");
        assert_eq!(gateway.endpoint("auth"), "http://localhost:8080/auth");
    }

    #[test]
    fn test_unwrap_items_accepts_bare_array() {
        let items = unwrap_items("fetchMessage", json!([{"type": "GroupMessage"}])).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_unwrap_items_accepts_envelope() {
        let items = unwrap_items(
            "fetchMessage",
            json!({"code": 0, "data": [{"type": "A"}, {"type": "B"}]}),
        )
        .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_unwrap_items_rejects_error_envelope() {
        let err = unwrap_items("fetchMessage", json!({"code": 3, "msg": "session expired"}))
            .unwrap_err();
        assert!(err.to_string().contains("code 3"));
    }

    #[test]
    fn test_message_id_extraction() {
        let id = message_id("sendGroupMessage", &json!({"code": 0, "messageId": 99})).unwrap();
        assert_eq!(id, 99);
        assert!(message_id("sendGroupMessage", &json!({"code": 0})).is_err());
    }

    #[test]
    fn test_ensure_ok_without_code_passes() {
        assert!(ensure_ok("verify", &json!({"msg": "success"})).is_ok());
    }
}
