//! Minimal W3C WebDriver client for an Appium server.

use crate::error::{A11yError, Result, WebDriverError};
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};

/// Key the W3C protocol uses for element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

pub const NATIVE_APP: &str = "NATIVE_APP";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppiumElement {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct AppiumClient {
    http: Client,
    server_url: String,
    session_id: String,
    capabilities: Value,
}

impl AppiumClient {
    /// Start a new session with the given capabilities.
    pub async fn create_session(server_url: &str, capabilities: Value) -> Result<Self> {
        let http = Client::new();
        let server_url = server_url.trim_end_matches('/').to_string();
        let response = http
            .post(format!("{}/session", server_url))
            .json(&json!({ "capabilities": { "alwaysMatch": capabilities } }))
            .send()
            .await?;
        let value = decode(response).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| A11yError::Other("New session response has no sessionId".into()))?
            .to_string();
        let capabilities = value.get("capabilities").cloned().unwrap_or(capabilities);
        log::info!("Started Appium session {}", session_id);

        Ok(Self {
            http,
            server_url,
            session_id,
            capabilities,
        })
    }

    /// Use a session that already exists.
    pub fn attach(server_url: &str, session_id: &str, capabilities: Value) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
            capabilities,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn platform_name(&self) -> Option<&str> {
        self.capabilities
            .get("platformName")
            .or_else(|| self.capabilities.get("appium:platformName"))
            .and_then(Value::as_str)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.server_url, self.session_id, path)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let response = self.http.get(self.endpoint(path)).send().await?;
        decode(response).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let response = self.http.post(self.endpoint(path)).json(&body).send().await?;
        decode(response).await
    }

    pub async fn page_source(&self) -> Result<String> {
        string_value(self.get("/source").await?)
    }

    pub async fn find_element(&self, using: &str, value: &str) -> Result<AppiumElement> {
        log::debug!("Finding element using {}: {}", using, value);
        let found = self
            .post("/element", json!({ "using": using, "value": value }))
            .await?;
        let id = found
            .get(ELEMENT_KEY)
            .or_else(|| found.get("ELEMENT"))
            .and_then(Value::as_str)
            .ok_or_else(|| A11yError::Other(format!("Malformed element reference: {}", found)))?;
        Ok(AppiumElement { id: id.to_string() })
    }

    pub async fn click(&self, element: &AppiumElement) -> Result<()> {
        self.post(&format!("/element/{}/click", element.id), json!({}))
            .await?;
        Ok(())
    }

    pub async fn send_keys(&self, element: &AppiumElement, text: &str) -> Result<()> {
        self.post(
            &format!("/element/{}/value", element.id),
            json!({ "text": text }),
        )
        .await?;
        Ok(())
    }

    /// Press on `from`, move onto `to` and release, as one touch pointer.
    pub async fn drag_and_drop(&self, from: &AppiumElement, to: &AppiumElement) -> Result<()> {
        log::debug!("Dragging element {} onto {}", from.id, to.id);
        self.post("/actions", drag_actions(from, to)).await?;
        self.http.delete(self.endpoint("/actions")).send().await?;
        Ok(())
    }

    pub async fn current_context(&self) -> Result<String> {
        string_value(self.get("/context").await?)
    }

    pub async fn contexts(&self) -> Result<Vec<String>> {
        Ok(serde_json::from_value(self.get("/contexts").await?)?)
    }

    pub async fn switch_context(&self, name: &str) -> Result<()> {
        log::debug!("Switching to context {}", name);
        self.post("/context", json!({ "name": name })).await?;
        Ok(())
    }

    /// PNG bytes
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let encoded = string_value(self.get("/screenshot").await?)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| A11yError::Other(format!("Invalid screenshot data: {}", e)))
    }

    pub async fn title(&self) -> Result<String> {
        string_value(self.get("/title").await?)
    }

    pub async fn url(&self) -> Result<String> {
        string_value(self.get("/url").await?)
    }

    pub async fn delete_session(&self) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/session/{}", self.server_url, self.session_id))
            .send()
            .await?;
        decode(response).await?;
        Ok(())
    }
}

fn drag_actions(from: &AppiumElement, to: &AppiumElement) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "finger1",
            "parameters": { "pointerType": "touch" },
            "actions": [
                { "type": "pointerMove", "duration": 0, "origin": { ELEMENT_KEY: from.id }, "x": 0, "y": 0 },
                { "type": "pointerDown", "button": 0 },
                { "type": "pause", "duration": 500 },
                { "type": "pointerMove", "duration": 500, "origin": { ELEMENT_KEY: to.id }, "x": 0, "y": 0 },
                { "type": "pointerUp", "button": 0 }
            ]
        }]
    })
}

/// Unwrap `{"value": …}`, turning W3C error payloads into `WebDriverError`.
async fn decode(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response.json().await?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(WebDriverError {
            error: error.to_string(),
            message: message.to_string(),
        }
        .into());
    }
    if !status.is_success() {
        return Err(WebDriverError {
            error: "unknown error".to_string(),
            message: format!("HTTP {}: {}", status, body),
        }
        .into());
    }

    Ok(value)
}

fn string_value(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(A11yError::Other(format!("Expected a string, got {}", other))),
    }
}
