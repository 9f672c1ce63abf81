// Outbound webhooks for the call_webhook action

use async_trait::async_trait;
use reqwest::Method;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::workflows::{ProviderError, WebhookCaller, WebhookResponse};

#[derive(Debug, Clone)]
pub struct HttpWebhookCaller {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpWebhookCaller {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("crm-automation/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl WebhookCaller for HttpWebhookCaller {
    async fn call(
        &self,
        url: &str,
        method: &str,
        headers: &HashMap<String, String>,
        body: &serde_json::Value,
    ) -> Result<WebhookResponse, ProviderError> {
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| ProviderError::Rejected(format!("unsupported method {}", method)))?;

        let mut request = self.client.request(method.clone(), url);
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if !body.is_null() && method != Method::GET {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!("Webhook {} {} failed: {}", method, url, e);
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout.as_secs())
            } else {
                ProviderError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        debug!("Webhook {} {} returned {}", method, url, status);
        Ok(WebhookResponse { status, body })
    }
}
