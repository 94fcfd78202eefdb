//! reqwest-backed collaborators.
//!
//! All clients share the same conventions: JSON bodies, optional bearer
//! token, 5xx/408/429 are transient, other non-success statuses are final.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::{EmailSender, OrderRequest, OrderingService, PushMessage, PushSender, ResourceProvider};
use crate::domain::{MonitoredResource, ResourceClass};
use crate::utils::http_client::join_url;
use crate::{Error, Result};

/// Base URL plus credentials for one remote API.
#[derive(Debug, Clone)]
struct Endpoint {
    base_url: String,
    token: Option<String>,
}

impl Endpoint {
    fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid URL '{}': {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "unsupported URL scheme '{}' in '{}'",
                parsed.scheme(),
                base_url
            )));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Map a non-success status to an error.
///
/// `reject_client_errors` turns a final 4xx into `ActionRejected`, used where
/// the remote side refuses on business grounds.
fn failure_for(
    operation: &'static str,
    status: StatusCode,
    body: &str,
    reject_client_errors: bool,
) -> Error {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{} - {}", status, body)
    };

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        Error::transient(operation, detail)
    } else if reject_client_errors && status.is_client_error() {
        Error::rejected(detail)
    } else {
        Error::Other(format!("{} failed: {}", operation, detail))
    }
}

async fn ensure_success(
    operation: &'static str,
    response: Response,
    reject_client_errors: bool,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(operation, %status, "Remote call failed");
    Err(failure_for(operation, status, &body, reject_client_errors))
}

/// Resource snapshots from the application's REST API.
pub struct HttpResourceProvider {
    endpoint: Endpoint,
    client: Client,
}

impl HttpResourceProvider {
    pub fn new(client: Client, base_url: &str, token: Option<String>) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, token)?,
            client,
        })
    }
}

#[async_trait]
impl ResourceProvider for HttpResourceProvider {
    async fn fetch_resources(
        &self,
        owner_id: &str,
        class: ResourceClass,
    ) -> Result<Vec<MonitoredResource>> {
        let url = self.endpoint.url(&format!("owners/{}/resources", owner_id));
        let request = self
            .client
            .get(url)
            .query(&[("class", class.as_str())]);
        let response = self.endpoint.authorize(request).send().await?;
        let response = ensure_success("fetch_resources", response, false).await?;
        Ok(response.json().await?)
    }

    async fn fetch_resource(&self, resource_id: &str) -> Result<Option<MonitoredResource>> {
        let url = self.endpoint.url(&format!("resources/{}", resource_id));
        let response = self.endpoint.authorize(self.client.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success("fetch_resource", response, false).await?;
        Ok(Some(response.json().await?))
    }
}

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: String,
}

/// Order placement through the commerce API.
pub struct HttpOrderingService {
    endpoint: Endpoint,
    client: Client,
}

impl HttpOrderingService {
    pub fn new(client: Client, base_url: &str, token: Option<String>) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, token)?,
            client,
        })
    }
}

#[async_trait]
impl OrderingService for HttpOrderingService {
    async fn create_order(&self, request: &OrderRequest) -> Result<String> {
        let http_request = self
            .client
            .post(self.endpoint.url("orders"))
            .header("Idempotency-Key", &request.idempotency_key)
            .json(request);
        let response = self.endpoint.authorize(http_request).send().await?;
        let response = ensure_success("create_order", response, true).await?;
        let created: CreatedOrder = response.json().await?;
        debug!(resource_id = %request.resource_id, order_id = %created.id, "Order created");
        Ok(created.id)
    }
}

#[derive(Debug, Deserialize)]
struct PushPermission {
    granted: bool,
}

/// Push delivery through a push gateway.
pub struct HttpPushSender {
    endpoint: Endpoint,
    client: Client,
}

impl HttpPushSender {
    pub fn new(client: Client, base_url: &str, token: Option<String>) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, token)?,
            client,
        })
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    async fn has_permission(&self, owner_id: &str) -> Result<bool> {
        let url = self.endpoint.url(&format!("permissions/{}", owner_id));
        let response = self.endpoint.authorize(self.client.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let response = ensure_success("push_permission", response, false).await?;
        let permission: PushPermission = response.json().await?;
        Ok(permission.granted)
    }

    async fn send_push(&self, message: &PushMessage) -> Result<()> {
        let request = self.client.post(self.endpoint.url("push")).json(message);
        let response = self.endpoint.authorize(request).send().await?;
        ensure_success("send_push", response, false).await?;
        Ok(())
    }
}

/// Email delivery through a transactional email API.
pub struct HttpEmailSender {
    endpoint: Endpoint,
    client: Client,
    from: String,
}

impl HttpEmailSender {
    pub fn new(
        client: Client,
        api_url: &str,
        token: Option<String>,
        from: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(api_url, token)?,
            client,
            from: from.into(),
        })
    }

    fn build_payload(&self, to: &str, subject: &str, html: &str) -> serde_json::Value {
        json!({
            "from": self.from,
            "to": [to],
            "subject": subject,
            "html": html,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let payload = self.build_payload(to, subject, html);
        let request = self.client.post(&self.endpoint.base_url).json(&payload);
        let response = self.endpoint.authorize(request).send().await?;
        ensure_success("send_email", response, false).await?;
        debug!(to, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http_client::build_client;
    use std::time::Duration;

    #[test]
    fn test_endpoint_rejects_bad_urls() {
        assert!(Endpoint::new("not a url", None).is_err());
        assert!(Endpoint::new("ftp://files.example.com", None).is_err());
        let endpoint = Endpoint::new("https://api.example.com/v1/", Some(String::new())).unwrap();
        assert_eq!(endpoint.url("orders"), "https://api.example.com/v1/orders");
        assert!(endpoint.token.is_none());
    }

    #[test]
    fn test_failure_classification() {
        let err = failure_for("create_order", StatusCode::SERVICE_UNAVAILABLE, "", true);
        assert!(err.is_transient());

        let err = failure_for("create_order", StatusCode::TOO_MANY_REQUESTS, "", true);
        assert!(err.is_transient());

        let err = failure_for(
            "create_order",
            StatusCode::UNPROCESSABLE_ENTITY,
            "supplier inactive",
            true,
        );
        match err {
            Error::ActionRejected(reason) => assert!(reason.contains("supplier inactive")),
            other => panic!("expected rejection, got {other:?}"),
        }

        let err = failure_for("send_email", StatusCode::BAD_REQUEST, "", false);
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn test_email_payload() {
        let client = build_client(Duration::from_secs(5)).unwrap();
        let sender = HttpEmailSender::new(
            client,
            "https://mail.example.com/send",
            None,
            "alerts@example.com",
        )
        .unwrap();
        let payload = sender.build_payload("owner@example.com", "Low stock", "<p>hi</p>");
        assert_eq!(payload["from"], "alerts@example.com");
        assert_eq!(payload["to"][0], "owner@example.com");
        assert_eq!(payload["subject"], "Low stock");
    }
}
