use std::time::Duration;

use reqwest::Method;
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
pub enum OpsClientError {
    #[error("api base must be an http(s) URL, got '{value}'")]
    InvalidApiBase { value: String },
    #[error("{field} must be non-empty and free of URL delimiters")]
    InvalidValue { field: &'static str },
    #[error("failed to build HTTP client: {message}")]
    Client { message: String },
    #[error("request execution failed: {message}")]
    Transport { message: String },
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub struct OpsClient {
    api_base: String,
    token: String,
    http: reqwest::Client,
}

impl OpsClient {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self, OpsClientError> {
        let api_base = api_base.trim().trim_end_matches('/').to_string();
        if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
            return Err(OpsClientError::InvalidApiBase { value: api_base });
        }
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(OpsClientError::InvalidValue { field: "token" });
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| OpsClientError::Client {
                message: error.to_string(),
            })?;

        Ok(Self {
            api_base,
            token,
            http,
        })
    }

    pub async fn upsert_tenant(
        &self,
        tenant_id: &str,
        slug: &str,
        display_name: Option<&str>,
    ) -> Result<Value, OpsClientError> {
        let tenant_id = required(tenant_id, "tenant_id")?;
        self.send(
            Method::PUT,
            &format!("/api/internal/tenants/{tenant_id}"),
            Some(json!({ "slug": slug, "display_name": display_name })),
        )
        .await
    }

    pub async fn domain_status(&self, tenant_id: &str) -> Result<Value, OpsClientError> {
        self.send(Method::GET, &domain_path(tenant_id, "")?, None).await
    }

    pub async fn set_domain(&self, tenant_id: &str, hostname: &str) -> Result<Value, OpsClientError> {
        let hostname = required(hostname, "hostname")?;
        self.send(
            Method::PUT,
            &domain_path(tenant_id, "")?,
            Some(json!({ "custom_domain": hostname })),
        )
        .await
    }

    pub async fn verify_domain(&self, tenant_id: &str) -> Result<Value, OpsClientError> {
        self.send(Method::POST, &domain_path(tenant_id, "/verify")?, None)
            .await
    }

    pub async fn remove_domain(&self, tenant_id: &str) -> Result<Value, OpsClientError> {
        self.send(Method::DELETE, &domain_path(tenant_id, "")?, None).await
    }

    pub async fn setup_automation(&self, tenant_id: &str) -> Result<Value, OpsClientError> {
        self.send(Method::POST, &domain_path(tenant_id, "/automation")?, None)
            .await
    }

    pub async fn automation_status(&self, tenant_id: &str) -> Result<Value, OpsClientError> {
        self.send(Method::GET, &domain_path(tenant_id, "/automation")?, None)
            .await
    }

    pub async fn flush_domain_cache(&self) -> Result<Value, OpsClientError> {
        self.send(Method::POST, "/api/internal/domain-cache/flush", None)
            .await
    }

    pub async fn invalidate_domain_cache(&self, hostname: &str) -> Result<Value, OpsClientError> {
        let hostname = required(hostname, "hostname")?;
        self.send(
            Method::DELETE,
            &format!("/api/internal/domain-cache/{hostname}"),
            None,
        )
        .await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, OpsClientError> {
        let mut request = self
            .http
            .request(method, format!("{}{path}", self.api_base))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|error| OpsClientError::Transport {
                message: error.to_string(),
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| OpsClientError::Transport {
                message: error.to_string(),
            })?;

        if !status.is_success() {
            return Err(OpsClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::String(body));
        Ok(match parsed {
            Value::Object(mut object) if object.contains_key("data") => {
                object.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        })
    }
}

fn domain_path(tenant_id: &str, suffix: &str) -> Result<String, OpsClientError> {
    let tenant_id = required(tenant_id, "tenant_id")?;
    Ok(format!("/api/tenants/{tenant_id}/domain{suffix}"))
}

fn required(raw: &str, field: &'static str) -> Result<String, OpsClientError> {
    let value = raw.trim();
    if value.is_empty() || value.contains(['/', '?', '#']) {
        return Err(OpsClientError::InvalidValue { field });
    }
    Ok(value.to_string())
}
