use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::Config;
use crate::domain_store::AutomationState;

const CLOUDFLARE_ZONE_ALREADY_EXISTS: u64 = 1061;
const CLOUDFLARE_RECORD_ALREADY_EXISTS: [u64; 2] = [81053, 81057];

const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "com.br", "net.br", "org.br", "imb.br", "adv.br", "eng.br", "co.uk", "org.uk", "me.uk",
    "com.au", "net.au", "co.nz", "com.mx", "com.ar", "com.pt", "co.jp", "co.za",
];

#[derive(Debug, thiserror::Error)]
pub enum DnsAutomationError {
    #[error("DNS automation is not configured")]
    NotConfigured,
    #[error("no DNS zone found for {zone}")]
    ZoneNotFound { zone: String },
    #[error("{message}")]
    Provider { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutomationSetup {
    pub automated: bool,
    pub zone: String,
    pub name_servers: Vec<String>,
    pub state: AutomationState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutomationStatus {
    pub state: AutomationState,
    pub ssl_state: Option<String>,
}

#[async_trait]
pub trait DnsAutomation: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn setup_domain(&self, hostname: &str) -> Result<AutomationSetup, DnsAutomationError>;

    async fn check_status(&self, hostname: &str) -> Result<AutomationStatus, DnsAutomationError>;

    async fn teardown(&self, hostname: &str, remove_zone: bool) -> Result<(), DnsAutomationError>;

    fn name(&self) -> &'static str;
}

pub fn dns_automation_from_config(config: &Config) -> Arc<dyn DnsAutomation> {
    if let (Some(api_token), Some(account_id)) = (
        config.cloudflare_api_token.clone(),
        config.cloudflare_account_id.clone(),
    ) {
        Arc::new(CloudflareDnsAutomation::new(
            api_token,
            account_id,
            config.cloudflare_api_base_url.clone(),
            config.platform_dns_target.clone(),
            Duration::from_millis(config.dns_automation_timeout_ms.max(250)),
        ))
    } else {
        Arc::new(UnconfiguredDnsAutomation)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredDnsAutomation;

#[async_trait]
impl DnsAutomation for UnconfiguredDnsAutomation {
    fn is_configured(&self) -> bool {
        false
    }

    async fn setup_domain(&self, _hostname: &str) -> Result<AutomationSetup, DnsAutomationError> {
        Err(DnsAutomationError::NotConfigured)
    }

    async fn check_status(&self, _hostname: &str) -> Result<AutomationStatus, DnsAutomationError> {
        Err(DnsAutomationError::NotConfigured)
    }

    async fn teardown(
        &self,
        _hostname: &str,
        _remove_zone: bool,
    ) -> Result<(), DnsAutomationError> {
        Err(DnsAutomationError::NotConfigured)
    }

    fn name(&self) -> &'static str {
        "unconfigured"
    }
}

#[derive(Debug, Clone)]
pub struct CloudflareDnsAutomation {
    api_token: String,
    account_id: String,
    base_url: String,
    cname_target: String,
    timeout: Duration,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CloudflareEnvelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<CloudflareApiError>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CloudflareApiError {
    #[serde(default)]
    code: u64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CloudflareZone {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    name_servers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CloudflareDnsRecord {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CloudflareSslVerification {
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    certificate_status: Option<String>,
}

impl<T> CloudflareEnvelope<T> {
    fn has_error_code(&self, codes: &[u64]) -> bool {
        self.errors.iter().any(|error| codes.contains(&error.code))
    }

    fn error_message(&self) -> String {
        let messages: Vec<String> = self
            .errors
            .iter()
            .map(|error| format!("{} ({})", error.message, error.code))
            .collect();
        if messages.is_empty() {
            "Cloudflare request failed".to_string()
        } else {
            format!("Cloudflare request failed: {}", messages.join("; "))
        }
    }
}

impl CloudflareDnsAutomation {
    pub fn new(
        api_token: String,
        account_id: String,
        base_url: String,
        cname_target: String,
        timeout: Duration,
    ) -> Self {
        Self {
            api_token,
            account_id,
            base_url,
            cname_target,
            timeout,
            http: reqwest::Client::new(),
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<CloudflareEnvelope<T>, DnsAutomationError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.api_token)
            .timeout(self.timeout)
            .query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|error| DnsAutomationError::Provider {
                message: format!("Unable to contact Cloudflare: {error}"),
            })?;
        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|error| DnsAutomationError::Provider {
                message: format!("Unable to read Cloudflare response: {error}"),
            })?;

        serde_json::from_slice::<CloudflareEnvelope<T>>(&payload).map_err(|error| {
            DnsAutomationError::Provider {
                message: format!("Invalid Cloudflare response payload ({status}): {error}"),
            }
        })
    }

    async fn find_zone(&self, zone_name: &str) -> Result<Option<CloudflareZone>, DnsAutomationError> {
        let envelope: CloudflareEnvelope<Vec<CloudflareZone>> = self
            .request(Method::GET, "zones", &[("name", zone_name)], None)
            .await?;
        if !envelope.success {
            return Err(DnsAutomationError::Provider {
                message: envelope.error_message(),
            });
        }
        Ok(envelope.result.unwrap_or_default().into_iter().next())
    }

    async fn create_or_reuse_zone(
        &self,
        zone_name: &str,
    ) -> Result<CloudflareZone, DnsAutomationError> {
        let envelope: CloudflareEnvelope<CloudflareZone> = self
            .request(
                Method::POST,
                "zones",
                &[],
                Some(json!({
                    "name": zone_name,
                    "account": { "id": self.account_id },
                    "type": "full",
                })),
            )
            .await?;

        if envelope.success {
            if let Some(zone) = envelope.result {
                return Ok(zone);
            }
        }
        if envelope.has_error_code(&[CLOUDFLARE_ZONE_ALREADY_EXISTS]) {
            return self
                .find_zone(zone_name)
                .await?
                .ok_or_else(|| DnsAutomationError::ZoneNotFound {
                    zone: zone_name.to_string(),
                });
        }
        Err(DnsAutomationError::Provider {
            message: envelope.error_message(),
        })
    }

    async fn upsert_cname(&self, zone_id: &str, hostname: &str) -> Result<(), DnsAutomationError> {
        let envelope: CloudflareEnvelope<Value> = self
            .request(
                Method::POST,
                &format!("zones/{zone_id}/dns_records"),
                &[],
                Some(json!({
                    "type": "CNAME",
                    "name": hostname,
                    "content": self.cname_target,
                    "proxied": true,
                    "ttl": 1,
                })),
            )
            .await?;

        if envelope.success || envelope.has_error_code(&CLOUDFLARE_RECORD_ALREADY_EXISTS) {
            return Ok(());
        }
        Err(DnsAutomationError::Provider {
            message: envelope.error_message(),
        })
    }

    async fn ssl_state(&self, zone_id: &str, hostname: &str) -> Option<String> {
        let envelope = self
            .request::<Vec<CloudflareSslVerification>>(
                Method::GET,
                &format!("zones/{zone_id}/ssl/verification"),
                &[],
                None,
            )
            .await;
        let entries = match envelope {
            Ok(envelope) if envelope.success => envelope.result.unwrap_or_default(),
            Ok(envelope) => {
                tracing::debug!(
                    target: "vitrine.dns_automation",
                    hostname,
                    error = %envelope.error_message(),
                    "ssl verification status unavailable",
                );
                return None;
            }
            Err(error) => {
                tracing::debug!(
                    target: "vitrine.dns_automation",
                    hostname,
                    error = %error,
                    "ssl verification status unavailable",
                );
                return None;
            }
        };

        entries
            .into_iter()
            .find(|entry| entry.hostname.as_deref() == Some(hostname))
            .and_then(|entry| entry.certificate_status)
    }

    async fn delete_hostname_records(
        &self,
        zone_id: &str,
        hostname: &str,
    ) -> Result<usize, DnsAutomationError> {
        let envelope: CloudflareEnvelope<Vec<CloudflareDnsRecord>> = self
            .request(
                Method::GET,
                &format!("zones/{zone_id}/dns_records"),
                &[("type", "CNAME"), ("name", hostname)],
                None,
            )
            .await?;
        if !envelope.success {
            return Err(DnsAutomationError::Provider {
                message: envelope.error_message(),
            });
        }

        let records = envelope.result.unwrap_or_default();
        for record in &records {
            let deleted: CloudflareEnvelope<Value> = self
                .request(
                    Method::DELETE,
                    &format!("zones/{zone_id}/dns_records/{}", record.id),
                    &[],
                    None,
                )
                .await?;
            if !deleted.success {
                return Err(DnsAutomationError::Provider {
                    message: deleted.error_message(),
                });
            }
        }
        Ok(records.len())
    }
}

#[async_trait]
impl DnsAutomation for CloudflareDnsAutomation {
    fn is_configured(&self) -> bool {
        true
    }

    async fn setup_domain(&self, hostname: &str) -> Result<AutomationSetup, DnsAutomationError> {
        let zone_name = registrable_domain(hostname);
        let zone = self.create_or_reuse_zone(&zone_name).await?;
        self.upsert_cname(&zone.id, hostname).await?;

        let state = zone_state(&zone.status);
        tracing::info!(
            target: "vitrine.dns_automation",
            hostname,
            zone = %zone_name,
            zone_status = %zone.status,
            state = state.as_str(),
            "cloudflare zone provisioned",
        );
        Ok(AutomationSetup {
            automated: true,
            zone: zone_name,
            name_servers: zone.name_servers,
            state,
        })
    }

    async fn check_status(&self, hostname: &str) -> Result<AutomationStatus, DnsAutomationError> {
        let zone_name = registrable_domain(hostname);
        let zone = self
            .find_zone(&zone_name)
            .await?
            .ok_or(DnsAutomationError::ZoneNotFound { zone: zone_name })?;

        let ssl_state = self.ssl_state(&zone.id, hostname).await;
        Ok(AutomationStatus {
            state: zone_state(&zone.status),
            ssl_state,
        })
    }

    async fn teardown(&self, hostname: &str, remove_zone: bool) -> Result<(), DnsAutomationError> {
        let zone_name = registrable_domain(hostname);
        let Some(zone) = self.find_zone(&zone_name).await? else {
            return Ok(());
        };

        let removed_records = self.delete_hostname_records(&zone.id, hostname).await?;
        if !remove_zone {
            tracing::info!(
                target: "vitrine.dns_automation",
                hostname,
                zone = %zone_name,
                removed_records,
                "cloudflare hostname record removed; zone still in use",
            );
            return Ok(());
        }

        let envelope: CloudflareEnvelope<Value> = self
            .request(Method::DELETE, &format!("zones/{}", zone.id), &[], None)
            .await?;
        if !envelope.success {
            return Err(DnsAutomationError::Provider {
                message: envelope.error_message(),
            });
        }
        tracing::info!(
            target: "vitrine.dns_automation",
            hostname,
            zone = %zone_name,
            removed_records,
            "cloudflare zone removed",
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cloudflare"
    }
}

fn zone_state(status: &str) -> AutomationState {
    match status {
        "active" => AutomationState::Active,
        "pending" | "initializing" => AutomationState::NameserversPending,
        _ => AutomationState::Error,
    }
}

pub fn registrable_domain(hostname: &str) -> String {
    let labels: Vec<&str> = hostname
        .trim()
        .trim_end_matches('.')
        .split('.')
        .filter(|label| !label.is_empty())
        .collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }

    let last_two = labels[labels.len() - 2..].join(".");
    let keep = if MULTI_LABEL_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };
    labels[labels.len() - keep.min(labels.len())..].join(".")
}

pub fn is_zone_apex(hostname: &str) -> bool {
    registrable_domain(hostname) == hostname.trim().trim_end_matches('.')
}
