use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;

const DNS_TYPE_A: u16 = 1;
const DNS_TYPE_AAAA: u16 = 28;
const DNS_STATUS_NOERROR: u32 = 0;
const DNS_STATUS_SERVFAIL: u32 = 2;
const DNS_STATUS_NXDOMAIN: u32 = 3;
const DNS_STATUS_REFUSED: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified { addresses: Vec<String> },
    Pending { message: String },
    Failed { message: String },
}

impl VerificationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Verified { .. } => "verified",
            Self::Pending { .. } => "pending",
            Self::Failed { .. } => "error",
        }
    }
}

#[async_trait]
pub trait DomainVerifier: Send + Sync {
    async fn verify(&self, hostname: &str) -> VerificationOutcome;
}

#[derive(Debug, Clone)]
pub struct DnsOverHttpsVerifier {
    endpoint: String,
    timeout: Duration,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    #[serde(default)]
    data: String,
}

impl DnsOverHttpsVerifier {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        Self {
            endpoint,
            timeout,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.doh_endpoint.clone(),
            Duration::from_millis(config.doh_timeout_ms.max(250)),
        )
    }

    async fn query(&self, hostname: &str) -> Result<DohResponse, String> {
        let response = self
            .http
            .get(self.endpoint.as_str())
            .query(&[("name", hostname), ("type", "A")])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    format!("DNS lookup timed out after {}ms", self.timeout.as_millis())
                } else {
                    format!("DNS lookup failed: {error}")
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("DNS resolver answered with HTTP {status}"));
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| format!("DNS lookup failed: {error}"))?;
        serde_json::from_slice::<DohResponse>(&body)
            .map_err(|error| format!("DNS resolver returned an unreadable response: {error}"))
    }
}

#[async_trait]
impl DomainVerifier for DnsOverHttpsVerifier {
    async fn verify(&self, hostname: &str) -> VerificationOutcome {
        let outcome = match self.query(hostname).await {
            Ok(response) => classify_response(&response),
            Err(message) => VerificationOutcome::Failed { message },
        };

        tracing::info!(
            target: "vitrine.verification",
            hostname,
            outcome = outcome.label(),
            "custom domain verification checked",
        );
        outcome
    }
}

fn classify_response(response: &DohResponse) -> VerificationOutcome {
    match response.status {
        DNS_STATUS_NOERROR | DNS_STATUS_NXDOMAIN => {}
        DNS_STATUS_SERVFAIL => {
            return VerificationOutcome::Failed {
                message: "DNS resolver failed to answer (SERVFAIL)".to_string(),
            };
        }
        DNS_STATUS_REFUSED => {
            return VerificationOutcome::Failed {
                message: "DNS resolver refused the query (REFUSED)".to_string(),
            };
        }
        other => {
            return VerificationOutcome::Failed {
                message: format!("DNS resolver returned status {other}"),
            };
        }
    }

    let addresses: Vec<String> = response
        .answer
        .iter()
        .filter(|answer| matches!(answer.record_type, DNS_TYPE_A | DNS_TYPE_AAAA))
        .map(|answer| answer.data.trim().to_string())
        .filter(|data| !data.is_empty())
        .collect();

    if addresses.is_empty() {
        VerificationOutcome::Pending {
            message: "DNS records not found yet. Propagation can take up to 48 hours.".to_string(),
        }
    } else {
        VerificationOutcome::Verified { addresses }
    }
}
