use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::dns_automation::{
    DnsAutomation, DnsAutomationError, is_zone_apex, registrable_domain,
};
use crate::domain_store::{AutomationState, DomainStore, DomainStoreError, TenantDomainConfig};
use crate::verification::{DomainVerifier, VerificationOutcome};

#[derive(Debug, thiserror::Error)]
pub enum DomainSettingsError {
    #[error(transparent)]
    Store(#[from] DomainStoreError),
    #[error("no custom domain is configured for this tenant")]
    NoCustomDomain,
    #[error(transparent)]
    Automation(#[from] DnsAutomationError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsInstruction {
    pub record_type: &'static str,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainStatusView {
    pub tenant_id: String,
    pub tenant_slug: String,
    pub site_path: String,
    pub custom_domain: Option<String>,
    pub domain_verified: bool,
    pub live_url: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub automation_state: AutomationState,
    pub automation_ssl_state: Option<String>,
    pub automation_available: bool,
    pub dns_instructions: Vec<DnsInstruction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyDomainResult {
    pub verification: VerificationOutcome,
    pub status: DomainStatusView,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutomationSetupResult {
    pub automated: bool,
    pub name_servers: Vec<String>,
    pub status: DomainStatusView,
}

#[derive(Clone)]
pub struct DomainSettingsService {
    store: DomainStore,
    verifier: Arc<dyn DomainVerifier>,
    automation: Arc<dyn DnsAutomation>,
    site_path_prefix: String,
    platform_dns_target: String,
    platform_ipv4: Option<String>,
}

impl DomainSettingsService {
    pub fn new(
        config: &Config,
        store: DomainStore,
        verifier: Arc<dyn DomainVerifier>,
        automation: Arc<dyn DnsAutomation>,
    ) -> Self {
        Self {
            store,
            verifier,
            automation,
            site_path_prefix: config.site_path_prefix.clone(),
            platform_dns_target: config.platform_dns_target.clone(),
            platform_ipv4: config.platform_ipv4.clone(),
        }
    }

    pub fn automation_name(&self) -> &'static str {
        self.automation.name()
    }

    pub async fn status(&self, tenant_id: &str) -> Result<DomainStatusView, DomainSettingsError> {
        let config = self.store.domain_config(tenant_id).await?;
        self.view(config).await
    }

    pub async fn set_domain(
        &self,
        tenant_id: &str,
        hostname: &str,
    ) -> Result<DomainStatusView, DomainSettingsError> {
        let previous = self.store.domain_config(tenant_id).await?;
        let updated = self.store.set_custom_domain(tenant_id, hostname).await?;

        if previous.custom_domain != updated.custom_domain {
            tracing::info!(
                target: "vitrine.domain_settings",
                tenant_id,
                previous = previous.custom_domain.as_deref().unwrap_or(""),
                hostname = updated.custom_domain.as_deref().unwrap_or(""),
                "custom domain updated",
            );
            self.teardown_previous(&previous).await;
        }
        self.view(updated).await
    }

    pub async fn remove_domain(
        &self,
        tenant_id: &str,
    ) -> Result<DomainStatusView, DomainSettingsError> {
        let previous = self.store.domain_config(tenant_id).await?;
        let cleared = self.store.clear_custom_domain(tenant_id).await?;
        if previous.custom_domain.is_some() {
            tracing::info!(
                target: "vitrine.domain_settings",
                tenant_id,
                hostname = previous.custom_domain.as_deref().unwrap_or(""),
                "custom domain removed",
            );
        }
        self.teardown_previous(&previous).await;
        self.view(cleared).await
    }

    pub async fn verify(&self, tenant_id: &str) -> Result<VerifyDomainResult, DomainSettingsError> {
        let config = self.store.domain_config(tenant_id).await?;
        let hostname = config
            .custom_domain
            .clone()
            .ok_or(DomainSettingsError::NoCustomDomain)?;

        let verification = self.verifier.verify(&hostname).await;
        let config = match &verification {
            VerificationOutcome::Verified { .. } => self
                .store
                .mark_domain_verified(tenant_id, &hostname)
                .await?
                .unwrap_or(config),
            VerificationOutcome::Pending { .. } | VerificationOutcome::Failed { .. } => config,
        };

        Ok(VerifyDomainResult {
            verification,
            status: self.view(self.current_or(tenant_id, config).await).await?,
        })
    }

    pub async fn setup_automatically(
        &self,
        tenant_id: &str,
    ) -> Result<AutomationSetupResult, DomainSettingsError> {
        let config = self.store.domain_config(tenant_id).await?;
        let hostname = config
            .custom_domain
            .clone()
            .ok_or(DomainSettingsError::NoCustomDomain)?;

        if !self.automation.is_configured() {
            return Ok(AutomationSetupResult {
                automated: false,
                name_servers: Vec::new(),
                status: self.view(config).await?,
            });
        }

        self.store
            .record_automation_state(tenant_id, &hostname, AutomationState::Provisioning, None)
            .await?;

        match self.automation.setup_domain(&hostname).await {
            Ok(setup) => {
                let updated = self
                    .store
                    .record_automation_state(tenant_id, &hostname, setup.state, None)
                    .await?;
                Ok(AutomationSetupResult {
                    automated: setup.automated,
                    name_servers: setup.name_servers,
                    status: self
                        .view(self.current_or(tenant_id, updated.unwrap_or(config)).await)
                        .await?,
                })
            }
            Err(error) => {
                tracing::warn!(
                    target: "vitrine.domain_settings",
                    tenant_id,
                    hostname = %hostname,
                    provider = self.automation.name(),
                    error = %error,
                    "dns automation setup failed",
                );
                self.store
                    .record_automation_state(tenant_id, &hostname, AutomationState::Error, None)
                    .await?;
                Err(error.into())
            }
        }
    }

    pub async fn check_automation_status(
        &self,
        tenant_id: &str,
    ) -> Result<DomainStatusView, DomainSettingsError> {
        let config = self.store.domain_config(tenant_id).await?;
        let hostname = config
            .custom_domain
            .clone()
            .ok_or(DomainSettingsError::NoCustomDomain)?;
        if !self.automation.is_configured() || config.automation_state == AutomationState::None {
            return self.view(config).await;
        }

        match self.automation.check_status(&hostname).await {
            Ok(status) => {
                let updated = self
                    .store
                    .record_automation_state(tenant_id, &hostname, status.state, status.ssl_state)
                    .await?;
                self.view(self.current_or(tenant_id, updated.unwrap_or(config)).await)
                    .await
            }
            Err(error) => {
                tracing::warn!(
                    target: "vitrine.domain_settings",
                    tenant_id,
                    hostname = %hostname,
                    provider = self.automation.name(),
                    error = %error,
                    "dns automation status check failed",
                );
                self.store
                    .record_automation_state(tenant_id, &hostname, AutomationState::Error, None)
                    .await?;
                Err(error.into())
            }
        }
    }

    async fn teardown_previous(&self, previous: &TenantDomainConfig) {
        let Some(hostname) = previous.custom_domain.as_deref() else {
            return;
        };
        if previous.automation_state == AutomationState::None || !self.automation.is_configured() {
            return;
        }
        let zone = registrable_domain(hostname);
        let zone_in_use = self
            .store
            .custom_domains()
            .await
            .iter()
            .any(|other| other != hostname && registrable_domain(other) == zone);
        if let Err(error) = self.automation.teardown(hostname, !zone_in_use).await {
            tracing::warn!(
                target: "vitrine.domain_settings",
                tenant_id = %previous.tenant_id,
                hostname,
                zone_in_use,
                provider = self.automation.name(),
                error = %error,
                "dns automation teardown failed",
            );
        }
    }

    async fn current_or(&self, tenant_id: &str, fallback: TenantDomainConfig) -> TenantDomainConfig {
        self.store.domain_config(tenant_id).await.unwrap_or(fallback)
    }

    async fn view(&self, config: TenantDomainConfig) -> Result<DomainStatusView, DomainSettingsError> {
        let tenant = self
            .store
            .tenant(&config.tenant_id)
            .await
            .ok_or(DomainStoreError::NotFound)?;
        let dns_instructions = config
            .custom_domain
            .as_deref()
            .map(|hostname| self.dns_instructions(hostname))
            .unwrap_or_default();
        let live_url = config
            .custom_domain
            .as_ref()
            .filter(|_| config.domain_verified)
            .map(|hostname| format!("https://{hostname}"));

        Ok(DomainStatusView {
            tenant_id: tenant.id,
            site_path: format!("{}/{}", self.site_path_prefix, tenant.slug),
            tenant_slug: tenant.slug,
            custom_domain: config.custom_domain,
            domain_verified: config.domain_verified,
            live_url,
            verified_at: config.verified_at,
            automation_state: config.automation_state,
            automation_ssl_state: config.automation_ssl_state,
            automation_available: self.automation.is_configured(),
            dns_instructions,
        })
    }

    fn dns_instructions(&self, hostname: &str) -> Vec<DnsInstruction> {
        if !is_zone_apex(hostname) {
            return vec![DnsInstruction {
                record_type: "CNAME",
                name: hostname.to_string(),
                value: self.platform_dns_target.clone(),
            }];
        }
        match self.platform_ipv4.as_ref() {
            Some(ipv4) => vec![DnsInstruction {
                record_type: "A",
                name: hostname.to_string(),
                value: ipv4.clone(),
            }],
            None => vec![DnsInstruction {
                record_type: "ALIAS",
                name: hostname.to_string(),
                value: self.platform_dns_target.clone(),
            }],
        }
    }
}
