use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::Config;
use crate::domain_cache::DomainResolutionCache;
use crate::host_policy::{HostnameError, PlatformHostPolicy};

const MAX_SLUG_LEN: usize = 63;

#[derive(Clone)]
pub struct DomainStore {
    state: Arc<RwLock<DomainStoreState>>,
    write_lock: Arc<Mutex<()>>,
    path: Option<PathBuf>,
    cache: Arc<DomainResolutionCache>,
    host_policy: PlatformHostPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum DomainStoreError {
    #[error("record not found")]
    NotFound,
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("{message}")]
    Conflict { message: String },
    #[error("{message}")]
    Persistence { message: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationState {
    #[default]
    None,
    Provisioning,
    NameserversPending,
    Active,
    Error,
}

impl AutomationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Provisioning => "provisioning",
            Self::NameserversPending => "nameservers_pending",
            Self::Active => "active",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: String,
    pub slug: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantDomainConfig {
    pub tenant_id: String,
    pub custom_domain: Option<String>,
    pub domain_verified: bool,
    pub automation_state: AutomationState,
    pub automation_ssl_state: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantDomainConfig {
    fn empty(tenant_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            custom_domain: None,
            domain_verified: false,
            automation_state: AutomationState::None,
            automation_ssl_state: None,
            verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedDomainMatch {
    pub tenant_id: String,
    pub tenant_slug: String,
}

#[derive(Debug, Clone)]
pub struct UpsertTenantInput {
    pub tenant_id: String,
    pub slug: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DomainConfigPatch {
    pub expected_custom_domain: Option<String>,
    pub custom_domain: Option<Option<String>>,
    pub domain_verified: Option<bool>,
    pub automation_state: Option<AutomationState>,
    pub automation_ssl_state: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DomainStoreState {
    #[serde(default)]
    tenants: HashMap<String, TenantRecord>,
    #[serde(default)]
    domain_configs: HashMap<String, TenantDomainConfig>,
    #[serde(skip)]
    hostname_index: HashMap<String, String>,
}

impl DomainStoreState {
    fn rebuild_hostname_index(&mut self) {
        self.hostname_index = self
            .domain_configs
            .values()
            .filter_map(|config| {
                config
                    .custom_domain
                    .clone()
                    .map(|hostname| (hostname, config.tenant_id.clone()))
            })
            .collect();
    }
}

#[async_trait]
pub trait DomainLookup: Send + Sync {
    async fn find_by_verified_domain(
        &self,
        hostname: &str,
    ) -> Result<Option<VerifiedDomainMatch>, DomainStoreError>;
}

#[async_trait]
impl DomainLookup for DomainStore {
    async fn find_by_verified_domain(
        &self,
        hostname: &str,
    ) -> Result<Option<VerifiedDomainMatch>, DomainStoreError> {
        let hostname = hostname.trim().trim_end_matches('.').to_lowercase();
        let state = self.state.read().await;
        let Some(tenant_id) = state.hostname_index.get(&hostname) else {
            return Ok(None);
        };
        let verified = state
            .domain_configs
            .get(tenant_id)
            .is_some_and(|config| config.domain_verified);
        if !verified {
            return Ok(None);
        }
        Ok(state
            .tenants
            .get(tenant_id)
            .map(|tenant| VerifiedDomainMatch {
                tenant_id: tenant.id.clone(),
                tenant_slug: tenant.slug.clone(),
            }))
    }
}

impl DomainStore {
    pub fn from_config(config: &Config, cache: Arc<DomainResolutionCache>) -> Self {
        let path = config.domain_store_path.clone();
        let state = Self::load_state(path.as_ref());

        Self {
            state: Arc::new(RwLock::new(state)),
            write_lock: Arc::new(Mutex::new(())),
            path,
            cache,
            host_policy: PlatformHostPolicy::from_entries(&config.platform_domains),
        }
    }

    pub fn cache(&self) -> &Arc<DomainResolutionCache> {
        &self.cache
    }

    pub fn host_policy(&self) -> &PlatformHostPolicy {
        &self.host_policy
    }

    pub async fn upsert_tenant(
        &self,
        input: UpsertTenantInput,
    ) -> Result<TenantRecord, DomainStoreError> {
        let tenant_id = normalize_non_empty(&input.tenant_id, "tenant_id")?;
        let slug = normalize_slug(&input.slug)?;
        let display_name = input
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string);

        let mut touched = Vec::new();
        let result = self
            .mutate(|state| {
                if let Some(owner) = state
                    .tenants
                    .values()
                    .find(|tenant| tenant.slug == slug && tenant.id != tenant_id)
                {
                    return Err(DomainStoreError::Conflict {
                        message: format!("slug '{slug}' is already used by tenant {}", owner.id),
                    });
                }

                let now = Utc::now();
                let record = match state.tenants.get_mut(&tenant_id) {
                    Some(existing) => {
                        if existing.slug != slug {
                            if let Some(host) = state
                                .domain_configs
                                .get(&tenant_id)
                                .and_then(|config| config.custom_domain.clone())
                            {
                                touched.push(host);
                            }
                            existing.slug = slug.clone();
                        }
                        if let Some(display_name) = display_name.clone() {
                            existing.display_name = display_name;
                        }
                        existing.updated_at = now;
                        existing.clone()
                    }
                    None => {
                        let record = TenantRecord {
                            id: tenant_id.clone(),
                            slug: slug.clone(),
                            display_name: display_name.clone().unwrap_or_else(|| slug.clone()),
                            created_at: now,
                            updated_at: now,
                        };
                        state.tenants.insert(tenant_id.clone(), record.clone());
                        record
                    }
                };
                Ok(record)
            })
            .await;

        if result.is_ok() {
            self.invalidate_hosts(&touched).await;
        }
        result
    }

    pub async fn tenant(&self, tenant_id: &str) -> Option<TenantRecord> {
        self.state.read().await.tenants.get(tenant_id.trim()).cloned()
    }

    pub async fn tenant_by_slug(&self, slug: &str) -> Option<TenantRecord> {
        let slug = slug.trim().to_lowercase();
        self.state
            .read()
            .await
            .tenants
            .values()
            .find(|tenant| tenant.slug == slug)
            .cloned()
    }

    pub async fn domain_config(
        &self,
        tenant_id: &str,
    ) -> Result<TenantDomainConfig, DomainStoreError> {
        let tenant_id = tenant_id.trim();
        let state = self.state.read().await;
        if !state.tenants.contains_key(tenant_id) {
            return Err(DomainStoreError::NotFound);
        }
        Ok(state
            .domain_configs
            .get(tenant_id)
            .cloned()
            .unwrap_or_else(|| TenantDomainConfig::empty(tenant_id, Utc::now())))
    }

    pub async fn custom_domains(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .hostname_index
            .keys()
            .cloned()
            .collect()
    }

    pub fn normalize_custom_domain(&self, raw: &str) -> Result<String, DomainStoreError> {
        self.host_policy
            .normalize_custom_domain(raw)
            .map_err(hostname_validation_error)
    }

    pub async fn upsert_config(
        &self,
        tenant_id: &str,
        patch: DomainConfigPatch,
    ) -> Result<Option<TenantDomainConfig>, DomainStoreError> {
        let tenant_id = normalize_non_empty(tenant_id, "tenant_id")?;
        let next_domain = match patch.custom_domain.as_ref() {
            Some(Some(raw)) => Some(Some(self.normalize_custom_domain(raw)?)),
            Some(None) => Some(None),
            None => None,
        };
        let expected = patch
            .expected_custom_domain
            .as_deref()
            .map(|value| value.trim().trim_end_matches('.').to_lowercase());

        let mut touched = Vec::new();
        let result = self
            .mutate(|state| {
                if !state.tenants.contains_key(&tenant_id) {
                    return Err(DomainStoreError::NotFound);
                }
                let now = Utc::now();
                let current = state
                    .domain_configs
                    .get(&tenant_id)
                    .cloned()
                    .unwrap_or_else(|| TenantDomainConfig::empty(&tenant_id, now));

                if let Some(expected) = expected.as_deref() {
                    if current.custom_domain.as_deref() != Some(expected) {
                        return Ok(None);
                    }
                }

                if let Some(Some(host)) = next_domain.as_ref() {
                    if let Some(holder) = state
                        .hostname_index
                        .get(host)
                        .filter(|holder| **holder != tenant_id)
                    {
                        tracing::info!(
                            target: "vitrine.domain_store",
                            hostname = %host,
                            tenant_id = %tenant_id,
                            holder_tenant_id = %holder,
                            "rejected custom domain collision",
                        );
                        return Err(DomainStoreError::Conflict {
                            message: format!("{host} is already claimed by another tenant"),
                        });
                    }
                }

                let mut next = current.clone();
                if let Some(domain) = next_domain.clone() {
                    if domain != current.custom_domain {
                        next.custom_domain = domain;
                        next.domain_verified = false;
                        next.verified_at = None;
                        next.automation_state = AutomationState::None;
                        next.automation_ssl_state = None;
                    }
                }
                if let Some(automation_state) = patch.automation_state {
                    next.automation_state = automation_state;
                }
                if let Some(ssl_state) = patch.automation_ssl_state.clone() {
                    next.automation_ssl_state = ssl_state;
                }
                if let Some(verified) = patch.domain_verified {
                    if verified && next.custom_domain.is_none() {
                        return Err(DomainStoreError::Validation {
                            field: "domain_verified",
                            message: "cannot verify a tenant without a custom domain".to_string(),
                        });
                    }
                    if verified && !next.domain_verified {
                        next.verified_at = Some(now);
                    }
                    if !verified {
                        next.verified_at = None;
                    }
                    next.domain_verified = verified;
                }
                if next.custom_domain.is_none() {
                    next.automation_state = AutomationState::None;
                    next.automation_ssl_state = None;
                }

                if same_domain_fields(&current, &next) {
                    return Ok(Some(current));
                }

                next.updated_at = now;
                if current.custom_domain != next.custom_domain {
                    if let Some(previous) = current.custom_domain.as_ref() {
                        state.hostname_index.remove(previous);
                    }
                    if let Some(hostname) = next.custom_domain.clone() {
                        state.hostname_index.insert(hostname, tenant_id.clone());
                    }
                }
                touched.extend(current.custom_domain.iter().cloned());
                touched.extend(next.custom_domain.iter().cloned());
                state.domain_configs.insert(tenant_id.clone(), next.clone());
                Ok(Some(next))
            })
            .await;

        if result.is_ok() {
            self.invalidate_hosts(&touched).await;
        }
        result
    }

    pub async fn set_custom_domain(
        &self,
        tenant_id: &str,
        hostname: &str,
    ) -> Result<TenantDomainConfig, DomainStoreError> {
        self.upsert_config(
            tenant_id,
            DomainConfigPatch {
                custom_domain: Some(Some(hostname.to_string())),
                ..DomainConfigPatch::default()
            },
        )
        .await?
        .ok_or(DomainStoreError::NotFound)
    }

    pub async fn clear_custom_domain(
        &self,
        tenant_id: &str,
    ) -> Result<TenantDomainConfig, DomainStoreError> {
        self.upsert_config(
            tenant_id,
            DomainConfigPatch {
                custom_domain: Some(None),
                ..DomainConfigPatch::default()
            },
        )
        .await?
        .ok_or(DomainStoreError::NotFound)
    }

    pub async fn mark_domain_verified(
        &self,
        tenant_id: &str,
        hostname: &str,
    ) -> Result<Option<TenantDomainConfig>, DomainStoreError> {
        self.upsert_config(
            tenant_id,
            DomainConfigPatch {
                expected_custom_domain: Some(hostname.to_string()),
                domain_verified: Some(true),
                ..DomainConfigPatch::default()
            },
        )
        .await
    }

    pub async fn record_automation_state(
        &self,
        tenant_id: &str,
        hostname: &str,
        automation_state: AutomationState,
        ssl_state: Option<String>,
    ) -> Result<Option<TenantDomainConfig>, DomainStoreError> {
        let ssl_state = ssl_state.map(Some);
        self.upsert_config(
            tenant_id,
            DomainConfigPatch {
                expected_custom_domain: Some(hostname.to_string()),
                automation_state: Some(automation_state),
                automation_ssl_state: ssl_state,
                domain_verified: (automation_state == AutomationState::Active).then_some(true),
                ..DomainConfigPatch::default()
            },
        )
        .await
    }

    async fn invalidate_hosts(&self, hosts: &[String]) {
        for host in hosts {
            self.cache.invalidate(host).await;
        }
    }

    fn load_state(path: Option<&PathBuf>) -> DomainStoreState {
        let Some(path) = path else {
            return DomainStoreState::default();
        };

        let raw = match std::fs::read_to_string(path) {
            Ok(value) => value,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return DomainStoreState::default();
            }
            Err(error) => {
                tracing::warn!(
                    target: "vitrine.domain_store",
                    path = %path.display(),
                    error = %error,
                    "failed to read domain store; booting with empty state",
                );
                return DomainStoreState::default();
            }
        };

        match serde_json::from_str::<DomainStoreState>(&raw) {
            Ok(mut state) => {
                state.rebuild_hostname_index();
                state
            }
            Err(error) => {
                tracing::warn!(
                    target: "vitrine.domain_store",
                    path = %path.display(),
                    error = %error,
                    "failed to parse domain store; booting with empty state",
                );
                DomainStoreState::default()
            }
        }
    }

    async fn persist_state(&self, snapshot: &DomainStoreState) -> Result<(), DomainStoreError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                DomainStoreError::Persistence {
                    message: format!("failed to prepare domain store directory: {error}"),
                }
            })?;
        }

        let payload =
            serde_json::to_vec(snapshot).map_err(|error| DomainStoreError::Persistence {
                message: format!("failed to encode domain store payload: {error}"),
            })?;

        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, payload)
            .await
            .map_err(|error| DomainStoreError::Persistence {
                message: format!("failed to write domain store payload: {error}"),
            })?;

        tokio::fs::rename(&temp_path, path).await.map_err(|error| {
            DomainStoreError::Persistence {
                message: format!("failed to finalize domain store payload: {error}"),
            }
        })?;

        Ok(())
    }

    async fn mutate<T, F>(&self, operation: F) -> Result<T, DomainStoreError>
    where
        F: FnOnce(&mut DomainStoreState) -> Result<T, DomainStoreError>,
    {
        let _write_guard = self.write_lock.lock().await;
        let mut next = self.state.read().await.clone();
        let result = operation(&mut next)?;

        self.persist_state(&next).await?;
        *self.state.write().await = next;
        Ok(result)
    }
}

fn same_domain_fields(left: &TenantDomainConfig, right: &TenantDomainConfig) -> bool {
    left.custom_domain == right.custom_domain
        && left.domain_verified == right.domain_verified
        && left.automation_state == right.automation_state
        && left.automation_ssl_state == right.automation_ssl_state
}

fn hostname_validation_error(error: HostnameError) -> DomainStoreError {
    DomainStoreError::Validation {
        field: "custom_domain",
        message: error.to_string(),
    }
}

fn normalize_non_empty(value: &str, field: &'static str) -> Result<String, DomainStoreError> {
    let normalized = value.trim().to_string();
    if normalized.is_empty() {
        return Err(DomainStoreError::Validation {
            field,
            message: format!("{field} is required"),
        });
    }
    Ok(normalized)
}

fn normalize_slug(value: &str) -> Result<String, DomainStoreError> {
    let slug = value.trim().to_lowercase();
    let valid = !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
    if !valid {
        return Err(DomainStoreError::Validation {
            field: "slug",
            message: "slug must be 1-63 lowercase letters, digits or hyphens".to_string(),
        });
    }
    Ok(slug)
}
