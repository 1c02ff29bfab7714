use std::sync::Arc;

use axum::http::StatusCode;

use crate::config::Config;
use crate::domain_cache::DomainResolutionCache;
use crate::domain_store::{DomainLookup, VerifiedDomainMatch};
use crate::host_policy::PlatformHostPolicy;
use crate::web_maud;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    Open,
    Closed,
}

impl FailMode {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("closed") {
            Self::Closed
        } else {
            Self::Open
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    PassThrough {
        reason: &'static str,
    },
    Rewrite {
        path_and_query: String,
        tenant_slug: String,
        hostname: String,
    },
    Reject {
        status: StatusCode,
        hostname: String,
        body: String,
    },
}

#[derive(Clone)]
pub struct CustomDomainRouter {
    host_policy: PlatformHostPolicy,
    site_path_prefix: String,
    bypass_prefixes: Vec<String>,
    static_asset_extensions: Vec<String>,
    fail_mode: FailMode,
    cache: Arc<DomainResolutionCache>,
    lookup: Arc<dyn DomainLookup>,
}

impl CustomDomainRouter {
    pub fn from_config(
        config: &Config,
        cache: Arc<DomainResolutionCache>,
        lookup: Arc<dyn DomainLookup>,
    ) -> Self {
        Self {
            host_policy: PlatformHostPolicy::from_entries(&config.platform_domains),
            site_path_prefix: config.site_path_prefix.clone(),
            bypass_prefixes: config.custom_domain_bypass_prefixes.clone(),
            static_asset_extensions: config
                .static_asset_extensions
                .iter()
                .map(|extension| extension.trim_start_matches('.').to_lowercase())
                .collect(),
            fail_mode: FailMode::parse(&config.custom_domain_fail_mode),
            cache,
            lookup,
        }
    }

    pub fn site_path_prefix(&self) -> &str {
        &self.site_path_prefix
    }

    pub async fn decide(&self, host: Option<&str>, path_and_query: &str) -> RoutingDecision {
        let Some(host) = host.filter(|value| !value.is_empty()) else {
            return RoutingDecision::PassThrough { reason: "no_host" };
        };
        if self.host_policy.is_platform_host(host) {
            return RoutingDecision::PassThrough {
                reason: "platform_host",
            };
        }

        let path = path_only(path_and_query);
        if path_has_prefix(path, &self.site_path_prefix) {
            return RoutingDecision::PassThrough {
                reason: "canonical_site_path",
            };
        }
        if self
            .bypass_prefixes
            .iter()
            .any(|prefix| path_has_prefix(path, prefix))
        {
            return RoutingDecision::PassThrough {
                reason: "bypass_prefix",
            };
        }
        if self.is_static_asset(path) {
            return RoutingDecision::PassThrough {
                reason: "static_asset",
            };
        }

        match self.resolve(host).await {
            Ok(Some(resolved)) => {
                let rewritten = self.rewrite_path(&resolved.tenant_slug, path_and_query);
                tracing::debug!(
                    target: "vitrine.custom_domain",
                    hostname = %host,
                    tenant_slug = %resolved.tenant_slug,
                    rewritten = %rewritten,
                    "rewrote custom domain request",
                );
                RoutingDecision::Rewrite {
                    path_and_query: rewritten,
                    tenant_slug: resolved.tenant_slug,
                    hostname: host.to_string(),
                }
            }
            Ok(None) => {
                tracing::info!(
                    target: "vitrine.custom_domain",
                    hostname = %host,
                    "custom domain not configured",
                );
                RoutingDecision::Reject {
                    status: StatusCode::NOT_FOUND,
                    hostname: host.to_string(),
                    body: web_maud::render_domain_not_configured_page(host),
                }
            }
            Err(error) => {
                tracing::warn!(
                    target: "vitrine.custom_domain",
                    hostname = %host,
                    error = %error,
                    fail_mode = ?self.fail_mode,
                    "custom domain lookup failed",
                );
                match self.fail_mode {
                    FailMode::Open => RoutingDecision::PassThrough {
                        reason: "lookup_failed_open",
                    },
                    FailMode::Closed => RoutingDecision::Reject {
                        status: StatusCode::SERVICE_UNAVAILABLE,
                        hostname: host.to_string(),
                        body: web_maud::render_domain_unavailable_page(host),
                    },
                }
            }
        }
    }

    async fn resolve(
        &self,
        host: &str,
    ) -> Result<Option<VerifiedDomainMatch>, crate::domain_store::DomainStoreError> {
        if let Some(hit) = self.cache.get(host).await {
            return Ok(Some(hit));
        }

        let ticket = self.cache.ticket().await;
        let resolved = self.lookup.find_by_verified_domain(host).await?;
        if let Some(resolved) = resolved.as_ref() {
            self.cache.fill(host, resolved.clone(), ticket).await;
        }
        Ok(resolved)
    }

    fn rewrite_path(&self, tenant_slug: &str, path_and_query: &str) -> String {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };
        let mut rewritten = format!("{}/{tenant_slug}", self.site_path_prefix);
        if !path.is_empty() && path != "/" {
            if !path.starts_with('/') {
                rewritten.push('/');
            }
            rewritten.push_str(path);
        }
        if let Some(query) = query {
            rewritten.push('?');
            rewritten.push_str(query);
        }
        rewritten
    }

    fn is_static_asset(&self, path: &str) -> bool {
        let last_segment = path.rsplit('/').next().unwrap_or_default();
        last_segment
            .rsplit_once('.')
            .is_some_and(|(stem, extension)| {
                !stem.is_empty()
                    && self
                        .static_asset_extensions
                        .iter()
                        .any(|allowed| allowed.eq_ignore_ascii_case(extension))
            })
    }
}

fn path_only(path_and_query: &str) -> &str {
    path_and_query
        .split_once('?')
        .map_or(path_and_query, |(path, _)| path)
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}
