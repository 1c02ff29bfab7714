use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8790";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_LOG_JSON: bool = false;
const DEFAULT_PLATFORM_DOMAINS: &str = "vitrine.app,localhost,vercel.app";
const DEFAULT_SITE_PATH_PREFIX: &str = "/site";
const DEFAULT_CUSTOM_DOMAIN_BYPASS_PREFIXES: &str = "/api,/assets,/healthz,/readyz";
const DEFAULT_STATIC_ASSET_EXTENSIONS: &str =
    "js,mjs,css,map,json,png,jpg,jpeg,gif,svg,webp,avif,ico,woff,woff2,ttf,otf,eot";
const DEFAULT_CUSTOM_DOMAIN_CACHE_TTL_SECONDS: u64 = 300;
const DEFAULT_CUSTOM_DOMAIN_FAIL_MODE: &str = "open";
const DEFAULT_TRUST_FORWARDED_HOST: bool = false;
const DEFAULT_DOH_ENDPOINT: &str = "https://dns.google/resolve";
const DEFAULT_DOH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PLATFORM_DNS_TARGET: &str = "sites.vitrine.app";
const DEFAULT_CLOUDFLARE_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
const DEFAULT_DNS_AUTOMATION_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub log_json: bool,
    pub domain_store_path: Option<PathBuf>,
    pub internal_api_token: Option<String>,
    pub platform_domains: Vec<String>,
    pub site_path_prefix: String,
    pub custom_domain_bypass_prefixes: Vec<String>,
    pub static_asset_extensions: Vec<String>,
    pub custom_domain_cache_ttl_seconds: u64,
    pub custom_domain_fail_mode: String,
    pub trust_forwarded_host: bool,
    pub doh_endpoint: String,
    pub doh_timeout_ms: u64,
    pub platform_dns_target: String,
    pub platform_ipv4: Option<String>,
    pub cloudflare_api_token: Option<String>,
    pub cloudflare_account_id: Option<String>,
    pub cloudflare_api_base_url: String,
    pub dns_automation_timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid VT_BIND_ADDR value '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid VT_CUSTOM_DOMAIN_FAIL_MODE value '{value}': expected 'open' or 'closed'")]
    InvalidFailMode { value: String },
    #[error("invalid VT_SITE_PATH_PREFIX value '{value}': must be a non-root path like /site")]
    InvalidSitePathPrefix { value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr_raw = env::var("VT_BIND_ADDR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let bind_addr = bind_addr_raw
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: bind_addr_raw,
                source,
            })?;

        let log_filter = env::var("VT_LOG_FILTER")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let log_json = env::var("VT_LOG_FORMAT")
            .ok()
            .map(|value| value.trim().eq_ignore_ascii_case("json"))
            .unwrap_or(DEFAULT_LOG_JSON);

        let domain_store_path = env::var("VT_DOMAIN_STORE_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let internal_api_token = non_empty_env("VT_INTERNAL_API_TOKEN");

        let platform_domains = parse_csv(
            env::var("VT_PLATFORM_DOMAINS")
                .ok()
                .unwrap_or_else(|| DEFAULT_PLATFORM_DOMAINS.to_string()),
        )
        .into_iter()
        .map(|domain| domain.to_lowercase())
        .collect();

        let site_path_prefix_raw = env::var("VT_SITE_PATH_PREFIX")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SITE_PATH_PREFIX.to_string());
        let site_path_prefix = normalize_path_prefix(&site_path_prefix_raw).ok_or(
            ConfigError::InvalidSitePathPrefix {
                value: site_path_prefix_raw,
            },
        )?;

        let custom_domain_bypass_prefixes = parse_csv(
            env::var("VT_CUSTOM_DOMAIN_BYPASS_PREFIXES")
                .ok()
                .unwrap_or_else(|| DEFAULT_CUSTOM_DOMAIN_BYPASS_PREFIXES.to_string()),
        )
        .iter()
        .filter_map(|prefix| normalize_path_prefix(prefix))
        .collect();

        let static_asset_extensions = parse_csv(
            env::var("VT_STATIC_ASSET_EXTENSIONS")
                .ok()
                .unwrap_or_else(|| DEFAULT_STATIC_ASSET_EXTENSIONS.to_string()),
        )
        .into_iter()
        .map(|extension| extension.trim_start_matches('.').to_lowercase())
        .collect();

        let custom_domain_cache_ttl_seconds = env::var("VT_CUSTOM_DOMAIN_CACHE_TTL_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CUSTOM_DOMAIN_CACHE_TTL_SECONDS);

        let custom_domain_fail_mode = env::var("VT_CUSTOM_DOMAIN_FAIL_MODE")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CUSTOM_DOMAIN_FAIL_MODE.to_string())
            .trim()
            .to_lowercase();
        if !matches!(custom_domain_fail_mode.as_str(), "open" | "closed") {
            return Err(ConfigError::InvalidFailMode {
                value: custom_domain_fail_mode,
            });
        }

        let trust_forwarded_host = env::var("VT_TRUST_FORWARDED_HOST")
            .ok()
            .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(DEFAULT_TRUST_FORWARDED_HOST);

        let doh_endpoint = env::var("VT_DOH_ENDPOINT")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DOH_ENDPOINT.to_string());

        let doh_timeout_ms = env::var("VT_DOH_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DOH_TIMEOUT_MS);

        let platform_dns_target = env::var("VT_PLATFORM_DNS_TARGET")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PLATFORM_DNS_TARGET.to_string())
            .trim()
            .to_lowercase();

        let platform_ipv4 = non_empty_env("VT_PLATFORM_IPV4");

        let cloudflare_api_token = non_empty_env("CLOUDFLARE_API_TOKEN");
        let cloudflare_account_id = non_empty_env("CLOUDFLARE_ACCOUNT_ID");

        let cloudflare_api_base_url = env::var("VT_CLOUDFLARE_API_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLOUDFLARE_API_BASE_URL.to_string());

        let dns_automation_timeout_ms = env::var("VT_DNS_AUTOMATION_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DNS_AUTOMATION_TIMEOUT_MS);

        Ok(Self {
            bind_addr,
            log_filter,
            log_json,
            domain_store_path,
            internal_api_token,
            platform_domains,
            site_path_prefix,
            custom_domain_bypass_prefixes,
            static_asset_extensions,
            custom_domain_cache_ttl_seconds,
            custom_domain_fail_mode,
            trust_forwarded_host,
            doh_endpoint,
            doh_timeout_ms,
            platform_dns_target,
            platform_ipv4,
            cloudflare_api_token,
            cloudflare_account_id,
            cloudflare_api_base_url,
            dns_automation_timeout_ms,
        })
    }

    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_filter: "debug".to_string(),
            log_json: false,
            domain_store_path: None,
            internal_api_token: Some("internal-test-token".to_string()),
            platform_domains: parse_csv(DEFAULT_PLATFORM_DOMAINS.to_string()),
            site_path_prefix: DEFAULT_SITE_PATH_PREFIX.to_string(),
            custom_domain_bypass_prefixes: parse_csv(
                DEFAULT_CUSTOM_DOMAIN_BYPASS_PREFIXES.to_string(),
            ),
            static_asset_extensions: parse_csv(DEFAULT_STATIC_ASSET_EXTENSIONS.to_string()),
            custom_domain_cache_ttl_seconds: DEFAULT_CUSTOM_DOMAIN_CACHE_TTL_SECONDS,
            custom_domain_fail_mode: DEFAULT_CUSTOM_DOMAIN_FAIL_MODE.to_string(),
            trust_forwarded_host: false,
            doh_endpoint: "http://127.0.0.1:9/resolve".to_string(),
            doh_timeout_ms: 2_000,
            platform_dns_target: DEFAULT_PLATFORM_DNS_TARGET.to_string(),
            platform_ipv4: Some("203.0.113.10".to_string()),
            cloudflare_api_token: None,
            cloudflare_account_id: None,
            cloudflare_api_base_url: DEFAULT_CLOUDFLARE_API_BASE_URL.to_string(),
            dns_automation_timeout_ms: 2_000,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_csv(value: String) -> Vec<String> {
    value
        .split(',')
        .map(|segment| segment.trim().to_string())
        .filter(|segment| !segment.is_empty())
        .collect()
}

fn normalize_path_prefix(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!("/{trimmed}"))
}
