use std::net::IpAddr;

use thiserror::Error;

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    ExactOrSubdomain(String),
    SubdomainOnly(String),
    Exact(String),
}

impl HostPattern {
    fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim().trim_end_matches('.').to_lowercase();
        if let Some(exact) = entry.strip_prefix('=') {
            return non_empty(exact).map(Self::Exact);
        }
        if let Some(suffix) = entry.strip_prefix("*.") {
            return non_empty(suffix).map(Self::SubdomainOnly);
        }
        non_empty(entry.trim_start_matches('.')).map(Self::ExactOrSubdomain)
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(name) => host == name,
            Self::SubdomainOnly(name) => is_subdomain_of(host, name),
            Self::ExactOrSubdomain(name) => host == name || is_subdomain_of(host, name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlatformHostPolicy {
    patterns: Vec<HostPattern>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostnameError {
    #[error("hostname is required")]
    Empty,
    #[error("'{0}' is not a valid hostname")]
    Invalid(String),
    #[error("'{0}' is a platform hostname and cannot be used as a custom domain")]
    Reserved(String),
}

impl PlatformHostPolicy {
    pub fn from_entries(entries: &[String]) -> Self {
        let mut patterns: Vec<HostPattern> = entries
            .iter()
            .filter_map(|entry| HostPattern::parse(entry))
            .collect();
        let localhost = HostPattern::ExactOrSubdomain("localhost".to_string());
        if !patterns.contains(&localhost) {
            patterns.push(localhost);
        }
        Self { patterns }
    }

    pub fn is_platform_host(&self, host: &str) -> bool {
        let host = host.trim().trim_end_matches('.').to_lowercase();
        if host.is_empty() {
            return false;
        }
        if is_ip_literal(&host) {
            return true;
        }
        self.patterns.iter().any(|pattern| pattern.matches(&host))
    }

    pub fn normalize_custom_domain(&self, raw: &str) -> Result<String, HostnameError> {
        let host = normalize_hostname_input(raw).ok_or(HostnameError::Empty)?;
        if self.is_platform_host(&host) {
            return Err(HostnameError::Reserved(host));
        }
        if !is_valid_hostname(&host) {
            return Err(HostnameError::Invalid(host));
        }
        Ok(host)
    }
}

pub fn host_from_header_value(value: &str) -> Option<String> {
    let value = value.trim();
    let host = if let Some(rest) = value.strip_prefix('[') {
        rest.split(']').next()?
    } else if value.matches(':').count() > 1 {
        // bare IPv6 literal without brackets
        value
    } else {
        value.split(':').next()?
    };
    let host = host.trim().trim_end_matches('.').to_lowercase();
    non_empty(&host)
}

pub fn is_ip_literal(host: &str) -> bool {
    let trimmed = host.trim_start_matches('[').trim_end_matches(']');
    trimmed.parse::<IpAddr>().is_ok()
}

fn normalize_hostname_input(raw: &str) -> Option<String> {
    let mut value = raw.trim().to_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = value.strip_prefix(scheme) {
            value = rest.to_string();
        }
    }
    let authority = value
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .to_string();
    host_from_header_value(&authority)
}

fn is_valid_hostname(host: &str) -> bool {
    if host.len() > MAX_HOSTNAME_LEN || !host.contains('.') {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
    })
}

fn is_subdomain_of(host: &str, parent: &str) -> bool {
    host.len() > parent.len()
        && host.ends_with(parent)
        && host.as_bytes()[host.len() - parent.len() - 1] == b'.'
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
