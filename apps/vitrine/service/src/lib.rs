use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::{Path, Request, State};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, HOST, VARY};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod api_envelope;
pub mod config;
pub mod custom_domain;
pub mod dns_automation;
pub mod domain_cache;
pub mod domain_settings;
pub mod domain_store;
pub mod host_policy;
pub mod ops_client;
pub mod verification;
pub mod web_maud;

use crate::api_envelope::{
    ApiErrorCode, ApiErrorTuple, error_response, not_found_error, ok_data, unauthorized_error,
    validation_error,
};
use crate::config::Config;
use crate::custom_domain::{CustomDomainRouter, RoutingDecision};
use crate::dns_automation::{DnsAutomation, DnsAutomationError, dns_automation_from_config};
use crate::domain_cache::DomainResolutionCache;
use crate::domain_settings::{DomainSettingsError, DomainSettingsService};
use crate::domain_store::{DomainLookup, DomainStore, DomainStoreError, UpsertTenantInput};
use crate::host_policy::host_from_header_value;
use crate::verification::{DnsOverHttpsVerifier, DomainVerifier};
use crate::web_maud::SiteShellView;

const SERVICE_NAME: &str = "vitrine-control-service";
const HEADER_CUSTOM_DOMAIN: &str = "x-vitrine-custom-domain";
const HEADER_ORIGINAL_PATH: &str = "x-vitrine-original-path";
const HEADER_TENANT_SLUG: &str = "x-vitrine-tenant-slug";
const HEADER_X_FORWARDED_HOST: &str = "x-forwarded-host";
const CACHE_NO_STORE: &str = "no-store";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomDomainContext {
    pub hostname: String,
    pub original_path_and_query: String,
    pub tenant_slug: String,
}

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    domain_store: DomainStore,
    domain_cache: Arc<DomainResolutionCache>,
    domain_router: CustomDomainRouter,
    domain_settings: DomainSettingsService,
    started_at: SystemTime,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    dns_automation: &'static str,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    domain_store: &'static str,
    domain_cache_entries: usize,
    domain_cache_ttl_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct SetDomainRequestPayload {
    #[serde(default, alias = "customDomain", alias = "hostname")]
    custom_domain: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpsertTenantRequestPayload {
    slug: String,
    #[serde(default, alias = "displayName")]
    display_name: Option<String>,
}

pub fn build_router(config: Config) -> Router {
    let verifier: Arc<dyn DomainVerifier> = Arc::new(DnsOverHttpsVerifier::from_config(&config));
    let automation = dns_automation_from_config(&config);
    build_router_with_providers(config, verifier, automation)
}

pub fn build_router_with_providers(
    config: Config,
    verifier: Arc<dyn DomainVerifier>,
    automation: Arc<dyn DnsAutomation>,
) -> Router {
    let domain_cache = Arc::new(DomainResolutionCache::from_config(&config));
    let domain_store = DomainStore::from_config(&config, domain_cache.clone());
    let lookup: Arc<dyn DomainLookup> = Arc::new(domain_store.clone());
    let domain_router = CustomDomainRouter::from_config(&config, domain_cache.clone(), lookup);
    let domain_settings =
        DomainSettingsService::new(&config, domain_store.clone(), verifier, automation);
    let site_prefix = domain_router.site_path_prefix().to_string();

    let state = AppState {
        config: Arc::new(config),
        domain_store,
        domain_cache,
        domain_router,
        domain_settings,
        started_at: SystemTime::now(),
    };

    let api_router = Router::new()
        .route(
            "/api/tenants/:tenant_id/domain",
            get(show_tenant_domain)
                .put(set_tenant_domain)
                .delete(remove_tenant_domain),
        )
        .route("/api/tenants/:tenant_id/domain/verify", post(verify_tenant_domain))
        .route(
            "/api/tenants/:tenant_id/domain/automation",
            post(setup_tenant_domain_automation).get(check_tenant_domain_automation),
        )
        .route("/api/internal/tenants/:tenant_id", put(upsert_tenant))
        .route("/api/internal/domain-cache/flush", post(flush_domain_cache))
        .route(
            "/api/internal/domain-cache/:hostname",
            delete(invalidate_domain_cache_entry),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            internal_api_gate,
        ));

    let app_routes = Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(readiness))
        .merge(api_router)
        .route(&format!("{site_prefix}/:slug"), get(site_shell))
        .route(&format!("{site_prefix}/:slug/*path"), get(site_shell_path))
        .with_state(state.clone());

    // The gate rewrites the URI, so it must run outside the routing that
    // consumes it.
    Router::new()
        .fallback_service(app_routes)
        .layer(middleware::from_fn_with_state(state, custom_domain_gate))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http()),
        )
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = match state.started_at.elapsed() {
        Ok(duration) => duration.as_secs(),
        Err(_) => 0,
    };

    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        dns_automation: state.domain_settings.automation_name(),
    })
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let domain_store = if state.config.domain_store_path.is_some() {
        "file"
    } else {
        "memory"
    };

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            domain_store,
            domain_cache_entries: state.domain_cache.len().await,
            domain_cache_ttl_seconds: state.domain_cache.ttl().as_secs(),
        }),
    )
}

async fn custom_domain_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    strip_custom_domain_headers(request.headers_mut());

    let host = request_host(&request, state.config.trust_forwarded_host);
    let original_path_and_query = request
        .uri()
        .path_and_query()
        .map_or_else(|| "/".to_string(), |value| value.as_str().to_string());

    match state
        .domain_router
        .decide(host.as_deref(), &original_path_and_query)
        .await
    {
        RoutingDecision::PassThrough { .. } => next.run(request).await,
        RoutingDecision::Reject { status, body, .. } => (
            status,
            [
                (CONTENT_TYPE, HTML_CONTENT_TYPE),
                (CACHE_CONTROL, CACHE_NO_STORE),
            ],
            body,
        )
            .into_response(),
        RoutingDecision::Rewrite {
            path_and_query,
            tenant_slug,
            hostname,
        } => {
            let uri = match path_and_query.parse::<Uri>() {
                Ok(uri) => uri,
                Err(error) => {
                    tracing::warn!(
                        target: "vitrine.custom_domain",
                        hostname = %hostname,
                        rewritten = %path_and_query,
                        error = %error,
                        "rewritten custom domain path is not a valid uri",
                    );
                    return next.run(request).await;
                }
            };
            *request.uri_mut() = uri;

            let headers = request.headers_mut();
            insert_header(headers, HEADER_CUSTOM_DOMAIN, &hostname);
            insert_header(headers, HEADER_ORIGINAL_PATH, &original_path_and_query);
            insert_header(headers, HEADER_TENANT_SLUG, &tenant_slug);
            request.extensions_mut().insert(CustomDomainContext {
                hostname,
                original_path_and_query,
                tenant_slug,
            });

            let mut response = next.run(request).await;
            response
                .headers_mut()
                .append(VARY, HeaderValue::from_static("host"));
            response
        }
    }
}

async fn internal_api_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.config.internal_api_token.as_deref() else {
        return error_response(
            ApiErrorCode::ServiceUnavailable,
            "Internal API token is not configured.",
        )
        .into_response();
    };

    let Some(candidate) = bearer_token(request.headers()) else {
        return unauthorized_error("Unauthenticated.").into_response();
    };

    if Sha256::digest(candidate.as_bytes()) != Sha256::digest(expected.as_bytes()) {
        return unauthorized_error("Unauthenticated.").into_response();
    }

    next.run(request).await
}

async fn show_tenant_domain(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let view = state
        .domain_settings
        .status(&tenant_id)
        .await
        .map_err(map_domain_settings_error)?;
    Ok(ok_data(view))
}

async fn set_tenant_domain(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(payload): Json<SetDomainRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let Some(hostname) = payload
        .custom_domain
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Err(validation_error(
            "custom_domain",
            "The custom domain field is required.",
        ));
    };

    let view = state
        .domain_settings
        .set_domain(&tenant_id, hostname)
        .await
        .map_err(map_domain_settings_error)?;
    Ok(ok_data(view))
}

async fn remove_tenant_domain(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let view = state
        .domain_settings
        .remove_domain(&tenant_id)
        .await
        .map_err(map_domain_settings_error)?;
    Ok(ok_data(view))
}

async fn verify_tenant_domain(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let result = state
        .domain_settings
        .verify(&tenant_id)
        .await
        .map_err(map_domain_settings_error)?;
    Ok(ok_data(result))
}

async fn setup_tenant_domain_automation(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let result = state
        .domain_settings
        .setup_automatically(&tenant_id)
        .await
        .map_err(map_domain_settings_error)?;
    Ok(ok_data(result))
}

async fn check_tenant_domain_automation(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let view = state
        .domain_settings
        .check_automation_status(&tenant_id)
        .await
        .map_err(map_domain_settings_error)?;
    Ok(ok_data(view))
}

async fn upsert_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(payload): Json<UpsertTenantRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let tenant = state
        .domain_store
        .upsert_tenant(UpsertTenantInput {
            tenant_id,
            slug: payload.slug,
            display_name: payload.display_name,
        })
        .await
        .map_err(map_domain_store_error)?;
    Ok(ok_data(tenant))
}

async fn flush_domain_cache(State(state): State<AppState>) -> impl IntoResponse {
    let flushed_entries = state.domain_cache.len().await;
    state.domain_cache.invalidate_all().await;
    tracing::info!(
        target: "vitrine.domain_cache",
        flushed_entries,
        "custom domain cache flushed",
    );
    ok_data(serde_json::json!({ "flushed_entries": flushed_entries }))
}

async fn invalidate_domain_cache_entry(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> impl IntoResponse {
    let hostname = host_from_header_value(&hostname).unwrap_or_default();
    state.domain_cache.invalidate(&hostname).await;
    ok_data(serde_json::json!({ "hostname": hostname, "invalidated": true }))
}

async fn site_shell(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    context: Option<Extension<CustomDomainContext>>,
) -> Response {
    render_site(&state, &slug, context.map(|Extension(context)| context)).await
}

async fn site_shell_path(
    State(state): State<AppState>,
    Path((slug, _path)): Path<(String, String)>,
    context: Option<Extension<CustomDomainContext>>,
) -> Response {
    render_site(&state, &slug, context.map(|Extension(context)| context)).await
}

async fn render_site(state: &AppState, slug: &str, context: Option<CustomDomainContext>) -> Response {
    let Some(tenant) = state.domain_store.tenant_by_slug(slug).await else {
        return (
            StatusCode::NOT_FOUND,
            [
                (CONTENT_TYPE, HTML_CONTENT_TYPE),
                (CACHE_CONTROL, CACHE_NO_STORE),
            ],
            web_maud::render_site_not_found_page(),
        )
            .into_response();
    };

    let custom_domain = state
        .domain_store
        .domain_config(&tenant.id)
        .await
        .ok()
        .filter(|config| config.domain_verified)
        .and_then(|config| config.custom_domain);
    let path = match context.as_ref() {
        Some(context) => context.original_path_and_query.clone(),
        None => format!("{}/{}", state.domain_router.site_path_prefix(), tenant.slug),
    };

    let html = web_maud::render_site_shell(&SiteShellView {
        tenant_slug: tenant.slug,
        display_name: tenant.display_name,
        custom_domain,
        hostname: context.as_ref().map(|context| context.hostname.clone()),
        original_path: context.map(|context| context.original_path_and_query),
        path,
    });

    (
        StatusCode::OK,
        [(CONTENT_TYPE, HTML_CONTENT_TYPE)],
        html,
    )
        .into_response()
}

fn map_domain_store_error(error: DomainStoreError) -> ApiErrorTuple {
    match error {
        DomainStoreError::NotFound => not_found_error("Requested resource was not found."),
        DomainStoreError::Validation { field, message } => validation_error(field, &message),
        DomainStoreError::Conflict { message } => error_response(ApiErrorCode::Conflict, message),
        DomainStoreError::Persistence { message } => {
            error_response(ApiErrorCode::ServiceUnavailable, message)
        }
    }
}

fn map_domain_settings_error(error: DomainSettingsError) -> ApiErrorTuple {
    match error {
        DomainSettingsError::Store(error) => map_domain_store_error(error),
        DomainSettingsError::NoCustomDomain => error_response(
            ApiErrorCode::DomainNotConfigured,
            "No custom domain is configured for this tenant.",
        ),
        DomainSettingsError::Automation(DnsAutomationError::NotConfigured) => error_response(
            ApiErrorCode::ServiceUnavailable,
            "DNS automation is not configured.",
        ),
        DomainSettingsError::Automation(DnsAutomationError::ZoneNotFound { zone }) => {
            not_found_error(format!("No DNS zone found for {zone}."))
        }
        DomainSettingsError::Automation(DnsAutomationError::Provider { message }) => {
            error_response(ApiErrorCode::ProviderFailed, message)
        }
    }
}

fn request_host(request: &Request, trust_forwarded_host: bool) -> Option<String> {
    let headers = request.headers();
    if trust_forwarded_host {
        let forwarded = headers
            .get(HEADER_X_FORWARDED_HOST)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(host_from_header_value);
        if forwarded.is_some() {
            return forwarded;
        }
    }

    headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .and_then(host_from_header_value)
        .or_else(|| request.uri().host().and_then(host_from_header_value))
}

fn strip_custom_domain_headers(headers: &mut HeaderMap) {
    for name in [HEADER_CUSTOM_DOMAIN, HEADER_ORIGINAL_PATH, HEADER_TENANT_SLUG] {
        headers.remove(name);
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let authorization = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = authorization.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests;
