use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Query;
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, HOST, VARY};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::net::TcpListener;
use tower::ServiceExt;

use crate::config::Config;
use crate::dns_automation::{
    AutomationSetup, AutomationStatus, DnsAutomation, DnsAutomationError,
    UnconfiguredDnsAutomation,
};
use crate::domain_store::AutomationState;
use crate::ops_client::OpsClient;
use crate::verification::DnsOverHttpsVerifier;
use crate::{build_router, build_router_with_providers, strip_custom_domain_headers};

const INTERNAL_TOKEN: &str = "internal-test-token";
const CUSTOM_HOST: &str = "imoveis.example.com";

async fn doh_answer(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let name = params.get("name").cloned().unwrap_or_default();
    if matches!(name.as_str(), "imoveis.example.com" | "novo.example.com") {
        Json(json!({
            "Status": 0,
            "Answer": [{"name": format!("{name}."), "type": 1, "TTL": 300, "data": "203.0.113.10"}]
        }))
    } else {
        Json(json!({"Status": 3}))
    }
}

async fn spawn_doh_resolver() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new().route("/resolve", get(doh_answer));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });
    Ok(addr)
}

async fn test_config() -> Result<Config> {
    let addr = spawn_doh_resolver().await?;
    let mut config = Config::for_tests();
    config.doh_endpoint = format!("http://{addr}/resolve");
    Ok(config)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    host: Option<&str>,
    body: Option<Value>,
) -> Result<Response> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(host) = host {
        builder = builder.header(HOST, host);
    }
    if uri.starts_with("/api/") {
        builder = builder.header(AUTHORIZATION, format!("Bearer {INTERNAL_TOKEN}"));
    }
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };
    Ok(app.clone().oneshot(request).await?)
}

async fn read_json(response: Response) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    let value = serde_json::from_slice::<Value>(&bytes)?;
    Ok(value)
}

async fn read_text(response: Response) -> Result<String> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(String::from_utf8(bytes.to_vec())?)
}

async fn register_tenant(app: &Router, tenant_id: &str, slug: &str) -> Result<()> {
    let response = send(
        app,
        Method::PUT,
        &format!("/api/internal/tenants/{tenant_id}"),
        Some("vitrine.app"),
        Some(json!({"slug": slug, "display_name": format!("{slug} imóveis")})),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

async fn claim_domain(app: &Router, tenant_id: &str, hostname: &str) -> Result<Response> {
    send(
        app,
        Method::PUT,
        &format!("/api/tenants/{tenant_id}/domain"),
        Some("vitrine.app"),
        Some(json!({"custom_domain": hostname})),
    )
    .await
}

async fn verify_domain(app: &Router, tenant_id: &str) -> Result<Value> {
    let response = send(
        app,
        Method::POST,
        &format!("/api/tenants/{tenant_id}/domain/verify"),
        Some("vitrine.app"),
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await
}

async fn verified_tenant_app() -> Result<Router> {
    let app = build_router(test_config().await?);
    register_tenant(&app, "tn_acme", "acme").await?;
    assert_eq!(
        claim_domain(&app, "tn_acme", CUSTOM_HOST).await?.status(),
        StatusCode::OK
    );
    let verified = verify_domain(&app, "tn_acme").await?;
    assert_eq!(verified["data"]["verification"]["outcome"], "verified");
    Ok(app)
}

#[tokio::test]
async fn healthz_and_readyz_report_service_state() -> Result<()> {
    let app = build_router(Config::for_tests());

    let health = send(&app, Method::GET, "/healthz", Some("localhost"), None).await?;
    assert_eq!(health.status(), StatusCode::OK);
    assert!(health.headers().contains_key("x-request-id"));
    let body = read_json(health).await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "vitrine-control-service");
    assert_eq!(body["dns_automation"], "unconfigured");

    let ready = send(&app, Method::GET, "/readyz", Some("localhost"), None).await?;
    assert_eq!(ready.status(), StatusCode::OK);
    let body = read_json(ready).await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["domain_store"], "memory");
    assert_eq!(body["domain_cache_ttl_seconds"], 300);
    Ok(())
}

#[tokio::test]
async fn internal_api_requires_bearer_token() -> Result<()> {
    let app = build_router(Config::for_tests());

    let missing = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/tenants/tn_acme/domain")
                .header(HOST, "vitrine.app")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(missing).await?;
    assert_eq!(body["error"]["code"], "unauthorized");

    let wrong = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/tenants/tn_acme/domain")
                .header(HOST, "vitrine.app")
                .header(AUTHORIZATION, "Bearer not-the-token")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let mut config = Config::for_tests();
    config.internal_api_token = None;
    let unconfigured = build_router(config);
    let response = send(
        &unconfigured,
        Method::GET,
        "/api/tenants/tn_acme/domain",
        Some("vitrine.app"),
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn unverified_domain_is_inert_until_verified() -> Result<()> {
    let app = build_router(test_config().await?);
    register_tenant(&app, "tn_acme", "acme").await?;

    let claimed = claim_domain(&app, "tn_acme", "https://Imoveis.Example.com/").await?;
    assert_eq!(claimed.status(), StatusCode::OK);
    let body = read_json(claimed).await?;
    assert_eq!(body["data"]["custom_domain"], CUSTOM_HOST);
    assert_eq!(body["data"]["domain_verified"], false);
    assert_eq!(body["data"]["dns_instructions"][0]["record_type"], "CNAME");

    let before = send(&app, Method::GET, "/", Some(CUSTOM_HOST), None).await?;
    assert_eq!(before.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        before.headers().get(CACHE_CONTROL),
        Some(&HeaderValue::from_static("no-store"))
    );
    let page = read_text(before).await?;
    assert!(page.contains("Domain not configured"));
    assert!(page.contains(CUSTOM_HOST));
    assert!(!page.contains("tn_acme"));

    let verified = verify_domain(&app, "tn_acme").await?;
    assert_eq!(verified["data"]["status"]["domain_verified"], true);
    assert_eq!(
        verified["data"]["status"]["live_url"],
        "https://imoveis.example.com"
    );

    let after = send(&app, Method::GET, "/", Some(CUSTOM_HOST), None).await?;
    assert_eq!(after.status(), StatusCode::OK);
    let html = read_text(after).await?;
    assert!(html.contains(r#""tenantSlug":"acme""#));
    assert!(html.contains(r#""hostname":"imoveis.example.com""#));
    assert!(html.contains(r#""originalPath":"/""#));
    Ok(())
}

#[tokio::test]
async fn custom_domain_requests_rewrite_to_tenant_site() -> Result<()> {
    let app = verified_tenant_app().await?;

    let response = send(
        &app,
        Method::GET,
        "/imoveis/123?quartos=3",
        Some("imoveis.example.com:443"),
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(VARY),
        Some(&HeaderValue::from_static("host"))
    );
    let html = read_text(response).await?;
    assert!(html.contains(r#""originalPath":"/imoveis/123?quartos=3""#));
    assert!(html.contains(r#""customDomain":"imoveis.example.com""#));
    assert!(html.contains(r#"data-path="/imoveis/123?quartos=3""#));
    Ok(())
}

#[tokio::test]
async fn repeated_requests_resolve_identically() -> Result<()> {
    let app = verified_tenant_app().await?;

    let cold = read_text(send(&app, Method::GET, "/contato", Some(CUSTOM_HOST), None).await?).await?;
    let warm = read_text(send(&app, Method::GET, "/contato", Some(CUSTOM_HOST), None).await?).await?;
    assert_eq!(cold, warm);

    let ready = read_json(send(&app, Method::GET, "/readyz", Some("localhost"), None).await?).await?;
    assert_eq!(ready["domain_cache_entries"], 1);
    Ok(())
}

#[tokio::test]
async fn platform_hosts_are_never_rewritten() -> Result<()> {
    let app = verified_tenant_app().await?;

    for host in ["vitrine.app", "acme.vitrine.app", "localhost:8790", "127.0.0.1"] {
        let response = send(&app, Method::GET, "/", Some(host), None).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "host {host}");
        let body = read_text(response).await?;
        assert!(!body.contains("Domain not configured"), "host {host}");
    }

    let canonical = send(&app, Method::GET, "/site/acme", Some("vitrine.app"), None).await?;
    assert_eq!(canonical.status(), StatusCode::OK);
    let html = read_text(canonical).await?;
    assert!(html.contains(r#""hostname":null"#));
    assert!(html.contains(r#""customDomain":"imoveis.example.com""#));
    Ok(())
}

#[tokio::test]
async fn canonical_paths_on_custom_domain_are_not_rewritten_twice() -> Result<()> {
    let app = verified_tenant_app().await?;

    let response = send(&app, Method::GET, "/site/acme/contato", Some(CUSTOM_HOST), None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = read_text(response).await?;
    assert!(html.contains(r#""originalPath":null"#));
    assert!(html.contains(r#"data-path="/site/acme""#));
    Ok(())
}

#[tokio::test]
async fn api_and_asset_paths_bypass_custom_domain_routing() -> Result<()> {
    let app = verified_tenant_app().await?;

    let api = send(&app, Method::GET, "/api/tenants/tn_acme/domain", Some(CUSTOM_HOST), None).await?;
    assert_eq!(api.status(), StatusCode::OK);

    let asset = send(&app, Method::GET, "/assets/site.js", Some(CUSTOM_HOST), None).await?;
    assert_eq!(asset.status(), StatusCode::NOT_FOUND);
    let body = read_text(asset).await?;
    assert!(!body.contains("Domain not configured"));
    Ok(())
}

#[tokio::test]
async fn removing_or_replacing_a_domain_stops_routing_immediately() -> Result<()> {
    let app = verified_tenant_app().await?;
    assert_eq!(
        send(&app, Method::GET, "/", Some(CUSTOM_HOST), None).await?.status(),
        StatusCode::OK
    );

    let replaced = claim_domain(&app, "tn_acme", "novo.example.com").await?;
    assert_eq!(replaced.status(), StatusCode::OK);
    assert_eq!(
        send(&app, Method::GET, "/", Some(CUSTOM_HOST), None).await?.status(),
        StatusCode::NOT_FOUND
    );
    verify_domain(&app, "tn_acme").await?;
    assert_eq!(
        send(&app, Method::GET, "/", Some("novo.example.com"), None).await?.status(),
        StatusCode::OK
    );

    let removed = send(&app, Method::DELETE, "/api/tenants/tn_acme/domain", Some("vitrine.app"), None).await?;
    assert_eq!(removed.status(), StatusCode::OK);
    let body = read_json(removed).await?;
    assert_eq!(body["data"]["custom_domain"], Value::Null);
    assert_eq!(body["data"]["automation_state"], "none");

    let after = send(&app, Method::GET, "/", Some("novo.example.com"), None).await?;
    assert_eq!(after.status(), StatusCode::NOT_FOUND);
    assert!(read_text(after).await?.contains("Domain not configured"));
    Ok(())
}

#[tokio::test]
async fn colliding_claim_is_rejected_without_side_effects() -> Result<()> {
    let app = verified_tenant_app().await?;
    register_tenant(&app, "tn_beta", "beta").await?;
    assert_eq!(
        claim_domain(&app, "tn_beta", "beta.example.com").await?.status(),
        StatusCode::OK
    );

    let conflict = claim_domain(&app, "tn_beta", "IMOVEIS.example.com").await?;
    assert_eq!(conflict.status(), StatusCode::CONFLICT);
    let body = read_json(conflict).await?;
    assert_eq!(body["error"]["code"], "conflict");

    let beta = read_json(
        send(&app, Method::GET, "/api/tenants/tn_beta/domain", Some("vitrine.app"), None).await?,
    )
    .await?;
    assert_eq!(beta["data"]["custom_domain"], "beta.example.com");

    let still_acme = read_text(send(&app, Method::GET, "/", Some(CUSTOM_HOST), None).await?).await?;
    assert!(still_acme.contains(r#""tenantSlug":"acme""#));
    Ok(())
}

#[tokio::test]
async fn reserved_and_missing_hostnames_are_validation_errors() -> Result<()> {
    let app = build_router(test_config().await?);
    register_tenant(&app, "tn_acme", "acme").await?;

    let reserved = claim_domain(&app, "tn_acme", "acme.vitrine.app").await?;
    assert_eq!(reserved.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(reserved).await?;
    assert_eq!(body["error"]["code"], "invalid_request");
    assert!(body["errors"]["custom_domain"][0].is_string());

    let missing = send(
        &app,
        Method::PUT,
        "/api/tenants/tn_acme/domain",
        Some("vitrine.app"),
        Some(json!({})),
    )
    .await?;
    assert_eq!(missing.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let unknown = claim_domain(&app, "tn_missing", CUSTOM_HOST).await?;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn verify_reports_pending_without_changing_state() -> Result<()> {
    let app = build_router(test_config().await?);
    register_tenant(&app, "tn_acme", "acme").await?;
    claim_domain(&app, "tn_acme", "ainda-nao.example.com").await?;

    let result = verify_domain(&app, "tn_acme").await?;
    assert_eq!(result["data"]["verification"]["outcome"], "pending");
    assert_eq!(result["data"]["status"]["domain_verified"], false);

    let no_domain = build_router(test_config().await?);
    register_tenant(&no_domain, "tn_acme", "acme").await?;
    let response = send(
        &no_domain,
        Method::POST,
        "/api/tenants/tn_acme/domain/verify",
        Some("vitrine.app"),
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await?;
    assert_eq!(body["error"]["code"], "domain_not_configured");
    Ok(())
}

struct ActiveAutomation;

#[async_trait]
impl DnsAutomation for ActiveAutomation {
    fn is_configured(&self) -> bool {
        true
    }

    async fn setup_domain(&self, hostname: &str) -> Result<AutomationSetup, DnsAutomationError> {
        Ok(AutomationSetup {
            automated: true,
            zone: hostname.to_string(),
            name_servers: vec!["ana.ns.cloudflare.com".to_string()],
            state: AutomationState::NameserversPending,
        })
    }

    async fn check_status(&self, _hostname: &str) -> Result<AutomationStatus, DnsAutomationError> {
        Ok(AutomationStatus {
            state: AutomationState::Active,
            ssl_state: Some("active".to_string()),
        })
    }

    async fn teardown(
        &self,
        _hostname: &str,
        _remove_zone: bool,
    ) -> Result<(), DnsAutomationError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "active-stub"
    }
}

#[tokio::test]
async fn automated_setup_activates_routing_once_zone_is_active() -> Result<()> {
    let config = test_config().await?;
    let verifier = Arc::new(DnsOverHttpsVerifier::from_config(&config));
    let app = build_router_with_providers(config, verifier, Arc::new(ActiveAutomation));
    register_tenant(&app, "tn_acme", "acme").await?;
    claim_domain(&app, "tn_acme", "www.acme-imoveis.com.br").await?;

    let setup = send(
        &app,
        Method::POST,
        "/api/tenants/tn_acme/domain/automation",
        Some("vitrine.app"),
        None,
    )
    .await?;
    assert_eq!(setup.status(), StatusCode::OK);
    let body = read_json(setup).await?;
    assert_eq!(body["data"]["automated"], true);
    assert_eq!(body["data"]["name_servers"][0], "ana.ns.cloudflare.com");
    assert_eq!(body["data"]["status"]["automation_state"], "nameservers_pending");

    assert_eq!(
        send(&app, Method::GET, "/", Some("www.acme-imoveis.com.br"), None)
            .await?
            .status(),
        StatusCode::NOT_FOUND
    );

    let status = send(
        &app,
        Method::GET,
        "/api/tenants/tn_acme/domain/automation",
        Some("vitrine.app"),
        None,
    )
    .await?;
    let body = read_json(status).await?;
    assert_eq!(body["data"]["automation_state"], "active");
    assert_eq!(body["data"]["automation_ssl_state"], "active");
    assert_eq!(body["data"]["domain_verified"], true);

    assert_eq!(
        send(&app, Method::GET, "/", Some("www.acme-imoveis.com.br"), None)
            .await?
            .status(),
        StatusCode::OK
    );
    Ok(())
}

#[tokio::test]
async fn unconfigured_automation_returns_manual_instructions() -> Result<()> {
    let config = test_config().await?;
    let verifier = Arc::new(DnsOverHttpsVerifier::from_config(&config));
    let app = build_router_with_providers(config, verifier, Arc::new(UnconfiguredDnsAutomation));
    register_tenant(&app, "tn_acme", "acme").await?;
    claim_domain(&app, "tn_acme", "acme-imoveis.com").await?;

    let response = send(
        &app,
        Method::POST,
        "/api/tenants/tn_acme/domain/automation",
        Some("vitrine.app"),
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["data"]["automated"], false);
    assert_eq!(body["data"]["status"]["automation_available"], false);
    assert_eq!(body["data"]["status"]["dns_instructions"][0]["record_type"], "A");
    assert_eq!(
        body["data"]["status"]["dns_instructions"][0]["value"],
        "203.0.113.10"
    );
    Ok(())
}

#[tokio::test]
async fn cache_admin_routes_flush_entries() -> Result<()> {
    let app = verified_tenant_app().await?;
    send(&app, Method::GET, "/", Some(CUSTOM_HOST), None).await?;

    let invalidated = send(
        &app,
        Method::DELETE,
        "/api/internal/domain-cache/Imoveis.Example.com",
        Some("vitrine.app"),
        None,
    )
    .await?;
    assert_eq!(invalidated.status(), StatusCode::OK);
    let body = read_json(invalidated).await?;
    assert_eq!(body["data"]["hostname"], CUSTOM_HOST);

    send(&app, Method::GET, "/", Some(CUSTOM_HOST), None).await?;
    let flushed = read_json(
        send(
            &app,
            Method::POST,
            "/api/internal/domain-cache/flush",
            Some("vitrine.app"),
            None,
        )
        .await?,
    )
    .await?;
    assert_eq!(flushed["data"]["flushed_entries"], 1);

    let ready = read_json(send(&app, Method::GET, "/readyz", Some("localhost"), None).await?).await?;
    assert_eq!(ready["domain_cache_entries"], 0);

    let still_routes = send(&app, Method::GET, "/", Some(CUSTOM_HOST), None).await?;
    assert_eq!(still_routes.status(), StatusCode::OK);
    Ok(())
}

async fn forwarded_request(app: &Router) -> Result<Response> {
    let request = Request::builder()
        .uri("/")
        .header(HOST, "edge.vitrine.app")
        .header("x-forwarded-host", CUSTOM_HOST)
        .body(Body::empty())?;
    Ok(app.clone().oneshot(request).await?)
}

#[tokio::test]
async fn forwarded_host_is_only_honored_when_trusted() -> Result<()> {
    let mut config = test_config().await?;
    config.trust_forwarded_host = false;
    let app = build_router(config);
    register_tenant(&app, "tn_acme", "acme").await?;
    claim_domain(&app, "tn_acme", CUSTOM_HOST).await?;
    verify_domain(&app, "tn_acme").await?;

    let untrusted = forwarded_request(&app).await?;
    assert_eq!(untrusted.status(), StatusCode::NOT_FOUND);

    let mut trusted_config = test_config().await?;
    trusted_config.trust_forwarded_host = true;
    let trusted_app = build_router(trusted_config);
    register_tenant(&trusted_app, "tn_acme", "acme").await?;
    claim_domain(&trusted_app, "tn_acme", CUSTOM_HOST).await?;
    verify_domain(&trusted_app, "tn_acme").await?;

    let trusted = forwarded_request(&trusted_app).await?;
    assert_eq!(trusted.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn domain_state_survives_restart_with_file_store() -> Result<()> {
    let dir = tempdir()?;
    let mut config = test_config().await?;
    config.domain_store_path = Some(dir.path().join("domains.json"));

    let app = build_router(config.clone());
    register_tenant(&app, "tn_acme", "acme").await?;
    claim_domain(&app, "tn_acme", CUSTOM_HOST).await?;
    verify_domain(&app, "tn_acme").await?;
    drop(app);

    let restarted = build_router(config);
    let response = send(&restarted, Method::GET, "/", Some(CUSTOM_HOST), None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let ready = read_json(send(&restarted, Method::GET, "/readyz", Some("localhost"), None).await?).await?;
    assert_eq!(ready["domain_store"], "file");
    Ok(())
}

async fn serve_live(app: Router) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });
    Ok(addr)
}

#[tokio::test]
async fn operator_client_changes_apply_to_running_service_and_persist() -> Result<()> {
    let dir = tempdir()?;
    let mut config = test_config().await?;
    config.domain_store_path = Some(dir.path().join("domains.json"));

    let app = build_router(config.clone());
    let addr = serve_live(app.clone()).await?;
    let ops = OpsClient::new(&format!("http://{addr}"), INTERNAL_TOKEN, Duration::from_secs(5))?;

    ops.upsert_tenant("tn_a", "alpha", None).await?;
    ops.upsert_tenant("tn_b", "beta", Some("Beta Imóveis")).await?;
    ops.set_domain("tn_a", CUSTOM_HOST).await?;
    let verified = ops.verify_domain("tn_a").await?;
    assert_eq!(verified["verification"]["outcome"], "verified");
    assert_eq!(
        send(&app, Method::GET, "/", Some(CUSTOM_HOST), None).await?.status(),
        StatusCode::OK
    );

    let removed = ops.remove_domain("tn_a").await?;
    assert_eq!(removed["custom_domain"], Value::Null);
    assert_eq!(
        send(&app, Method::GET, "/", Some(CUSTOM_HOST), None).await?.status(),
        StatusCode::NOT_FOUND
    );

    // a later write by the service must not bring the removed domain back
    ops.set_domain("tn_b", "novo.example.com").await?;
    drop(app);

    let restarted = build_router(config);
    assert_eq!(
        send(&restarted, Method::GET, "/", Some(CUSTOM_HOST), None).await?.status(),
        StatusCode::NOT_FOUND
    );
    let status = read_json(
        send(&restarted, Method::GET, "/api/tenants/tn_a/domain", Some("vitrine.app"), None).await?,
    )
    .await?;
    assert_eq!(status["data"]["custom_domain"], Value::Null);
    let other = read_json(
        send(&restarted, Method::GET, "/api/tenants/tn_b/domain", Some("vitrine.app"), None).await?,
    )
    .await?;
    assert_eq!(other["data"]["custom_domain"], "novo.example.com");

    let rejected = OpsClient::new(&format!("http://{addr}"), "wrong-token", Duration::from_secs(5))?
        .domain_status("tn_a")
        .await;
    assert!(matches!(
        rejected,
        Err(crate::ops_client::OpsClientError::Status { status: 401, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn unknown_site_slug_is_not_found() -> Result<()> {
    let app = build_router(Config::for_tests());
    let response = send(&app, Method::GET, "/site/ninguem", Some("vitrine.app"), None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(read_text(response).await?.contains("Site not found"));
    Ok(())
}

#[test]
fn inbound_routing_headers_are_stripped() {
    let mut headers = HeaderMap::new();
    headers.insert("x-vitrine-custom-domain", HeaderValue::from_static("spoofed.example.com"));
    headers.insert("x-vitrine-original-path", HeaderValue::from_static("/admin"));
    headers.insert("x-vitrine-tenant-slug", HeaderValue::from_static("other"));
    headers.insert("x-request-id", HeaderValue::from_static("req-1"));

    strip_custom_domain_headers(&mut headers);
    assert_eq!(headers.len(), 1);
    assert!(headers.contains_key("x-request-id"));
}
