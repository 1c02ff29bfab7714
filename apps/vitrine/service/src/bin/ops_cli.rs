use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use vitrine_control_service::config::Config;
use vitrine_control_service::ops_client::OpsClient;
use vitrine_control_service::verification::{DnsOverHttpsVerifier, DomainVerifier};

#[derive(Parser)]
#[command(name = "vitrine-control-ops")]
#[command(about = "Operator commands for tenant custom domains")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(name = "tenant:upsert")]
    TenantUpsert(TenantUpsertArgs),
    #[command(name = "domain:show")]
    DomainShow(TenantArgs),
    #[command(name = "domain:set")]
    DomainSet(DomainSetArgs),
    #[command(name = "domain:verify")]
    DomainVerify(TenantArgs),
    #[command(name = "domain:remove")]
    DomainRemove(TenantArgs),
    #[command(name = "domain:automate")]
    DomainAutomate(TenantArgs),
    #[command(name = "domain:automation-status")]
    DomainAutomationStatus(TenantArgs),
    #[command(name = "cache:flush")]
    CacheFlush(ApiArgs),
    #[command(name = "cache:invalidate")]
    CacheInvalidate(CacheInvalidateArgs),
    #[command(name = "domain:check")]
    DomainCheck(DomainCheckArgs),
}

#[derive(Args)]
struct ApiArgs {
    #[arg(long, default_value = "http://127.0.0.1:8790")]
    api_base: String,
    // falls back to VT_INTERNAL_API_TOKEN
    #[arg(long)]
    token: Option<String>,
    #[arg(long, default_value_t = 30)]
    timeout_seconds: u64,
}

#[derive(Args)]
struct TenantUpsertArgs {
    tenant_id: String,
    #[arg(long)]
    slug: String,
    #[arg(long)]
    name: Option<String>,
    #[command(flatten)]
    api: ApiArgs,
}

#[derive(Args)]
struct TenantArgs {
    tenant_id: String,
    #[command(flatten)]
    api: ApiArgs,
}

#[derive(Args)]
struct DomainSetArgs {
    tenant_id: String,
    hostname: String,
    #[command(flatten)]
    api: ApiArgs,
}

#[derive(Args)]
struct CacheInvalidateArgs {
    hostname: String,
    #[command(flatten)]
    api: ApiArgs,
}

#[derive(Args)]
struct DomainCheckArgs {
    hostname: String,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let output = match cli.command {
        Commands::TenantUpsert(args) => client(&args.api)?
            .upsert_tenant(&args.tenant_id, &args.slug, args.name.as_deref())
            .await
            .context("failed to upsert tenant")?,
        Commands::DomainShow(args) => client(&args.api)?
            .domain_status(&args.tenant_id)
            .await
            .with_context(|| format!("failed to load domain for tenant {}", args.tenant_id))?,
        Commands::DomainSet(args) => client(&args.api)?
            .set_domain(&args.tenant_id, &args.hostname)
            .await
            .with_context(|| format!("failed to set custom domain {}", args.hostname))?,
        Commands::DomainVerify(args) => client(&args.api)?
            .verify_domain(&args.tenant_id)
            .await
            .with_context(|| format!("failed to verify domain for tenant {}", args.tenant_id))?,
        Commands::DomainRemove(args) => client(&args.api)?
            .remove_domain(&args.tenant_id)
            .await
            .with_context(|| format!("failed to remove domain for tenant {}", args.tenant_id))?,
        Commands::DomainAutomate(args) => client(&args.api)?
            .setup_automation(&args.tenant_id)
            .await
            .with_context(|| format!("failed to automate DNS for tenant {}", args.tenant_id))?,
        Commands::DomainAutomationStatus(args) => client(&args.api)?
            .automation_status(&args.tenant_id)
            .await
            .with_context(|| {
                format!("failed to check DNS automation for tenant {}", args.tenant_id)
            })?,
        Commands::CacheFlush(args) => client(&args)?
            .flush_domain_cache()
            .await
            .context("failed to flush domain cache")?,
        Commands::CacheInvalidate(args) => client(&args.api)?
            .invalidate_domain_cache(&args.hostname)
            .await
            .with_context(|| format!("failed to invalidate cache for {}", args.hostname))?,
        Commands::DomainCheck(args) => run_domain_check(args).await?,
    };
    print_json(&output)
}

async fn run_domain_check(args: DomainCheckArgs) -> Result<Value> {
    let config = Config::from_env().context("failed to load configuration")?;
    let hostname = non_empty(&args.hostname).context("hostname cannot be empty")?;
    let verifier = DnsOverHttpsVerifier::from_config(&config);
    let outcome = verifier.verify(&hostname).await;
    Ok(serde_json::json!({
        "hostname": hostname,
        "resolver": config.doh_endpoint,
        "verification": outcome,
    }))
}

fn client(args: &ApiArgs) -> Result<OpsClient> {
    let token = args
        .token
        .as_deref()
        .and_then(non_empty)
        .or_else(|| {
            std::env::var("VT_INTERNAL_API_TOKEN")
                .ok()
                .and_then(|value| non_empty(&value))
        })
        .context("--token or VT_INTERNAL_API_TOKEN is required")?;
    OpsClient::new(
        &args.api_base,
        &token,
        Duration::from_secs(args.timeout_seconds.max(1)),
    )
    .context("failed to build operator client")
}

fn non_empty(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn print_json(value: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}
