use maud::{DOCTYPE, Markup, PreEscaped, html};
use serde::Serialize;

const SITE_BOOTSTRAP_GLOBAL: &str = "__VITRINE_SITE__";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteShellView {
    pub tenant_slug: String,
    #[serde(skip)]
    pub display_name: String,
    pub custom_domain: Option<String>,
    pub hostname: Option<String>,
    pub original_path: Option<String>,
    #[serde(skip)]
    pub path: String,
}

pub fn render_site_shell(view: &SiteShellView) -> String {
    let bootstrap = serde_json::to_string(view)
        .unwrap_or_else(|_| "{}".to_string())
        .replace("</", "<\\/");
    let canonical = view
        .custom_domain
        .as_ref()
        .map(|domain| format!("https://{domain}"));

    let markup = html! {
        (DOCTYPE)
        html lang="pt-BR" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                meta name="vitrine-tenant" content=(view.tenant_slug);
                @if let Some(canonical) = canonical.as_ref() {
                    link rel="canonical" href=(canonical);
                }
                title { (view.display_name) }
                style { (PreEscaped(shell_styles())) }
                script {
                    (PreEscaped(format!("window.{SITE_BOOTSTRAP_GLOBAL} = {bootstrap};")))
                }
                script src="/assets/site.js" defer {}
            }
            body {
                main id="vt-site" data-tenant=(view.tenant_slug) data-path=(view.path) {
                    h1 { (view.display_name) }
                }
            }
        }
    };
    markup.into_string()
}

pub fn render_domain_not_configured_page(hostname: &str) -> String {
    status_page(
        "Domain not configured",
        html! {
            h1 { "Domain not configured" }
            p {
                "The domain " strong { (hostname) } " is not connected to a site yet."
            }
            p class="hint" {
                "If you own this domain, finish the setup in your Vitrine dashboard. "
                "DNS changes can take up to 48 hours to propagate."
            }
        },
    )
}

pub fn render_site_not_found_page() -> String {
    status_page(
        "Site not found",
        html! {
            h1 { "Site not found" }
            p { "There is no site at this address." }
        },
    )
}

pub fn render_domain_unavailable_page(hostname: &str) -> String {
    status_page(
        "Temporarily unavailable",
        html! {
            h1 { "Temporarily unavailable" }
            p {
                "The site for " strong { (hostname) } " can't be loaded right now. "
                "Please try again in a few minutes."
            }
        },
    )
}

fn status_page(title: &str, content: Markup) -> String {
    let markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                meta name="robots" content="noindex";
                title { (title) " | Vitrine" }
                style { (PreEscaped(status_styles())) }
            }
            body {
                div class="container" {
                    div class="card" {
                        div class="brand" { "Vitrine" }
                        (content)
                    }
                }
            }
        }
    };
    markup.into_string()
}

fn status_styles() -> &'static str {
    r"
    * { box-sizing: border-box; }
    html, body { margin: 0; min-height: 100%; background: #f6f4f0; color: #1f2328;
      font-family: ui-sans-serif, system-ui, -apple-system, 'Segoe UI', Roboto, sans-serif; }
    .container { min-height: 100vh; display: grid; place-items: center; padding: 2rem; }
    .card { max-width: 32rem; background: #fff; border-radius: 12px; padding: 2.5rem;
      box-shadow: 0 10px 30px rgba(0, 0, 0, 0.08); }
    .brand { font-weight: 700; letter-spacing: 0.08em; text-transform: uppercase;
      color: #b35c1e; font-size: 0.8rem; margin-bottom: 1.25rem; }
    h1 { margin: 0 0 1rem; font-size: 1.5rem; }
    p { line-height: 1.55; margin: 0 0 0.75rem; }
    .hint { color: #57606a; font-size: 0.9rem; }
    "
}

fn shell_styles() -> &'static str {
    r"
    html, body { margin: 0; font-family: ui-sans-serif, system-ui, sans-serif; }
    #vt-site { min-height: 100vh; }
    "
}
