//! Local project scanner: reads manifests and config files from a project
//! directory and runs them through the discovery classifiers.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;

use futures::future::join_all;

use crate::catalog::Catalog;
use crate::discovery::classify::{
    discover_from_env_vars, discover_from_package_json, merge_services, services_from_dns,
    PackageJson,
};
use crate::discovery::domain::find_production_domain;
use crate::discovery::rules::LOCKFILES;
use crate::discovery::SourceError;
use crate::models::infra::{
    DiscoveryError, DiscoveryMethod, DiscoveryResult, InfraService, ServiceCategory, TechStack,
};
use crate::services::dns_service::DohClient;

async fn read_optional(path: &Path) -> Result<Option<String>, SourceError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Package manager from lockfiles, npm when none is present.
pub async fn detect_package_manager(root: &Path) -> &'static str {
    for &(lockfile, manager) in LOCKFILES {
        if exists(&root.join(lockfile)).await {
            return manager;
        }
    }
    "npm"
}

/// Workflow file names under `.github/workflows`, `None` when the
/// directory is missing.
async fn workflow_files(root: &Path) -> Result<Option<Vec<String>>, SourceError> {
    let dir = root.join(".github").join("workflows");
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(Some(names))
}

/// Accumulates services and errors across sources.
struct Scan<'a> {
    project_id: &'a str,
    services: Vec<InfraService>,
    errors: Vec<DiscoveryError>,
}

impl Scan<'_> {
    fn merge(&mut self, discovered: Vec<InfraService>) {
        let existing = std::mem::take(&mut self.services);
        self.services = merge_services(existing, discovered);
    }

    fn fail(&mut self, source: &str, error: SourceError) {
        tracing::warn!(project_id = %self.project_id, source, "Discovery source failed: {error}");
        self.errors.push(error.into_discovery_error(source));
    }

    /// Read and parse a TOML config file. A parse failure is recorded and
    /// yields an empty table so the file's presence still counts.
    async fn toml_file(&mut self, root: &Path, name: &str) -> Option<toml::Table> {
        match read_optional(&root.join(name)).await {
            Ok(Some(content)) => match content.parse::<toml::Table>() {
                Ok(table) => Some(table),
                Err(e) => {
                    self.fail(name, e.into());
                    Some(toml::Table::new())
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.fail(name, e);
                None
            }
        }
    }

    fn config_file_service(
        &mut self,
        provider: &str,
        service_name: &str,
        config: serde_json::Value,
    ) {
        let service = InfraService::new(
            self.project_id,
            ServiceCategory::Hosting,
            provider,
            service_name,
            DiscoveryMethod::ConfigFile,
            config,
        );
        self.merge(vec![service]);
    }
}

/// Scan one project directory.
///
/// Sources are applied in a fixed order and merged first-writer-wins by
/// (provider, category): package.json, .env.example, config files, then a
/// DNS lookup of the production domain. A failing source is recorded in
/// `errors` and never stops the others.
pub async fn scan_project(dns: &DohClient, root: &Path, project_id: &str) -> DiscoveryResult {
    let start = Instant::now();
    let mut scan = Scan {
        project_id,
        services: Vec::new(),
        errors: Vec::new(),
    };
    let mut stack = TechStack {
        language: "javascript".to_string(),
        ..Default::default()
    };

    // 1. package.json
    match read_optional(&root.join("package.json")).await {
        Ok(Some(content)) => match serde_json::from_str::<PackageJson>(&content) {
            Ok(pkg) => {
                let (services, detected) = discover_from_package_json(&pkg, project_id);
                scan.merge(services);
                stack = detected;
            }
            Err(e) => scan.fail("package.json", e.into()),
        },
        Ok(None) => {}
        Err(e) => scan.fail("package.json", e),
    }

    // 2. .env.example
    let env_content = match read_optional(&root.join(".env.example")).await {
        Ok(content) => content,
        Err(e) => {
            scan.fail(".env.example", e);
            None
        }
    };
    if let Some(content) = &env_content {
        scan.merge(discover_from_env_vars(content, project_id));
    }

    // 3. Config files; presence implies the provider.
    let wrangler = scan.toml_file(root, "wrangler.toml").await;
    if let Some(table) = &wrangler {
        let config = serde_json::to_value(table).unwrap_or_default();
        scan.config_file_service("cloudflare", "Cloudflare Pages", config);
    }

    let fly = scan.toml_file(root, "fly.toml").await;
    if let Some(table) = &fly {
        let config = serde_json::to_value(table).unwrap_or_default();
        scan.config_file_service("flyio", "Fly.io", config);
    }

    match read_optional(&root.join("vercel.json")).await {
        Ok(Some(content)) => {
            let config = match serde_json::from_str::<serde_json::Value>(&content) {
                Ok(value) => value,
                Err(e) => {
                    scan.fail("vercel.json", e.into());
                    serde_json::json!({})
                }
            };
            scan.config_file_service("vercel", "Vercel", config);
        }
        Ok(None) => {}
        Err(e) => scan.fail("vercel.json", e),
    }

    match workflow_files(root).await {
        Ok(Some(workflows)) => scan.merge(vec![InfraService::new(
            project_id,
            ServiceCategory::Ci,
            "github",
            "GitHub Actions",
            DiscoveryMethod::ConfigFile,
            serde_json::json!({ "workflows": workflows }),
        )]),
        Ok(None) => {}
        Err(e) => scan.fail(".github/workflows", e),
    }

    stack.package_manager = Some(detect_package_manager(root).await.to_string());

    // 4. DNS of the production domain.
    let mut dns_info = None;
    let domain = find_production_domain(wrangler.as_ref(), fly.as_ref(), env_content.as_deref());
    if let Some(domain) = domain {
        match dns.lookup_domain(&domain, project_id).await {
            Ok(lookup) => {
                scan.merge(services_from_dns(project_id, &lookup.info));
                for message in lookup.errors {
                    scan.fail(
                        "dns_lookup",
                        SourceError::Dns {
                            domain: domain.clone(),
                            message,
                        },
                    );
                }
                dns_info = Some(lookup.info);
            }
            Err(e) => scan.fail("dns_lookup", e),
        }
    }

    let elapsed = start.elapsed().as_millis() as u64;
    crate::metrics::scan_duration(elapsed);
    tracing::info!(
        project_id,
        services = scan.services.len(),
        errors = scan.errors.len(),
        duration_ms = elapsed,
        "Project scanned"
    );

    DiscoveryResult {
        project_id: project_id.to_string(),
        timestamp: chrono::Utc::now(),
        services: scan.services,
        stack,
        dns: dns_info,
        errors: scan.errors,
    }
}

/// Scan every catalog project whose local path exists, in catalog order.
pub async fn scan_all(dns: &DohClient, catalog: &Catalog) -> Vec<DiscoveryResult> {
    let mut targets = Vec::new();
    for project in &catalog.projects {
        match &project.local_path {
            Some(path) if exists(path).await => targets.push((project.id.as_str(), path.as_path())),
            _ => tracing::debug!(project_id = %project.id, "No local checkout, skipping scan"),
        }
    }

    join_all(
        targets
            .into_iter()
            .map(|(id, path)| scan_project(dns, path, id)),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dns_service::tests::mount_answer;
    use wiremock::MockServer;

    fn write(root: &Path, name: &str, content: &str) {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn offline_dns() -> DohClient {
        DohClient::new(reqwest::Client::new(), "http://127.0.0.1:9/dns-query")
    }

    #[tokio::test]
    async fn scans_sources_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "package.json",
            &serde_json::json!({
                "dependencies": {
                    "@supabase/supabase-js": "^2.0.0",
                    "@sveltejs/kit": "^2.5.0",
                },
                "devDependencies": {
                    "@sveltejs/adapter-cloudflare": "^4.0.0",
                    "typescript": "^5.0.0",
                },
            })
            .to_string(),
        );
        write(root, ".env.example", "SUPABASE_URL=\nSENTRY_DSN=\n");
        write(root, "wrangler.toml", "name = \"web\"\ncompatibility_date = \"2024-01-01\"\n");
        write(root, "vercel.json", "{}");
        write(root, ".github/workflows/deploy.yml", "on: push\n");
        write(root, "pnpm-lock.yaml", "");

        let result = scan_project(&offline_dns(), root, "web").await;

        let ids: Vec<_> = result.services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "web-supabase-database",
                "web-cloudflare-hosting",
                "web-sentry-monitoring",
                "web-vercel-hosting",
                "web-github-ci",
            ]
        );
        // The adapter got there first; wrangler.toml does not replace it.
        assert_eq!(result.services[1].discovery_method, DiscoveryMethod::PackageJson);
        assert_eq!(result.services[4].config["workflows"][0], "deploy.yml");
        assert_eq!(result.stack.framework.as_deref(), Some("sveltekit"));
        assert_eq!(result.stack.language, "typescript");
        assert_eq!(result.stack.package_manager.as_deref(), Some("pnpm"));
        assert!(result.dns.is_none());
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn parse_failures_are_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "package.json", "{ not json");
        write(root, "wrangler.toml", "name = ");
        write(root, ".env.example", "STRIPE_KEY=\n");

        let result = scan_project(&offline_dns(), root, "shop").await;

        let sources: Vec<_> = result.errors.iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, ["package.json", "wrangler.toml"]);
        assert!(result.errors.iter().all(|e| e.recoverable));
        assert!(result.errors[0].message.starts_with("Failed to parse"));

        let ids: Vec<_> = result.services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["shop-stripe-external", "shop-cloudflare-hosting"]);
        assert_eq!(result.stack.package_manager.as_deref(), Some("npm"));
    }

    #[tokio::test]
    async fn fly_app_domain_is_looked_up() {
        let server = MockServer::start().await;
        mount_answer(&server, "NS", 2, &["ns1.cloudflare.com."]).await;
        mount_answer(&server, "CNAME", 5, &["api.fly.dev."]).await;
        for t in ["A", "AAAA", "MX", "TXT"] {
            mount_answer(&server, t, 1, &[]).await;
        }

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "fly.toml", "app = \"api\"\nprimary_region = \"syd\"\n");

        let dns = DohClient::new(reqwest::Client::new(), server.uri());
        let result = scan_project(&dns, dir.path(), "api").await;

        let ids: Vec<_> = result.services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["api-flyio-hosting", "api-cloudflare-dns"]);
        assert_eq!(result.services[0].config["app"], "api");
        assert_eq!(result.dns.as_ref().unwrap().domain, "api.fly.dev");
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn rescanning_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"dependencies":{"pg":"^8"}}"#);
        write(dir.path(), ".env.example", "RESEND_API_KEY=\n");

        let dns = offline_dns();
        let first = scan_project(&dns, dir.path(), "api").await;
        let second = scan_project(&dns, dir.path(), "api").await;
        assert_eq!(first.services, second.services);
        assert_eq!(first.stack, second.stack);
    }

    #[tokio::test]
    async fn scan_all_skips_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", "{}");
        let catalog = Catalog::from_toml_str(&format!(
            r#"
[[projects]]
id = "here"
display_name = "Here"
owner = "acme"
repo = "here"
local_path = "{}"

[[projects]]
id = "gone"
display_name = "Gone"
owner = "acme"
repo = "gone"
local_path = "/nonexistent/orchon-test"
"#,
            dir.path().display()
        ))
        .unwrap();

        let results = scan_all(&offline_dns(), &catalog).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].project_id, "here");
    }
}
