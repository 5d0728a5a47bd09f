//! Pure classifiers: package manifests, env files and DNS records to
//! services and providers.

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use super::rules::{
    ProviderRule, ServiceRule, BUILD_TOOL_PACKAGES, CSS_PACKAGES, DEPENDENCY_RULES, EMAIL_RULES,
    ENV_RULES, FRAMEWORK_PACKAGES, HOSTING_RULES, ICON_PACKAGES, NAMESERVER_RULES, TEST_PACKAGES,
};
use crate::models::infra::{
    DetectedProvider, DiscoveryMethod, DnsInfo, DnsRecord, DnsRecordType, InfraService,
    ServiceCategory, TechStack,
};

/// The parts of `package.json` discovery reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
}

impl PackageJson {
    /// Runtime and dev dependencies together; dev versions win on overlap.
    pub fn all_dependencies(&self) -> BTreeMap<&str, &str> {
        self.dependencies
            .iter()
            .chain(self.dev_dependencies.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

fn first_match<'a>(
    deps: &BTreeMap<&str, &'a str>,
    table: &[(&str, &'static str)],
) -> Option<(&'static str, &'a str)> {
    table
        .iter()
        .find_map(|(pkg, label)| deps.get(pkg).map(|version| (*label, *version)))
}

fn all_matches(deps: &BTreeMap<&str, &str>, table: &[(&str, &str)]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for (pkg, label) in table {
        if deps.contains_key(pkg) && !out.iter().any(|l| l == label) {
            out.push(label.to_string());
        }
    }
    out
}

/// Services and tech stack from a manifest's dependencies.
pub fn discover_from_package_json(
    pkg: &PackageJson,
    project_id: &str,
) -> (Vec<InfraService>, TechStack) {
    let deps = pkg.all_dependencies();

    let services = collect_services(DEPENDENCY_RULES, project_id, |rule| {
        deps.get(rule.pattern).map(|version| {
            (
                DiscoveryMethod::PackageJson,
                serde_json::json!({ "version": version }),
            )
        })
    });

    let framework = first_match(&deps, FRAMEWORK_PACKAGES);
    let stack = TechStack {
        language: if deps.contains_key("typescript") {
            "typescript".to_string()
        } else {
            "javascript".to_string()
        },
        framework: framework.map(|(f, _)| f.to_string()),
        framework_version: framework.map(|(_, v)| v.to_string()),
        css: all_matches(&deps, CSS_PACKAGES),
        testing: all_matches(&deps, TEST_PACKAGES),
        build_tool: first_match(&deps, BUILD_TOOL_PACKAGES).map(|(t, _)| t.to_string()),
        icons: first_match(&deps, ICON_PACKAGES).map(|(i, _)| i.to_string()),
        package_manager: None,
    };

    (services, stack)
}

/// Variable name of one env file line, upper-cased. Blank lines, comments
/// and lines without `=` carry none; a leading `export ` is dropped.
fn env_var_name(line: &str) -> Option<String> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (name, _) = line.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_uppercase())
}

/// Services hinted by variable names in an env file.
pub fn discover_from_env_vars(content: &str, project_id: &str) -> Vec<InfraService> {
    let names: Vec<String> = content.lines().filter_map(env_var_name).collect();

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for name in &names {
        for rule in ENV_RULES {
            if name.contains(rule.pattern) && seen.insert((rule.provider, rule.category)) {
                out.push(InfraService::new(
                    project_id,
                    rule.category,
                    rule.provider,
                    rule.service_name,
                    DiscoveryMethod::EnvVars,
                    serde_json::json!({ "envVar": name }),
                ));
            }
        }
    }
    out
}

fn collect_services(
    rules: &[ServiceRule],
    project_id: &str,
    mut matches: impl FnMut(&ServiceRule) -> Option<(DiscoveryMethod, serde_json::Value)>,
) -> Vec<InfraService> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for rule in rules {
        if seen.contains(&(rule.provider, rule.category)) {
            continue;
        }
        if let Some((method, config)) = matches(rule) {
            seen.insert((rule.provider, rule.category));
            out.push(InfraService::new(
                project_id,
                rule.category,
                rule.provider,
                rule.service_name,
                method,
                config,
            ));
        }
    }
    out
}

/// Append `discovered` to `existing`, skipping any (provider, category)
/// already present. Earlier entries always win.
pub fn merge_services(
    mut existing: Vec<InfraService>,
    discovered: Vec<InfraService>,
) -> Vec<InfraService> {
    let mut keys: HashSet<_> = existing.iter().map(InfraService::merge_key).collect();

    for service in discovered {
        if keys.insert(service.merge_key()) {
            existing.push(service);
        }
    }
    existing
}

/// DNS provider from the first nameserver that matches any rule.
pub fn detect_dns_provider(nameservers: &[String]) -> Option<&'static str> {
    nameservers.iter().find_map(|ns| {
        let ns = ns.to_lowercase();
        NAMESERVER_RULES
            .iter()
            .find(|(pattern, _)| ns.contains(pattern))
            .map(|(_, provider)| *provider)
    })
}

fn detect_provider<'a>(
    records: impl Iterator<Item = &'a DnsRecord>,
    rules: &[ProviderRule],
) -> Option<DetectedProvider> {
    for record in records {
        let value = record.value.to_lowercase();
        if let Some(rule) = rules
            .iter()
            .find(|r| r.patterns.iter().any(|p| value.contains(p)))
        {
            return Some(DetectedProvider {
                provider: rule.provider.to_string(),
                service_name: rule.service_name.to_string(),
            });
        }
    }
    None
}

/// Hosting provider from address and alias records. Other types are ignored.
pub fn detect_hosting_from_dns(records: &[DnsRecord]) -> Option<DetectedProvider> {
    detect_provider(
        records.iter().filter(|r| {
            matches!(
                r.record_type,
                DnsRecordType::A | DnsRecordType::Aaaa | DnsRecordType::Cname
            )
        }),
        HOSTING_RULES,
    )
}

pub fn detect_email_from_mx(records: &[DnsRecord]) -> Option<DetectedProvider> {
    detect_provider(
        records.iter().filter(|r| r.record_type == DnsRecordType::Mx),
        EMAIL_RULES,
    )
}

/// Provider slug for a display name: `AWS Route 53` → `aws-route-53`.
pub fn provider_slug(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Services implied by a DNS snapshot: DNS, hosting and email providers.
pub fn services_from_dns(project_id: &str, dns: &DnsInfo) -> Vec<InfraService> {
    let mut out = Vec::new();

    if let Some(provider) = &dns.dns_provider {
        out.push(InfraService::new(
            project_id,
            ServiceCategory::Dns,
            &provider_slug(provider),
            provider,
            DiscoveryMethod::DnsLookup,
            serde_json::json!({ "domain": dns.domain, "nameservers": dns.nameservers }),
        ));
    }
    if let Some(hosting) = &dns.hosting_provider {
        out.push(InfraService::new(
            project_id,
            ServiceCategory::Hosting,
            &hosting.provider,
            &hosting.service_name,
            DiscoveryMethod::DnsLookup,
            serde_json::json!({ "domain": dns.domain }),
        ));
    }
    if let Some(email) = &dns.email_provider {
        out.push(InfraService::new(
            project_id,
            ServiceCategory::Email,
            &email.provider,
            &email.service_name,
            DiscoveryMethod::DnsLookup,
            serde_json::json!({ "domain": dns.domain }),
        ));
    }
    out
}
