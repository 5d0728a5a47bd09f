//! Production domain inference from config files.

use std::sync::LazyLock;

use regex::Regex;

static ENV_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:PUBLIC_)?(?:SITE_)?(?:APP_)?URL\s*=\s*["']?https?://([^"'\s]+)"#).unwrap()
});

/// Bare, lower-cased host of a URL-ish string: no scheme, path, port or `www.`.
pub fn extract_domain(input: &str) -> String {
    let rest = input
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = rest.split('/').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    host.to_lowercase()
}

/// Route entries in wrangler config are either a pattern string or a table
/// with a `pattern` key.
fn route_pattern(value: &toml::Value) -> Option<&str> {
    match value {
        toml::Value::String(s) => Some(s.as_str()),
        toml::Value::Table(t) => t.get("pattern").and_then(toml::Value::as_str),
        _ => None,
    }
}

fn wrangler_domain(wrangler: &toml::Table) -> Option<String> {
    let candidates: Vec<&str> = match (wrangler.get("route"), wrangler.get("routes")) {
        (Some(route), _) => route_pattern(route).into_iter().collect(),
        (None, Some(toml::Value::Array(routes))) => {
            routes.iter().filter_map(route_pattern).collect()
        }
        _ => Vec::new(),
    };

    candidates
        .into_iter()
        .map(|pattern| extract_domain(pattern.trim_start_matches("*.")))
        .find(|domain| domain.contains('.') && !domain.contains('*'))
}

/// Where the project is served in production, checked in order:
/// wrangler route(s), fly app name, then a `*URL=https://…` env line.
pub fn find_production_domain(
    wrangler: Option<&toml::Table>,
    fly: Option<&toml::Table>,
    env: Option<&str>,
) -> Option<String> {
    if let Some(domain) = wrangler.and_then(wrangler_domain) {
        return Some(domain);
    }

    if let Some(app) = fly.and_then(|f| f.get("app")).and_then(toml::Value::as_str) {
        return Some(format!("{app}.fly.dev"));
    }

    let env = env?;
    ENV_URL_REGEX
        .captures(env)
        .and_then(|c| c.get(1))
        .map(|m| extract_domain(m.as_str()))
        .filter(|d| !d.is_empty())
}
