//! Observatory configuration: loaded from environment variables.

use std::collections::HashMap;

use crate::catalog::Catalog;

#[derive(Clone, Debug)]
pub struct OrchonConfig {
    /// GitHub webhook secret for HMAC validation.
    pub github_webhook_secret: String,
    /// Per-owner GitHub tokens, keyed by owner login. Owners without a token are absent.
    pub github_tokens: HashMap<String, String>,
    /// GitHub REST API base URL.
    pub github_api_url: String,
    /// DNS-over-HTTPS JSON endpoint.
    pub doh_url: String,
    /// npm registry base URL for staleness checks.
    pub npm_registry_url: String,
    /// Maximum pooled database connections.
    pub db_max_connections: usize,
}

impl OrchonConfig {
    pub fn from_env(catalog: &Catalog) -> Self {
        Self::from_lookup(catalog, |key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(catalog: &Catalog, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let github_webhook_secret = lookup("ORCHON_WEBHOOK_SECRET").unwrap_or_default();
        let github_api_url = lookup("ORCHON_GITHUB_API_URL")
            .unwrap_or_else(|| "https://api.github.com".to_string());
        let doh_url = lookup("ORCHON_DOH_URL")
            .unwrap_or_else(|| "https://cloudflare-dns.com/dns-query".to_string());
        let npm_registry_url = lookup("ORCHON_NPM_REGISTRY_URL")
            .unwrap_or_else(|| "https://registry.npmjs.org".to_string());
        let db_max_connections = lookup("ORCHON_DB_MAX_CONNECTIONS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let mut github_tokens = HashMap::new();
        for owner in &catalog.owners {
            match lookup(&owner.token_env).filter(|t| !t.is_empty()) {
                Some(token) => {
                    github_tokens.insert(owner.login.clone(), token);
                }
                None => tracing::warn!(
                    owner = %owner.login,
                    env = %owner.token_env,
                    "GitHub token not set -- CI status for this owner will be unknown"
                ),
            }
        }

        if github_webhook_secret.is_empty() {
            tracing::warn!(
                "ORCHON_WEBHOOK_SECRET not set -- webhook signature validation disabled"
            );
        }

        Self {
            github_webhook_secret,
            github_tokens,
            github_api_url,
            doh_url,
            npm_registry_url,
            db_max_connections,
        }
    }

    pub fn github_token(&self, owner: &str) -> Option<&str> {
        self.github_tokens.get(owner).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_tokens_named_by_catalog() {
        let catalog = Catalog::from_toml_str(
            r#"
[[owners]]
login = "acme"
token_env = "PAT_ACME"

[[owners]]
login = "other"
token_env = "PAT_OTHER"
"#,
        )
        .unwrap();

        let vars: HashMap<&str, &str> = [
            ("PAT_ACME", "t0ken"),
            ("PAT_OTHER", ""),
            ("ORCHON_DB_MAX_CONNECTIONS", "3"),
        ]
        .into_iter()
        .collect();
        let config = OrchonConfig::from_lookup(&catalog, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.github_token("acme"), Some("t0ken"));
        assert_eq!(config.github_token("other"), None);
        assert_eq!(config.db_max_connections, 3);
        assert_eq!(config.github_api_url, "https://api.github.com");
    }
}
