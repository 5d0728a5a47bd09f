//! npm registry staleness checks.

use futures::future::join_all;
use serde::{Deserialize, Serialize};

/// At most this many packages are checked per request.
pub const MAX_PACKAGES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageCheck {
    pub name: String,
    pub current: String,
    pub latest: String,
    pub is_outdated: bool,
    pub major_behind: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutdatedSummary {
    pub checked: usize,
    pub outdated: usize,
    pub major_outdated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutdatedReport {
    pub results: Vec<PackageCheck>,
    pub summary: OutdatedSummary,
}

#[derive(Debug, Deserialize)]
struct LatestManifest {
    version: Option<String>,
}

/// Leading numeric `major.minor.patch`; unparsable parts count as 0.
fn version_parts(version: &str) -> [i64; 3] {
    let mut parts = [0i64; 3];
    for (slot, piece) in parts.iter_mut().zip(version.split('.')) {
        let digits: String = piece.chars().take_while(|c| c.is_ascii_digit()).collect();
        *slot = digits.parse().unwrap_or(0);
    }
    parts
}

/// Compare a declared range against the latest release.
pub fn compare_versions(name: &str, declared: &str, latest: &str) -> PackageCheck {
    let current = declared.trim_start_matches(['^', '~']).to_string();
    let cur = version_parts(&current);
    let new = version_parts(latest);
    let major_behind = new[0] - cur[0];

    PackageCheck {
        name: name.to_string(),
        is_outdated: new > cur,
        major_behind,
        current,
        latest: latest.to_string(),
    }
}

#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Check one package. Registry failures report `unknown`/`error` as the
    /// latest version instead of failing.
    pub async fn check(&self, name: &str, declared: &str) -> PackageCheck {
        let unchecked = |latest: &str| PackageCheck {
            name: name.to_string(),
            current: declared.to_string(),
            latest: latest.to_string(),
            is_outdated: false,
            major_behind: 0,
        };

        let resp = match self
            .http
            .get(format!("{}/{}/latest", self.base_url, name))
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                crate::metrics::upstream_error("npm");
                tracing::warn!(package = name, "npm registry request failed: {e}");
                return unchecked("error");
            }
        };

        if !resp.status().is_success() {
            return unchecked("unknown");
        }

        match resp.json::<LatestManifest>().await {
            Ok(LatestManifest {
                version: Some(latest),
            }) => compare_versions(name, declared, &latest),
            Ok(_) => unchecked("unknown"),
            Err(_) => unchecked("error"),
        }
    }

    /// Check the first [`MAX_PACKAGES`] of `packages` concurrently.
    pub async fn check_outdated(&self, packages: &[(String, String)]) -> OutdatedReport {
        let results = join_all(
            packages
                .iter()
                .take(MAX_PACKAGES)
                .map(|(name, version)| self.check(name, version)),
        )
        .await;

        let summary = OutdatedSummary {
            checked: results.len(),
            outdated: results.iter().filter(|r| r.is_outdated).count(),
            major_outdated: results.iter().filter(|r| r.major_behind > 0).count(),
        };
        OutdatedReport { results, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn compares_semver_parts() {
        let c = compare_versions("svelte", "^4.2.1", "5.0.0");
        assert_eq!(c.current, "4.2.1");
        assert!(c.is_outdated);
        assert_eq!(c.major_behind, 1);

        let c = compare_versions("vite", "~5.1.0", "5.1.3");
        assert!(c.is_outdated);
        assert_eq!(c.major_behind, 0);

        let c = compare_versions("pg", "8.11.0", "8.11.0");
        assert!(!c.is_outdated);

        // Ahead of latest (prerelease pin) is not outdated.
        let c = compare_versions("x", "3.0.0-beta.1", "2.9.0");
        assert!(!c.is_outdated);
        assert_eq!(c.major_behind, -1);
    }

    #[tokio::test]
    async fn checks_first_ten_packages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/svelte/latest"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "version": "5.1.0" })),
            )
            .mount(&server)
            .await;

        let client = RegistryClient::new(reqwest::Client::new(), server.uri());
        let mut packages = vec![("svelte".to_string(), "^4.0.0".to_string())];
        for i in 0..12 {
            packages.push((format!("pkg{i}"), "1.0.0".to_string()));
        }

        let report = client.check_outdated(&packages).await;
        assert_eq!(report.summary.checked, MAX_PACKAGES);
        assert_eq!(report.summary.outdated, 1);
        assert_eq!(report.summary.major_outdated, 1);
        assert_eq!(report.results[0].latest, "5.1.0");
        assert_eq!(report.results[1].latest, "unknown");
        assert_eq!(report.results[1].current, "1.0.0");
    }
}
