//! DNS-over-HTTPS lookups (JSON API) and provider inference.

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::discovery::classify::{
    detect_dns_provider, detect_email_from_mx, detect_hosting_from_dns,
};
use crate::discovery::SourceError;
use crate::models::infra::{DnsInfo, DnsRecord, DnsRecordType};

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status", default)]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    name: String,
    #[serde(rename = "type")]
    record_type: u16,
    #[serde(rename = "TTL")]
    ttl: u32,
    data: String,
}

/// A DNS snapshot plus the per-type queries that failed.
#[derive(Debug, Serialize)]
pub struct DnsLookup {
    pub info: DnsInfo,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct DohClient {
    http: reqwest::Client,
    url: String,
}

impl DohClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Records of one type. Answers of other types (e.g. the CNAME chain
    /// returned for an A query) are dropped.
    pub async fn query(
        &self,
        domain: &str,
        record_type: DnsRecordType,
    ) -> anyhow::Result<Vec<DnsRecord>> {
        let resp = self
            .http
            .get(&self.url)
            .query(&[("name", domain), ("type", record_type.as_str())])
            .header("Accept", "application/dns-json")
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("DNS query failed: {}", resp.status());
        }

        let body: DohResponse = resp.json().await?;
        tracing::debug!(
            domain,
            record_type = record_type.as_str(),
            status = body.status,
            "DoH answer"
        );

        Ok(body
            .answer
            .into_iter()
            .filter(|a| a.record_type == record_type.code())
            .filter_map(|a| {
                Some(DnsRecord {
                    record_type: DnsRecordType::from_code(a.record_type)?,
                    name: a.name.trim_end_matches('.').to_string(),
                    value: a.data.trim_end_matches('.').to_string(),
                    ttl: a.ttl,
                })
            })
            .collect())
    }

    /// Query every record type concurrently and infer providers.
    ///
    /// A failed type is reported in `errors` and contributes no records;
    /// the lookup only fails when every type failed.
    pub async fn lookup_domain(
        &self,
        domain: &str,
        project_id: &str,
    ) -> Result<DnsLookup, SourceError> {
        let results = join_all(
            DnsRecordType::QUERIED
                .iter()
                .map(|t| async move { (*t, self.query(domain, *t).await) }),
        )
        .await;

        let mut records = Vec::new();
        let mut errors = Vec::new();
        for (record_type, result) in results {
            match result {
                Ok(found) => records.extend(found),
                Err(e) => {
                    crate::metrics::upstream_error("doh");
                    errors.push(format!("{}: {e}", record_type.as_str()));
                }
            }
        }

        if errors.len() == DnsRecordType::QUERIED.len() {
            return Err(SourceError::Dns {
                domain: domain.to_string(),
                message: errors.join("; "),
            });
        }

        let nameservers: Vec<String> = records
            .iter()
            .filter(|r| r.record_type == DnsRecordType::Ns)
            .map(|r| r.value.clone())
            .collect();

        let info = DnsInfo {
            project_id: project_id.to_string(),
            domain: domain.to_string(),
            dns_provider: detect_dns_provider(&nameservers).map(str::to_string),
            hosting_provider: detect_hosting_from_dns(&records),
            email_provider: detect_email_from_mx(&records),
            nameservers,
            records,
            last_checked: chrono::Utc::now(),
        };

        tracing::info!(
            domain,
            dns_provider = info.dns_provider.as_deref().unwrap_or("unknown"),
            records = info.records.len(),
            failed_types = errors.len(),
            "DNS lookup complete"
        );

        Ok(DnsLookup { info, errors })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use wiremock::matchers::{header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Mount a DoH answer for one record type.
    pub(crate) async fn mount_answer(
        server: &MockServer,
        record_type: &str,
        code: u16,
        data: &[&str],
    ) {
        let answers: Vec<_> = data
            .iter()
            .map(|d| {
                serde_json::json!({ "name": "example.com.", "type": code, "TTL": 300, "data": d })
            })
            .collect();
        Mock::given(method("GET"))
            .and(query_param("type", record_type))
            .and(header("accept", "application/dns-json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "Status": 0, "Answer": answers })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn lookup_detects_providers() {
        let server = MockServer::start().await;
        mount_answer(&server, "NS", 2, &["ns1.cloudflare.com.", "ns2.cloudflare.com."]).await;
        mount_answer(&server, "MX", 15, &["1 aspmx.l.google.com."]).await;
        mount_answer(&server, "CNAME", 5, &["site.pages.dev."]).await;
        for t in ["A", "AAAA", "TXT"] {
            mount_answer(&server, t, 1, &[]).await;
        }

        let client = DohClient::new(reqwest::Client::new(), format!("{}/dns-query", server.uri()));
        let lookup = client.lookup_domain("example.com", "web").await.unwrap();

        assert!(lookup.errors.is_empty());
        assert_eq!(lookup.info.dns_provider.as_deref(), Some("Cloudflare"));
        assert_eq!(lookup.info.nameservers, ["ns1.cloudflare.com", "ns2.cloudflare.com"]);
        assert_eq!(lookup.info.hosting_provider.unwrap().provider, "cloudflare");
        assert_eq!(lookup.info.email_provider.unwrap().provider, "google");
        assert!(lookup.info.records.iter().all(|r| r.name == "example.com"));
    }

    #[tokio::test]
    async fn unknown_nameservers_and_partial_failure() {
        let server = MockServer::start().await;
        mount_answer(&server, "NS", 2, &["ns1.example.net."]).await;
        // Unmatched types get wiremock's 404.

        let client = DohClient::new(reqwest::Client::new(), server.uri());
        let lookup = client.lookup_domain("example.com", "web").await.unwrap();

        assert_eq!(lookup.info.dns_provider, None);
        assert_eq!(lookup.errors.len(), 5);
        assert!(lookup.errors.iter().any(|e| e.starts_with("MX:")));
    }

    #[tokio::test]
    async fn every_type_failing_is_an_error() {
        let server = MockServer::start().await;
        let client = DohClient::new(reqwest::Client::new(), server.uri());
        let err = client.lookup_domain("example.com", "web").await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to lookup example.com"));
    }
}
