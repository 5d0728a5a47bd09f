//! Discovered infrastructure: services, DNS snapshots, tech stack.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a service does for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Hosting,
    Database,
    Auth,
    Storage,
    Monitoring,
    Analytics,
    Email,
    Dns,
    Ci,
    External,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hosting => "hosting",
            Self::Database => "database",
            Self::Auth => "auth",
            Self::Storage => "storage",
            Self::Monitoring => "monitoring",
            Self::Analytics => "analytics",
            Self::Email => "email",
            Self::Dns => "dns",
            Self::Ci => "ci",
            Self::External => "external",
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which heuristic produced a service entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    PackageJson,
    EnvVars,
    ConfigFile,
    DnsLookup,
}

/// Stable service id: `<project>-<provider>-<category>`.
pub fn service_id(project_id: &str, provider: &str, category: ServiceCategory) -> String {
    format!("{project_id}-{provider}-{category}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraService {
    pub id: String,
    pub project_id: String,
    pub category: ServiceCategory,
    pub provider: String,
    pub service_name: String,
    pub discovery_method: DiscoveryMethod,
    pub config: serde_json::Value,
}

impl InfraService {
    pub fn new(
        project_id: &str,
        category: ServiceCategory,
        provider: &str,
        service_name: &str,
        discovery_method: DiscoveryMethod,
        config: serde_json::Value,
    ) -> Self {
        Self {
            id: service_id(project_id, provider, category),
            project_id: project_id.to_string(),
            category,
            provider: provider.to_string(),
            service_name: service_name.to_string(),
            discovery_method,
            config,
        }
    }

    /// Merge key: a project has at most one service per (provider, category).
    pub fn merge_key(&self) -> (String, ServiceCategory) {
        (self.provider.clone(), self.category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsRecordType {
    A,
    #[serde(rename = "NS")]
    Ns,
    #[serde(rename = "CNAME")]
    Cname,
    #[serde(rename = "SOA")]
    Soa,
    #[serde(rename = "MX")]
    Mx,
    #[serde(rename = "TXT")]
    Txt,
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl DnsRecordType {
    /// Record types queried for every domain.
    pub const QUERIED: [DnsRecordType; 6] = [
        Self::A,
        Self::Aaaa,
        Self::Cname,
        Self::Mx,
        Self::Ns,
        Self::Txt,
    ];

    /// IANA record type number.
    pub fn code(&self) -> u16 {
        match self {
            Self::A => 1,
            Self::Ns => 2,
            Self::Cname => 5,
            Self::Soa => 6,
            Self::Mx => 15,
            Self::Txt => 16,
            Self::Aaaa => 28,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::A),
            2 => Some(Self::Ns),
            5 => Some(Self::Cname),
            6 => Some(Self::Soa),
            15 => Some(Self::Mx),
            16 => Some(Self::Txt),
            28 => Some(Self::Aaaa),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Ns => "NS",
            Self::Cname => "CNAME",
            Self::Soa => "SOA",
            Self::Mx => "MX",
            Self::Txt => "TXT",
            Self::Aaaa => "AAAA",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecord {
    #[serde(rename = "type")]
    pub record_type: DnsRecordType,
    pub name: String,
    pub value: String,
    pub ttl: u32,
}

/// A provider inferred from DNS, with its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedProvider {
    pub provider: String,
    pub service_name: String,
}

/// Point-in-time DNS snapshot of one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsInfo {
    pub project_id: String,
    pub domain: String,
    pub dns_provider: Option<String>,
    pub hosting_provider: Option<DetectedProvider>,
    pub email_provider: Option<DetectedProvider>,
    pub nameservers: Vec<String>,
    pub records: Vec<DnsRecord>,
    pub last_checked: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechStack {
    pub language: String,
    pub framework: Option<String>,
    pub framework_version: Option<String>,
    pub css: Vec<String>,
    pub testing: Vec<String>,
    pub build_tool: Option<String>,
    pub icons: Option<String>,
    pub package_manager: Option<String>,
}

/// A failure in one discovery source; never aborts the rest of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryError {
    pub source: String,
    pub message: String,
    pub recoverable: bool,
}

impl DiscoveryError {
    pub fn recoverable(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            recoverable: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub project_id: String,
    pub timestamp: DateTime<Utc>,
    pub services: Vec<InfraService>,
    pub stack: TechStack,
    pub dns: Option<DnsInfo>,
    pub errors: Vec<DiscoveryError>,
}
