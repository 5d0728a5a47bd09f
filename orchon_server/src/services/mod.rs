//! Observatory services: deployment tracking, discovery, status aggregation
//! and the stored checks behind them.

pub mod alert_service;
pub mod check_service;
pub mod cost_service;
pub mod deployment_service;
pub mod dns_service;
pub mod github_service;
pub mod project_service;
pub mod registry_service;
pub mod scanner_service;
pub mod status_service;
