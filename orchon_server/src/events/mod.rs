//! Deployment lifecycle events.
//!
//! Webhook runs are normalized into [`DeploymentRecord`]s before they reach
//! the store.
//!
//! [`DeploymentRecord`]: crate::models::deployment::DeploymentRecord

pub mod deployment;
