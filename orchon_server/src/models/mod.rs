//! Observatory data models.

pub mod alert;
pub mod check;
pub mod cost;
pub mod deployment;
pub mod infra;
pub mod project;
pub mod workflow_run;
