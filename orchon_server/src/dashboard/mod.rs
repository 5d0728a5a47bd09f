//! Dashboard rollups.

pub mod kpi;
