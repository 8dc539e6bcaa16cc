//! Statistics for broadcast groups

pub mod metrics;

pub use metrics::GroupStats;
pub(crate) use metrics::GroupCounters;
