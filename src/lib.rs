pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod probe;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ConfigError, SchedulerError, StoreError, StoreResult};
pub use store::{CheckStore, SweepSummary};
