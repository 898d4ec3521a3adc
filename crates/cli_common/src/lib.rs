//! Shared plumbing of the catalog CLIs: logging flags, subscriber setup,
//! and uniform reporting of aggregated catalog errors.

mod logging;
pub use logging::{init_logging, report_errors, LogArgs};
