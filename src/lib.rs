pub mod checks;
pub mod cli;
pub mod config;
pub mod logging;
pub mod report;
pub mod scheduler;
pub mod target;

// Re-export key types and functions at the crate root
pub use checks::{ProtocolCheck, ServiceEntry, create_registry, lookup};
pub use config::{Credential, Timeouts, default_credentials};
pub use logging::init_logging;
pub use report::{CheckResult, ExposureCounter, Report, Summary, aggregate, write_report};
pub use scheduler::{WorkItem, run, work_items};
pub use target::{load_targets, parse_ports};
