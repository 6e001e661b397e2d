pub mod cf;
pub mod cf_home;
pub mod config;
pub mod env_check;
pub mod error;
pub mod fixtures;
pub mod help;
pub mod matcher;
pub mod process;
pub mod runner;
pub mod scenario;
pub mod selector;

// Public API
pub use cf::{Cf, CfSettings};
pub use cf_home::{CfConfig, CfHome};
pub use config::{Credentials, HarnessConfig};
pub use error::{HarnessError, Result};
pub use matcher::{Pattern, Timeouts};
pub use process::{Session, SessionBuilder};
pub use selector::Selector;
