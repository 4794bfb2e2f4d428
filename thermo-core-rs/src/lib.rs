//! Thermo Core Library
//!
//! Round-based thermal equilibrium protocol: one coordinator and a fixed set
//! of peripheral nodes exchange temperatures over line-framed TCP until every
//! peripheral value settles.

pub mod types;
pub mod error;
pub mod config;
pub mod thermal;
pub mod registry;
pub mod transport;
pub mod coordinator;
pub mod peripheral;

pub use types::*;
pub use error::{ConfigError, Error, ErrorKind, RegistrationError, Result};
pub use config::{CoordinatorConfig, PeripheralConfig};
pub use registry::{PeripheralRecord, Registry};
pub use transport::Connection;
pub use coordinator::{Coordinator, CoordinatorState, Phase, RunSummary};
pub use peripheral::{Peripheral, PeripheralOutcome, PeripheralState};
