//! Common utilities and types for the IOU ledger

pub mod config;
pub mod error;
pub mod logging;
pub mod result;

pub use config::{FlowSettings, IssuanceSettings, NodeConfig};
pub use error::Error;
pub use result::Result;
