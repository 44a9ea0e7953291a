//! Result type for the IOU ledger

use crate::error::Error;

/// Result type for the IOU ledger
pub type Result<T> = std::result::Result<T, Error>;
