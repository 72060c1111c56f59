//! Error types.
//!
//! Allocation never fails recoverably, so configuration is the only source
//! of errors in this crate.

use thiserror::Error;

/// Errors produced while building a [`ScopeConfig`](crate::ScopeConfig).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
  /// An environment variable held something other than an unsigned integer.
  #[error("invalid value for {var}: {value:?} is not an unsigned integer")]
  InvalidNumber {
    /// The variable that was read.
    var: String,
    /// The raw value found.
    value: String,
  },

  /// A knob that must be positive was set to zero.
  #[error("{field} must be greater than zero")]
  Zero {
    /// Name of the offending field.
    field: &'static str,
  },
}
