//! Scope stack configuration.

use crate::error::ConfigError;

/// Environment variable overriding [`ScopeConfig::min_scope_size`].
pub const MIN_SCOPE_SIZE_VAR: &str = "SCOPEALLOC_MIN_SCOPE_SIZE";

/// Environment variable overriding [`ScopeConfig::factory_reservation`].
pub const FACTORY_RESERVATION_VAR: &str = "SCOPEALLOC_FACTORY_RESERVATION";

/// Tuning knobs for a [`ScopeStack`](crate::ScopeStack).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeConfig {
  /// Smallest arena a scope opened with size 0 receives, in bytes.
  ///
  /// Default: 1024.
  pub min_scope_size: usize,

  /// Number of nested scope records the scope factory holds before it has
  /// to grow a new node.
  ///
  /// Default: 64.
  pub factory_reservation: usize,
}

impl ScopeConfig {
  /// Default floor for adaptive scope sizes.
  pub const DEFAULT_MIN_SCOPE_SIZE: usize = 1024;

  /// Default number of scope records reserved per factory node.
  pub const DEFAULT_FACTORY_RESERVATION: usize = 64;

  /// Checks that every knob is usable.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.min_scope_size == 0 {
      return Err(ConfigError::Zero { field: "min_scope_size" });
    }
    if self.factory_reservation == 0 {
      return Err(ConfigError::Zero { field: "factory_reservation" });
    }
    Ok(())
  }

  /// Builds a config from the defaults overridden by the process
  /// environment.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|var| std::env::var(var).ok())
  }

  /// Builds a config from the defaults overridden by whatever `lookup`
  /// returns for each variable name.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Self::default();

    if let Some(value) = lookup(MIN_SCOPE_SIZE_VAR) {
      config.min_scope_size = parse(MIN_SCOPE_SIZE_VAR, &value)?;
    }
    if let Some(value) = lookup(FACTORY_RESERVATION_VAR) {
      config.factory_reservation = parse(FACTORY_RESERVATION_VAR, &value)?;
    }

    config.validate()?;
    Ok(config)
  }
}

impl Default for ScopeConfig {
  fn default() -> Self {
    Self {
      min_scope_size: Self::DEFAULT_MIN_SCOPE_SIZE,
      factory_reservation: Self::DEFAULT_FACTORY_RESERVATION,
    }
  }
}

fn parse(
  var: &str,
  value: &str,
) -> Result<usize, ConfigError> {
  value
    .trim()
    .parse()
    .map_err(|_| ConfigError::InvalidNumber {
      var: var.to_string(),
      value: value.to_string(),
    })
}
