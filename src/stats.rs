//! Running average of scope sizes, used to size scopes opened with size 0.
//!
//! The two counters are updated independently, so a reader can see one
//! update without the other. The average is a heuristic, and being briefly
//! off only changes how large the next default scope is.

#[cfg(target_has_atomic = "64")]
mod counters {
  use std::sync::atomic::{AtomicU64, Ordering};

  static TOTAL_BYTES: AtomicU64 = AtomicU64::new(0);
  static SCOPES: AtomicU64 = AtomicU64::new(0);

  pub fn add_bytes(size: usize) {
    TOTAL_BYTES.fetch_add(size as u64, Ordering::Relaxed);
  }

  pub fn add_scope() {
    SCOPES.fetch_add(1, Ordering::Relaxed);
  }

  pub fn load() -> (u64, u64) {
    (TOTAL_BYTES.load(Ordering::Relaxed), SCOPES.load(Ordering::Relaxed))
  }
}

// Narrower counters on targets without 64-bit atomics. They are still
// shared by every thread and wrap instead of saturating.
#[cfg(not(target_has_atomic = "64"))]
mod counters {
  use std::sync::atomic::{AtomicUsize, Ordering};

  static TOTAL_BYTES: AtomicUsize = AtomicUsize::new(0);
  static SCOPES: AtomicUsize = AtomicUsize::new(0);

  pub fn add_bytes(size: usize) {
    TOTAL_BYTES.fetch_add(size, Ordering::Relaxed);
  }

  pub fn add_scope() {
    SCOPES.fetch_add(1, Ordering::Relaxed);
  }

  pub fn load() -> (u64, u64) {
    (
      TOTAL_BYTES.load(Ordering::Relaxed) as u64,
      SCOPES.load(Ordering::Relaxed) as u64,
    )
  }
}

/// Records `size` bytes allocated from some scope.
pub(crate) fn record_alloc(size: usize) {
  counters::add_bytes(size);
}

/// Records a newly opened scope.
pub(crate) fn record_scope() {
  counters::add_scope();
}

/// Average number of bytes allocated per scope so far.
pub fn average_scope_size() -> usize {
  let (total, scopes) = counters::load();
  average(total, scopes)
}

/// Size for a scope opened without an explicit size: twice the average,
/// never less than `minimum`.
pub fn default_scope_size(minimum: usize) -> usize {
  let (total, scopes) = counters::load();
  default_size(total, scopes, minimum)
}

fn average(
  total: u64,
  scopes: u64,
) -> usize {
  match total.checked_div(scopes) {
    Some(average) => usize::try_from(average).unwrap_or(usize::MAX),
    None => 0,
  }
}

fn default_size(
  total: u64,
  scopes: u64,
  minimum: usize,
) -> usize {
  average(total, scopes).saturating_mul(2).max(minimum)
}
