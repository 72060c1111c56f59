//! Implicit per-thread scope stack.
//!
//! Each thread lazily gets its own [`ScopeStack`], created the first time
//! [`begin`] runs on it. Threads never share or contend on their stacks.
//!
//! The stack lives behind a slot that is never torn down, so every function
//! here keeps working while the thread exits. Leaked scopes are ended by a
//! separate teardown guard whose destructor runs at thread exit, and their
//! deferred callbacks may still open, query and end scopes. The thread that
//! calls `exit` (normally `main`) may not run thread-local destructors, so
//! an `atexit` hook ends its scopes as well.
//!
//! Code that already has a [`ScopeStack`] at hand should use it directly;
//! this module only saves threading one through every call.

use std::{cell::Cell, ptr::NonNull, sync::Once};

use once_cell::sync::Lazy;

use crate::{
  allocator::Allocator,
  config::ScopeConfig,
  scope::{Scope, ScopeStack},
};

static CONFIG: Lazy<ScopeConfig> = Lazy::new(|| {
  ScopeConfig::from_env().unwrap_or_else(|err| {
    tracing::warn!(%err, "ignoring scope configuration from the environment");
    ScopeConfig::default()
  })
});

static EXIT_HOOK: Once = Once::new();

thread_local! {
  // No destructor: stays reachable for the whole life of the thread.
  static STACK: Cell<Option<NonNull<ScopeStack>>> = const { Cell::new(None) };

  static TEARDOWN: Teardown = const { Teardown };
}

struct Teardown;

impl Drop for Teardown {
  fn drop(&mut self) {
    let Some(stack) = STACK.with(Cell::get) else {
      return;
    };

    // Callbacks run here still find the stack in its slot.
    unsafe { stack.as_ref().close_all() };

    STACK.with(|slot| slot.set(None));
    drop(unsafe { Box::from_raw(stack.as_ptr()) });
  }
}

fn register_exit_hook() {
  if unsafe { libc::atexit(close_at_exit) } != 0 {
    tracing::warn!("could not register the scope teardown exit hook");
  }
}

extern "C" fn close_at_exit() {
  if let Some(stack) = current() {
    unsafe { stack.as_ref().close_all() };
  }
}

fn current() -> Option<NonNull<ScopeStack>> {
  STACK.with(Cell::get)
}

fn current_or_create() -> NonNull<ScopeStack> {
  if let Some(stack) = current() {
    return stack;
  }

  let stack = NonNull::from(Box::leak(Box::new(ScopeStack::with_config(CONFIG.clone()))));
  STACK.with(|slot| slot.set(Some(stack)));

  EXIT_HOOK.call_once(register_exit_hook);
  if TEARDOWN.try_with(|_| ()).is_err() {
    tracing::debug!("scope stack created after thread teardown, it will not be closed");
  }

  stack
}

/// Configuration used by every thread's implicit stack.
pub fn config() -> &'static ScopeConfig {
  &CONFIG
}

/// Opens a new innermost scope on the calling thread.
///
/// See [`ScopeStack::begin`]. The returned scope is usable until it, or a
/// scope outside it, is ended, or until the thread exits.
pub fn begin(size: usize) -> &'static Scope {
  let stack = current_or_create();
  let scope: *const Scope = unsafe { stack.as_ref() }.begin(size);
  // Scope records never move and live until ended or until the thread's
  // stack is closed at exit.
  unsafe { &*scope }
}

/// Ends `scope` and every scope opened after it on the calling thread.
/// `None` is a no-op.
///
/// # Safety
///
/// Same contract as [`ScopeStack::end`]: `scope` must be open on the calling
/// thread, and nothing it or its inner scopes handed out may be used
/// afterwards.
pub unsafe fn end(scope: Option<&Scope>) {
  if scope.is_none() {
    return;
  }

  if let Some(stack) = current() {
    unsafe { stack.as_ref().end(scope) };
  }
}

/// The innermost scope open on the calling thread.
pub fn last_scope() -> Option<&'static Scope> {
  let stack = current()?;
  unsafe { stack.as_ref() }
    .last_scope()
    .map(|scope| unsafe { &*(scope as *const Scope) })
}

/// The innermost scope open on the calling thread, or `fallback` when none
/// is.
pub fn last_scope_or(fallback: &dyn Allocator) -> &dyn Allocator {
  match last_scope() {
    Some(scope) => scope,
    None => fallback,
  }
}

/// Number of scopes open on the calling thread.
pub fn depth() -> usize {
  current().map_or(0, |stack| unsafe { stack.as_ref() }.depth())
}

/// Ends every scope open on the calling thread.
///
/// # Safety
///
/// No scope opened on this thread, nor memory allocated from one, may be
/// used afterwards.
pub unsafe fn close_all() {
  if let Some(stack) = current() {
    unsafe { stack.as_ref().close_all() };
  }
}
