//! Nested scopes: arenas with a parent link and deferred cleanup.
//!
//! ```text
//!   ScopeStack
//!   ├── factory: Arena ──► [ Scope A | Scope B | Scope C | free ... ]
//!   │                                              ▲
//!   └── top ───────────────────────────────────────┘
//!
//!   C.parent = B, B.parent = A, A.parent = none
//!   end(A): C runs its defers and frees its arena, then B, then A,
//!           then the factory is rewound to where A was placed.
//! ```
//!
//! Scope records are placed in the stack's own factory arena, so opening a
//! scope costs a bump plus the scope's first node, and closing any number of
//! them is a single rewind of the factory.

use std::{
  cell::{Cell, RefCell},
  fmt, mem,
  ptr::NonNull,
};

use once_cell::unsync::OnceCell;

use crate::{
  align::aligned_size,
  allocator::{self, Allocator, AllocatorKind},
  arena::{Arena, Mark},
  config::ScopeConfig,
  defer::DeferStack,
  stats,
};

/// An open region: an arena that lives until its scope is ended, plus the
/// callbacks to run when that happens.
///
/// Scopes are created by [`ScopeStack::begin`] and never owned directly.
pub struct Scope {
  arena: Arena,
  parent: Option<NonNull<Scope>>,
  defers: RefCell<DeferStack>,
  // Factory position before this record was placed.
  mark: Mark,
}

impl Scope {
  /// Registers `f` to run when this scope ends.
  ///
  /// Callbacks run newest first, each exactly once, before the scope's
  /// memory is released, so they may still read memory allocated from it.
  pub fn defer<F>(
    &self,
    f: F,
  ) where
    F: FnOnce() + 'static,
  {
    self.defers.borrow_mut().push(&self.arena, f);
  }

  /// Number of callbacks waiting for the end of this scope.
  pub fn deferred_count(&self) -> usize {
    self.defers.borrow().len()
  }

  /// The scope's own arena.
  pub fn arena(&self) -> &Arena {
    &self.arena
  }

  /// The scope that was innermost when this one was opened.
  pub fn parent(&self) -> Option<&Scope> {
    self.parent.map(|parent| unsafe { parent.as_ref() })
  }

  fn take_deferred(&self) -> DeferStack {
    mem::take(&mut *self.defers.borrow_mut())
  }
}

impl Allocator for Scope {
  fn alloc(
    &self,
    size: usize,
  ) -> NonNull<u8> {
    let size = aligned_size(size);
    stats::record_alloc(size);
    self.arena.alloc(size)
  }

  // Released together with the scope.
  unsafe fn dealloc(
    &self,
    _address: *mut u8,
  ) {
  }

  fn kind(&self) -> AllocatorKind {
    AllocatorKind::Scope
  }

  fn as_arena(&self) -> Option<&Arena> {
    Some(&self.arena)
  }
}

impl fmt::Debug for Scope {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Scope")
      .field("arena", &self.arena)
      .field("deferred", &self.deferred_count())
      .field("has_parent", &self.parent.is_some())
      .finish()
  }
}

/// A stack of nested scopes: the explicit form of the per-thread context
/// the [`local`](crate::local) functions operate on.
///
/// Scopes end in strict LIFO order. Ending a scope also ends every scope
/// opened after it that is still open. Dropping the stack ends everything.
pub struct ScopeStack {
  factory: OnceCell<Arena>,
  top: Cell<Option<NonNull<Scope>>>,
  depth: Cell<usize>,
  config: ScopeConfig,
}

impl ScopeStack {
  /// Creates an empty stack with the default configuration. Nothing is
  /// allocated until the first scope is opened.
  pub fn new() -> Self {
    Self::with_config(ScopeConfig::default())
  }

  /// Creates an empty stack with the given configuration.
  pub fn with_config(config: ScopeConfig) -> Self {
    Self {
      factory: OnceCell::new(),
      top: Cell::new(None),
      depth: Cell::new(0),
      config,
    }
  }

  pub fn config(&self) -> &ScopeConfig {
    &self.config
  }

  fn factory(&self) -> &Arena {
    self.factory.get_or_init(|| {
      let record = aligned_size(mem::size_of::<Scope>());
      let arena = Arena::new(self.config.factory_reservation.saturating_mul(record));

      tracing::debug!(
        scopes = self.config.factory_reservation,
        bytes = arena.capacity(),
        "scope factory created"
      );

      arena
    })
  }

  /// Opens a new innermost scope whose arena nodes hold `size` bytes.
  ///
  /// A `size` of 0 picks twice the average scope size seen so far in the
  /// process, but at least [`ScopeConfig::min_scope_size`].
  pub fn begin(
    &self,
    size: usize,
  ) -> &Scope {
    stats::record_scope();

    let size = match size {
      0 => stats::default_scope_size(self.config.min_scope_size),
      size => size,
    };

    let factory = self.factory();
    let mark = factory.mark();
    let record = allocator::alloc_array::<Scope, _>(factory, 1);

    unsafe {
      record.as_ptr().write(Scope {
        arena: Arena::new(size),
        parent: self.top.get(),
        defers: RefCell::default(),
        mark,
      })
    };

    self.top.set(Some(record));
    self.depth.set(self.depth.get() + 1);

    tracing::trace!(size, depth = self.depth.get(), "scope opened");

    unsafe { record.as_ref() }
  }

  /// Ends `scope` together with every scope opened after it.
  ///
  /// Starting from the innermost scope, each one runs its deferred callbacks
  /// newest first and then releases its arena, stopping after `scope`. The
  /// factory is then rewound to where `scope` was placed. Callbacks that open
  /// scopes or defer more work get those closed and run before the scope
  /// they ran in is released. `None` is a no-op.
  ///
  /// # Panics
  ///
  /// A panicking callback is propagated after the older callbacks of the
  /// same scope have run. That scope and everything outside it stay open, and
  /// ending it again releases it.
  ///
  /// # Safety
  ///
  /// `scope` must be open on this stack. After the call, neither `scope`, nor
  /// any scope opened after it, nor any memory allocated from them may be
  /// used. A deferred callback must not end the scope it was registered on
  /// or any scope outside it.
  pub unsafe fn end(
    &self,
    scope: Option<&Scope>,
  ) {
    let Some(scope) = scope else {
      return;
    };

    debug_assert!(self.is_open(scope), "ending a scope that is not open on this stack");
    let target = NonNull::from(scope);

    let mark = scope.mark;
    let mut closed = 0usize;

    while let Some(current) = self.top.get() {
      let current_ref = unsafe { current.as_ref() };

      let deferred = current_ref.take_deferred();
      if !deferred.is_empty() {
        deferred.run();
        continue;
      }

      self.top.set(current_ref.parent);
      self.depth.set(self.depth.get() - 1);
      current_ref.arena.delete();
      closed += 1;

      if current == target {
        break;
      }
    }

    if let Some(factory) = self.factory.get() {
      factory.rewind(mark);
    }

    tracing::trace!(closed, depth = self.depth.get(), "scope ended");
  }

  /// Ends every open scope.
  ///
  /// # Safety
  ///
  /// Same contract as [`ScopeStack::end`] applied to the outermost scope: no
  /// scope from this stack may be used afterwards.
  pub unsafe fn close_all(&self) {
    let mut outermost = match self.top.get() {
      Some(top) => top,
      None => return,
    };

    while let Some(parent) = unsafe { outermost.as_ref() }.parent {
      outermost = parent;
    }

    tracing::debug!(open = self.depth.get(), "closing every open scope");

    unsafe { self.end(Some(outermost.as_ref())) }
  }

  /// The innermost open scope, if any.
  pub fn last_scope(&self) -> Option<&Scope> {
    self.top.get().map(|top| unsafe { top.as_ref() })
  }

  /// The innermost open scope as an allocator, or `fallback` when no scope
  /// is open.
  pub fn last_scope_or<'a>(
    &'a self,
    fallback: &'a dyn Allocator,
  ) -> &'a dyn Allocator {
    match self.last_scope() {
      Some(scope) => scope,
      None => fallback,
    }
  }

  /// Number of open scopes.
  pub fn depth(&self) -> usize {
    self.depth.get()
  }

  /// Whether `scope` is currently open on this stack.
  pub fn is_open(
    &self,
    scope: &Scope,
  ) -> bool {
    let scope = NonNull::from(scope);
    let mut current = self.top.get();

    while let Some(open) = current {
      if open == scope {
        return true;
      }
      current = unsafe { open.as_ref() }.parent;
    }

    false
  }

  #[cfg(test)]
  fn factory_used(&self) -> usize {
    self.factory.get().map_or(0, Arena::used_bytes)
  }
}

impl Default for ScopeStack {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for ScopeStack {
  fn drop(&mut self) {
    unsafe { self.close_all() }
  }
}

impl fmt::Debug for ScopeStack {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("ScopeStack")
      .field("depth", &self.depth.get())
      .field("factory", &self.factory.get())
      .field("config", &self.config)
      .finish()
  }
}
