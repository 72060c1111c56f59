//! Deferred cleanup callbacks owned by a scope.
//!
//! Both the closures and the entry array that indexes them live in the
//! owning scope's arena, so registering a callback never touches the heap
//! (over-aligned closures excepted). The array starts with room for eight
//! entries and doubles through [`realloc`](crate::realloc). It only grows in
//! place while nothing was allocated after it, which holds when every
//! callback is zero-sized or boxed; otherwise each doubling copies it.

use std::{mem, ptr, ptr::NonNull};

use crate::{align::ALIGNMENT, allocator, arena::Arena};

const INITIAL_CAPACITY: usize = 8;

#[derive(Clone, Copy)]
struct Deferred {
  data: NonNull<u8>,
  run: unsafe fn(NonNull<u8>),
}

unsafe fn call_in_place<F: FnOnce()>(data: NonNull<u8>) {
  let f = unsafe { ptr::read(data.cast::<F>().as_ptr()) };
  f();
}

unsafe fn call_boxed<F: FnOnce()>(data: NonNull<u8>) {
  let f = unsafe { Box::from_raw(data.cast::<F>().as_ptr()) };
  f();
}

/// LIFO list of callbacks, each consumed exactly once by [`DeferStack::run`].
pub(crate) struct DeferStack {
  entries: *mut Deferred,
  len: usize,
  capacity: usize,
}

impl Default for DeferStack {
  fn default() -> Self {
    Self {
      entries: ptr::null_mut(),
      len: 0,
      capacity: 0,
    }
  }
}

impl DeferStack {
  /// Moves `f` into `arena` and registers it to run after every callback
  /// already pushed.
  pub fn push<F: FnOnce() + 'static>(
    &mut self,
    arena: &Arena,
    f: F,
  ) {
    let entry = if mem::size_of::<F>() == 0 {
      mem::forget(f);
      Deferred {
        data: NonNull::<F>::dangling().cast(),
        run: call_in_place::<F>,
      }
    } else if mem::align_of::<F>() > ALIGNMENT {
      let boxed = Box::into_raw(Box::new(f));
      Deferred {
        data: unsafe { NonNull::new_unchecked(boxed) }.cast(),
        run: call_boxed::<F>,
      }
    } else {
      let slot = allocator::alloc_array::<F, _>(arena, 1);
      unsafe { slot.as_ptr().write(f) };
      Deferred {
        data: slot.cast(),
        run: call_in_place::<F>,
      }
    };

    if self.len == self.capacity {
      self.grow(arena);
    }

    unsafe { self.entries.add(self.len).write(entry) };
    self.len += 1;
  }

  fn grow(
    &mut self,
    arena: &Arena,
  ) {
    let capacity = match self.capacity {
      0 => INITIAL_CAPACITY,
      n => n * 2,
    };
    let entry = mem::size_of::<Deferred>();

    let entries = unsafe {
      allocator::realloc(
        arena,
        self.entries.cast(),
        self.capacity * entry,
        capacity * entry,
      )
    };

    self.entries = entries.cast().as_ptr();
    self.capacity = capacity;
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Calls every registered callback, newest first.
  ///
  /// If a callback panics the older ones still run while unwinding. A second
  /// panic during that aborts the process.
  ///
  /// The arena the stack was built in must still be alive.
  pub fn run(self) {
    let mut pending = Pending {
      entries: self.entries,
      len: self.len,
    };
    pending.run_all();
  }
}

struct Pending {
  entries: *mut Deferred,
  len: usize,
}

impl Pending {
  fn run_all(&mut self) {
    while self.len > 0 {
      self.len -= 1;
      let entry = unsafe { self.entries.add(self.len).read() };
      unsafe { (entry.run)(entry.data) };
    }
  }
}

// Only non-empty when a callback panicked.
impl Drop for Pending {
  fn drop(&mut self) {
    self.run_all();
  }
}
