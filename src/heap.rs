use std::{alloc::Layout, ptr::NonNull};

use libc::{c_void, calloc, free, malloc};

use crate::{
  align::ALIGNMENT,
  allocator::{Allocator, AllocatorKind},
};

/// Allocator backed by the system `malloc`.
///
/// There is a single process-wide instance, [`HEAP`]; the type carries no
/// state, so any copy behaves identically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Heap;

/// The process-wide heap allocator.
pub static HEAP: Heap = Heap;

impl Heap {
  /// Returns the process-wide heap allocator.
  pub fn global() -> &'static Heap {
    &HEAP
  }
}

impl Allocator for Heap {
  fn alloc(
    &self,
    size: usize,
  ) -> NonNull<u8> {
    debug_assert!(size > 0, "zero sized allocation");

    let address = unsafe { malloc(size.max(1)) };

    NonNull::new(address as *mut u8).unwrap_or_else(|| out_of_memory(size))
  }

  fn alloc_zeroed(
    &self,
    size: usize,
  ) -> NonNull<u8> {
    debug_assert!(size > 0, "zero sized allocation");

    let address = unsafe { calloc(1, size.max(1)) };

    NonNull::new(address as *mut u8).unwrap_or_else(|| out_of_memory(size))
  }

  unsafe fn dealloc(
    &self,
    address: *mut u8,
  ) {
    // free(NULL) is a no-op.
    unsafe { free(address as *mut c_void) }
  }

  fn kind(&self) -> AllocatorKind {
    AllocatorKind::Heap
  }
}

/// Terminates the process after a failed allocation of `size` bytes.
///
/// Nothing in this crate reports allocation failure to its caller. Arenas
/// and scopes grow from the heap, so this is the only failure exit for all
/// of them.
#[cold]
pub fn out_of_memory(size: usize) -> ! {
  tracing::error!(size, "heap allocation failed");

  match Layout::from_size_align(size, ALIGNMENT) {
    Ok(layout) => std::alloc::handle_alloc_error(layout),
    Err(_) => {
      eprintln!("memory allocation of {size} bytes failed");
      std::process::abort()
    }
  }
}
