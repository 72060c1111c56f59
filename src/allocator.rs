//! The allocator capability every client programs against.
//!
//! Containers never care which concrete allocator they were handed: the heap,
//! a bare [`Arena`] or a [`Scope`](crate::Scope) all satisfy the same
//! contract. [`realloc`] is the one place that looks past the contract, and it
//! does so through [`Allocator::as_arena`] rather than by guessing at types.

use std::{mem, ptr, ptr::NonNull};

use crate::{align::ALIGNMENT, arena::Arena, heap};

/// Tag naming the concrete kind behind an [`Allocator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocatorKind {
  /// The process-wide `malloc` wrapper.
  Heap,
  /// A bare bump arena.
  Arena,
  /// An arena owned by an open scope.
  Scope,
}

/// Memory source with a fixed alignment and no recoverable failure.
///
/// `alloc` either returns at least `size` writable bytes aligned to
/// [`ALIGNMENT`] or terminates the process. Region-backed implementations
/// accept `dealloc` and ignore it: the region owns the memory as a whole.
pub trait Allocator {
  /// Returns a block of at least `size` bytes. `size` must be non-zero.
  fn alloc(
    &self,
    size: usize,
  ) -> NonNull<u8>;

  /// Like [`Allocator::alloc`], with every returned byte set to zero.
  fn alloc_zeroed(
    &self,
    size: usize,
  ) -> NonNull<u8> {
    let block = self.alloc(size);
    unsafe { ptr::write_bytes(block.as_ptr(), 0, size) };
    block
  }

  /// Releases a block. Null is a no-op.
  ///
  /// # Safety
  ///
  /// `address` must be null or a block returned by this allocator that has
  /// not been released yet. It must not be used afterwards.
  unsafe fn dealloc(
    &self,
    address: *mut u8,
  );

  /// Which concrete allocator this is.
  fn kind(&self) -> AllocatorKind;

  /// The arena behind this allocator, if it has one.
  ///
  /// Allocators that answer `Some` get in-place growth from [`realloc`].
  fn as_arena(&self) -> Option<&Arena> {
    None
  }
}

/// Resizes `old` to `new_size` bytes, keeping the first
/// `min(old_size, new_size)` bytes.
///
/// When `allocator` is arena-backed and `old` is the most recent allocation
/// in the head node, the block is grown (or shrunk) in place and the same
/// address comes back as long as the node still has room. Every other case
/// allocates a fresh block, copies and releases the old one. A null `old`
/// behaves like a plain allocation.
///
/// # Safety
///
/// `old` must be null or a live block from `allocator` that is at least
/// `old_size` bytes long. It must not be used after this call; use the
/// returned block instead.
pub unsafe fn realloc<A: Allocator + ?Sized>(
  allocator: &A,
  old: *mut u8,
  old_size: usize,
  new_size: usize,
) -> NonNull<u8> {
  if let Some(arena) = allocator.as_arena() {
    if let Some(block) = unsafe { arena.extend(old, old_size, new_size) } {
      return block;
    }
  }

  let block = allocator.alloc(new_size);

  if !old.is_null() {
    unsafe {
      ptr::copy_nonoverlapping(old, block.as_ptr(), old_size.min(new_size));
      allocator.dealloc(old);
    }
  }

  block
}

fn array_bytes<T>(count: usize) -> usize {
  debug_assert!(mem::align_of::<T>() <= ALIGNMENT, "type is over-aligned");

  match count.checked_mul(mem::size_of::<T>()) {
    Some(bytes) => bytes,
    None => heap::out_of_memory(usize::MAX),
  }
}

/// Allocates uninitialized storage for `count` values of `T`.
pub fn alloc_array<T, A: Allocator + ?Sized>(
  allocator: &A,
  count: usize,
) -> NonNull<T> {
  allocator.alloc(array_bytes::<T>(count)).cast()
}

/// Allocates zeroed storage for `count` values of `T`.
pub fn alloc_array_zeroed<T, A: Allocator + ?Sized>(
  allocator: &A,
  count: usize,
) -> NonNull<T> {
  allocator.alloc_zeroed(array_bytes::<T>(count)).cast()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::heap::HEAP;

  fn fill(
    block: NonNull<u8>,
    len: usize,
  ) {
    for i in 0..len {
      unsafe { *block.as_ptr().add(i) = (i % 251) as u8 };
    }
  }

  fn check(
    block: NonNull<u8>,
    len: usize,
  ) {
    for i in 0..len {
      assert_eq!(unsafe { *block.as_ptr().add(i) }, (i % 251) as u8);
    }
  }

  #[test]
  fn realloc_extends_latest_block_in_place() {
    let arena = Arena::new(1024);

    let block = arena.alloc(32);
    fill(block, 32);

    let grown = unsafe { realloc(&arena, block.as_ptr(), 32, 200) };

    assert_eq!(grown, block);
    check(grown, 32);
    assert_eq!(arena.used_bytes(), crate::align!(200));
  }

  #[test]
  fn realloc_of_older_block_moves() {
    let arena = Arena::new(1024);

    let first = arena.alloc(32);
    fill(first, 32);
    let _second = arena.alloc(16);

    let grown = unsafe { realloc(&arena, first.as_ptr(), 32, 64) };

    assert_ne!(grown, first);
    check(grown, 32);
  }

  #[test]
  fn realloc_past_node_end_copies_into_new_node() {
    let arena = Arena::new(64);

    let block = arena.alloc(32);
    let pattern: Vec<u8> = (0..32).map(|i| 0xA0 ^ i).collect();
    unsafe { ptr::copy_nonoverlapping(pattern.as_ptr(), block.as_ptr(), 32) };

    let grown = unsafe { realloc(&arena, block.as_ptr(), 32, 96) };

    assert_ne!(grown, block);
    assert_eq!(arena.node_count(), 2);
    let copied = unsafe { std::slice::from_raw_parts(grown.as_ptr(), 32) };
    assert_eq!(copied, &pattern[..]);
  }

  #[test]
  fn realloc_shrinks_in_place() {
    let arena = Arena::new(256);

    let block = arena.alloc(128);
    fill(block, 128);

    let shrunk = unsafe { realloc(&arena, block.as_ptr(), 128, 16) };

    assert_eq!(shrunk, block);
    check(shrunk, 16);
    assert_eq!(arena.used_bytes(), crate::align!(16));
  }

  #[test]
  fn realloc_on_heap_preserves_content() {
    let block = HEAP.alloc(40);
    fill(block, 40);

    let grown = unsafe { realloc(&HEAP, block.as_ptr(), 40, 4000) };
    check(grown, 40);

    let shrunk = unsafe { realloc(&HEAP, grown.as_ptr(), 4000, 10) };
    check(shrunk, 10);

    unsafe { HEAP.dealloc(shrunk.as_ptr()) };
  }

  #[test]
  fn realloc_of_null_allocates() {
    let arena = Arena::new(128);

    let block = unsafe { realloc(&arena, ptr::null_mut(), 0, 48) };

    assert_eq!(block.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(arena.used_bytes(), crate::align!(48));
  }

  #[test]
  fn realloc_through_trait_object() {
    let arena = Arena::new(512);
    let allocator: &dyn Allocator = &arena;

    let block = allocator.alloc(24);
    let grown = unsafe { realloc(allocator, block.as_ptr(), 24, 48) };

    assert_eq!(grown, block);
  }

  #[test]
  fn typed_arrays() {
    let arena = Arena::new(1024);

    let numbers = alloc_array::<u64, _>(&arena, 16);
    unsafe {
      for i in 0..16 {
        numbers.as_ptr().add(i).write(i as u64 * 3);
      }
      assert_eq!(*numbers.as_ptr().add(15), 45);
    }

    let zeroes = alloc_array_zeroed::<u32, _>(&HEAP, 64);
    unsafe {
      assert!(std::slice::from_raw_parts(zeroes.as_ptr(), 64).iter().all(|&v| v == 0));
      HEAP.dealloc(zeroes.as_ptr().cast());
    }
  }

  #[test]
  fn default_alloc_zeroed_clears_reused_memory() {
    let arena = Arena::new(128);

    let mark = arena.mark();
    let dirty = arena.alloc(64);
    unsafe { ptr::write_bytes(dirty.as_ptr(), 0xFF, 64) };
    arena.rewind(mark);

    let clean = arena.alloc_zeroed(64);
    assert_eq!(clean, dirty);
    let bytes = unsafe { std::slice::from_raw_parts(clean.as_ptr(), 64) };
    assert!(bytes.iter().all(|&b| b == 0));
  }
}
