use std::ptr::NonNull;

use crate::{allocator::Allocator, heap::HEAP};

/// One fixed-capacity block in an arena's chain.
///
/// `position` is the offset of the next free byte and never exceeds
/// `capacity`. The block is released as a whole when the node drops.
pub struct Node {
  block: NonNull<u8>,
  capacity: usize,
  position: usize,
}

// The node exclusively owns its block.
unsafe impl Send for Node {}

impl Node {
  /// Allocates a node able to hold `capacity` bytes.
  pub fn new(capacity: usize) -> Self {
    Self {
      block: HEAP.alloc(capacity.max(1)),
      capacity,
      position: 0,
    }
  }

  /// Bumps `size` bytes off the node, or `None` if they do not fit.
  ///
  /// `size` must already be rounded to the allocation alignment.
  pub fn bump(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    if size > self.remaining() {
      return None;
    }

    let address = unsafe { self.block.add(self.position) };
    self.position += size;

    Some(address)
  }

  /// Whether `address` lies in `[start, start + capacity]`.
  pub fn contains(
    &self,
    address: *const u8,
  ) -> bool {
    let start = self.block.as_ptr() as usize;
    let address = address as usize;

    start <= address && address <= start + self.capacity
  }

  /// Offset of `address` from the start of the block.
  ///
  /// `address` must satisfy [`Node::contains`].
  pub fn offset_of(
    &self,
    address: *const u8,
  ) -> usize {
    debug_assert!(self.contains(address));
    address as usize - self.block.as_ptr() as usize
  }

  /// Address of the first byte of the block.
  pub fn start(&self) -> NonNull<u8> {
    self.block
  }

  /// Address of the next free byte.
  pub fn top(&self) -> *const u8 {
    self.block.as_ptr().wrapping_add(self.position)
  }

  pub fn position(&self) -> usize {
    self.position
  }

  pub fn set_position(
    &mut self,
    position: usize,
  ) {
    debug_assert!(position <= self.capacity, "position outside the node");
    self.position = position;
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn remaining(&self) -> usize {
    self.capacity - self.position
  }
}

impl Drop for Node {
  fn drop(&mut self) {
    unsafe { HEAP.dealloc(self.block.as_ptr()) }
  }
}
