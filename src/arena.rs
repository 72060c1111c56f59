//! Growable bump arena over a chain of fixed-capacity nodes.
//!
//! ```text
//!   nodes[0] (oldest, full)      nodes[1] (full)          nodes[2] = head
//!   ┌──────────────────────┐     ┌──────────────────┐     ┌─────────────────────┐
//!   │ A1 │ A2 │ A3 │ waste │     │ A4 (oversized)   │     │ A5 │ A6 │   free    │
//!   └──────────────────────┘     └──────────────────┘     └─────────────────────┘
//!                                                                   ▲
//!                                                               position
//! ```
//!
//! Allocation bumps the head's cursor. When the head cannot fit a request a
//! new node of `max(capacity, size)` bytes is pushed; older nodes are never
//! touched again until a rewind or delete releases them. Already issued
//! memory never moves.

use std::{cell::RefCell, fmt, mem, ptr, ptr::NonNull};

use crate::{
  align::aligned_size,
  allocator::{Allocator, AllocatorKind},
  node::Node,
};

/// A position inside an [`Arena`] that it can later be rewound to.
///
/// Obtained from [`Arena::mark`]. A mark stays meaningful until the arena is
/// rewound to a point before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mark {
  depth: usize,
  position: usize,
}

/// Bump allocator that does not run out of memory.
///
/// The chain is kept oldest-first; the last node is the head that serves
/// allocations. `capacity` is the size of the next grown node, not a running
/// total.
pub struct Arena {
  nodes: RefCell<Vec<Node>>,
  capacity: usize,
}

impl Arena {
  /// Creates an arena whose nodes hold `capacity` bytes (rounded up to the
  /// allocation alignment). The first node is allocated right away.
  pub fn new(capacity: usize) -> Self {
    let capacity = aligned_size(capacity);

    Self {
      nodes: RefCell::new(vec![Node::new(capacity)]),
      capacity,
    }
  }

  fn bump(
    &self,
    size: usize,
  ) -> NonNull<u8> {
    let size = aligned_size(size);
    let mut nodes = self.nodes.borrow_mut();

    if let Some(address) = nodes.last_mut().and_then(|head| head.bump(size)) {
      return address;
    }

    self.grow(&mut nodes, size)
  }

  fn grow(
    &self,
    nodes: &mut Vec<Node>,
    size: usize,
  ) -> NonNull<u8> {
    let mut node = Node::new(self.capacity.max(size));
    node.set_position(size);

    let address = node.start();
    nodes.push(node);

    tracing::debug!(
      node_capacity = self.capacity.max(size),
      nodes = nodes.len(),
      "arena grew a node"
    );

    address
  }

  /// Current allocation position.
  pub fn mark(&self) -> Mark {
    let nodes = self.nodes.borrow();

    match nodes.last() {
      Some(head) => Mark {
        depth: nodes.len(),
        position: head.position(),
      },
      None => Mark { depth: 0, position: 0 },
    }
  }

  /// Undoes every allocation made since `mark` was taken.
  ///
  /// Nodes created after the mark are released; the node the mark points
  /// into gets its cursor reset. Costs one step per released node.
  pub fn rewind(
    &self,
    mark: Mark,
  ) {
    let mut nodes = self.nodes.borrow_mut();

    debug_assert!(mark.depth <= nodes.len(), "mark is newer than the arena");
    nodes.truncate(mark.depth);

    if let Some(head) = nodes.last_mut() {
      head.set_position(mark.position);
    }
  }

  /// Rewinds to a raw address previously handed out by, or derived from a
  /// position in, this arena.
  ///
  /// Head nodes are released until one contains `address`, whose cursor is
  /// then moved there.
  pub fn rewind_to(
    &self,
    address: *const u8,
  ) {
    let mut nodes = self.nodes.borrow_mut();

    while let Some(head) = nodes.last_mut() {
      if head.contains(address) {
        let offset = head.offset_of(address);
        head.set_position(offset);
        return;
      }
      nodes.pop();
    }

    debug_assert!(false, "rewind target {address:?} is not inside this arena");
  }

  /// Releases every node. The arena stays usable and starts a fresh node on
  /// the next allocation.
  pub fn delete(&self) {
    let nodes = mem::take(&mut *self.nodes.borrow_mut());
    drop(nodes);
  }

  /// Grows or shrinks `old` in place when it is the latest allocation in the
  /// head node.
  ///
  /// Returns `None` when `old` is not the latest allocation; the caller then
  /// falls back to allocate-and-copy. If the new size no longer fits the head
  /// the block moves into a new node and its content is copied.
  ///
  /// # Safety
  ///
  /// `old` must be null or a live block of at least `old_size` bytes from
  /// this arena.
  pub(crate) unsafe fn extend(
    &self,
    old: *mut u8,
    old_size: usize,
    new_size: usize,
  ) -> Option<NonNull<u8>> {
    if old.is_null() {
      return None;
    }

    let mut nodes = self.nodes.borrow_mut();
    let head = nodes.last_mut()?;

    let end = (old as usize).checked_add(aligned_size(old_size))?;
    if end != head.top() as usize || !head.contains(old) {
      return None;
    }

    let offset = head.offset_of(old);
    head.set_position(offset);

    let size = aligned_size(new_size);
    if let Some(address) = head.bump(size) {
      return Some(address);
    }

    // The old bytes stay readable: their node is still in the chain.
    let address = self.grow(&mut nodes, size);
    unsafe { ptr::copy_nonoverlapping(old, address.as_ptr(), old_size.min(new_size)) };

    Some(address)
  }

  /// Size of the next grown node.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Number of nodes currently in the chain.
  pub fn node_count(&self) -> usize {
    self.nodes.borrow().len()
  }

  /// Bytes handed out across all nodes, including alignment padding.
  pub fn used_bytes(&self) -> usize {
    self.nodes.borrow().iter().map(Node::position).sum()
  }

  /// Bytes reserved from the heap across all nodes.
  pub fn reserved_bytes(&self) -> usize {
    self.nodes.borrow().iter().map(Node::capacity).sum()
  }
}

impl Allocator for Arena {
  fn alloc(
    &self,
    size: usize,
  ) -> NonNull<u8> {
    self.bump(size)
  }

  // Arena memory is only released by rewind or delete.
  unsafe fn dealloc(
    &self,
    _address: *mut u8,
  ) {
  }

  fn kind(&self) -> AllocatorKind {
    AllocatorKind::Arena
  }

  fn as_arena(&self) -> Option<&Arena> {
    Some(self)
  }
}

impl fmt::Debug for Arena {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Arena")
      .field("capacity", &self.capacity)
      .field("nodes", &self.node_count())
      .field("used", &self.used_bytes())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{align, align::ALIGNMENT};
  use proptest::prelude::*;

  #[test]
  fn test_alloc() {
    let arena = Arena::new(256);

    unsafe {
      let first = arena.alloc(8).as_ptr() as *mut u64;
      *first = 3;

      let second = arena.alloc(12).as_ptr() as *mut u16;
      for i in 0..6 {
        *second.add(i) = (i + 1) as u16;
      }

      assert_eq!(*first, 3);
      for i in 0..6 {
        assert_eq!(*second.add(i), (i + 1) as u16);
      }

      assert!(second as usize > first as usize);
      assert_eq!(second as usize - first as usize, align!(8));
    }
    assert_eq!(arena.used_bytes(), align!(8) + align!(12));
  }

  #[test]
  fn capacity_is_rounded() {
    let arena = Arena::new(ALIGNMENT + 1);

    assert_eq!(arena.capacity(), 2 * ALIGNMENT);
    assert_eq!(arena.reserved_bytes(), 2 * ALIGNMENT);
    assert_eq!(arena.node_count(), 1);
  }

  #[test]
  fn overflow_starts_new_node_and_keeps_old_memory() {
    let arena = Arena::new(1024);

    let first = arena.alloc(800);
    unsafe { ptr::write_bytes(first.as_ptr(), 0x5A, 800) };

    let second = arena.alloc(800);
    unsafe { ptr::write_bytes(second.as_ptr(), 0xC3, 800) };

    assert_eq!(arena.node_count(), 2);
    let kept = unsafe { std::slice::from_raw_parts(first.as_ptr(), 800) };
    assert!(kept.iter().all(|&b| b == 0x5A));
  }

  #[test]
  fn oversized_request_gets_its_own_node() {
    let arena = Arena::new(64);

    let big = arena.alloc(4096);
    unsafe { ptr::write_bytes(big.as_ptr(), 1, 4096) };

    assert_eq!(arena.node_count(), 2);
    assert_eq!(arena.reserved_bytes(), 64 + 4096);
    assert_eq!(arena.capacity(), 64);
  }

  #[test]
  fn rewind_releases_newer_nodes_and_reuses_addresses() {
    let arena = Arena::new(128);
    arena.alloc(64);

    let mark = arena.mark();
    let before: Vec<_> = [32, 64, 200].iter().map(|&n| arena.alloc(n)).collect();
    assert_eq!(arena.node_count(), 3);

    arena.rewind(mark);
    assert_eq!(arena.node_count(), 1);
    assert_eq!(arena.used_bytes(), 64);

    let again = arena.alloc(32);
    assert_eq!(again, before[0]);
  }

  #[test]
  fn rewind_to_raw_address() {
    let arena = Arena::new(64);

    let first = arena.alloc(32);
    arena.alloc(64);
    arena.alloc(64);
    assert_eq!(arena.node_count(), 3);

    arena.rewind_to(first.as_ptr());

    assert_eq!(arena.node_count(), 1);
    assert_eq!(arena.used_bytes(), 0);
    assert_eq!(arena.alloc(16), first);
  }

  #[test]
  fn delete_releases_everything() {
    let arena = Arena::new(64);
    arena.alloc(64);
    arena.alloc(64);

    arena.delete();
    assert_eq!(arena.node_count(), 0);
    assert_eq!(arena.reserved_bytes(), 0);
    assert_eq!(arena.mark(), Mark { depth: 0, position: 0 });

    let block = arena.alloc(8);
    assert_eq!(block.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(arena.node_count(), 1);
  }

  #[test]
  fn dealloc_is_a_noop() {
    let arena = Arena::new(64);
    let block = arena.alloc(16);

    unsafe { arena.dealloc(block.as_ptr()) };

    assert_eq!(arena.used_bytes(), align!(16));
    assert_eq!(arena.kind(), AllocatorKind::Arena);
  }

  #[test]
  fn extend_ignores_blocks_that_are_not_latest() {
    let arena = Arena::new(256);
    let first = arena.alloc(16);
    arena.alloc(16);

    assert!(unsafe { arena.extend(first.as_ptr(), 16, 32) }.is_none());
    assert!(unsafe { arena.extend(ptr::null_mut(), 0, 32) }.is_none());
  }

  #[test]
  fn arena_moves_across_threads() {
    let arena = Arena::new(64);
    arena.alloc(32);

    let used = std::thread::spawn(move || {
      arena.alloc(32);
      arena.used_bytes()
    })
    .join()
    .unwrap();

    assert_eq!(used, align!(32) * 2);
  }

  proptest! {
    #[test]
    fn allocations_within_a_node_are_increasing_and_aligned(
      sizes in proptest::collection::vec(1usize..300, 1..40),
    ) {
      let total: usize = sizes.iter().map(|&s| align!(s)).sum();
      let arena = Arena::new(total);

      let mut previous = None;
      for &size in &sizes {
        let address = arena.alloc(size).as_ptr() as usize;
        prop_assert_eq!(address % ALIGNMENT, 0);
        if let Some(previous) = previous {
          prop_assert!(address > previous);
        }
        previous = Some(address);
      }
      prop_assert_eq!(arena.node_count(), 1);
    }

    #[test]
    fn rewind_replays_identical_addresses(
      prefix in proptest::collection::vec(1usize..200, 0..10),
      sizes in proptest::collection::vec(1usize..600, 1..20),
    ) {
      let total: usize = prefix.iter().chain(&sizes).map(|&s| align!(s)).sum();
      let arena = Arena::new(total);
      for &size in &prefix {
        arena.alloc(size);
      }

      let mark = arena.mark();
      let first: Vec<_> = sizes.iter().map(|&s| arena.alloc(s)).collect();

      arena.rewind(mark);

      let second: Vec<_> = sizes.iter().map(|&s| arena.alloc(s)).collect();
      prop_assert_eq!(first, second);
      prop_assert_eq!(arena.node_count(), 1);
    }
  }
}
