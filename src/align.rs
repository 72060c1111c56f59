use std::mem;

/// Alignment of every pointer handed out by this crate's allocators.
///
/// Matches the platform's maximum scalar alignment, which is also what
/// `malloc` guarantees for the node blocks arenas are carved from.
#[cfg(target_os = "linux")]
pub const ALIGNMENT: usize = mem::align_of::<libc::max_align_t>();

/// Alignment of every pointer handed out by this crate's allocators.
#[cfg(not(target_os = "linux"))]
pub const ALIGNMENT: usize = 2 * mem::size_of::<usize>();

const _: () = assert!(ALIGNMENT.is_power_of_two());

/// Rounds the given size up to the allocation alignment.
///
/// # Examples
///
/// ```rust
/// use scopealloc::{align, align::ALIGNMENT};
///
/// assert_eq!(align!(1), ALIGNMENT);
/// assert_eq!(align!(ALIGNMENT + 1), 2 * ALIGNMENT);
/// assert_eq!(align!(0), 0);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Overflow-checked form of [`align!`].
///
/// Sizes that cannot be rounded without wrapping can never be satisfied, so
/// they take the same exit as an exhausted heap.
pub fn aligned_size(size: usize) -> usize {
  match size.checked_add(ALIGNMENT - 1) {
    Some(padded) => padded & !(ALIGNMENT - 1),
    None => crate::heap::out_of_memory(size),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(expected, aligned_size(size));
      }
    }
  }

  #[test]
  fn alignment_covers_scalars() {
    assert!(ALIGNMENT >= mem::align_of::<u64>());
    assert!(ALIGNMENT >= mem::align_of::<f64>());
    assert!(ALIGNMENT >= mem::align_of::<usize>());
  }
}
