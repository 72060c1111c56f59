use scopealloc::{Allocator, Arena, HEAP, ScopeStack, alloc_array, local, realloc};
use tracing_subscriber::{EnvFilter, fmt};

/// Prints where a block landed and how far it is from the previous one.
fn print_block(
  label: &str,
  block: *mut u8,
  previous: Option<*mut u8>,
) {
  match previous {
    Some(previous) => println!(
      "[{label}] {block:?} (+{} bytes)",
      block as usize - previous as usize
    ),
    None => println!("[{label}] {block:?}"),
  }
}

fn main() {
  // RUST_LOG=scopealloc=trace shows node growth and scope open/close events.
  fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_target(false)
    .init();

  // ----------------------------------------------------------------------
  // 1) A plain arena: blocks are carved in order until a node is full.
  // ----------------------------------------------------------------------
  let arena = Arena::new(1024);
  let first = arena.alloc(800);
  print_block("1a", first.as_ptr(), None);
  let second = arena.alloc(800);
  print_block("1b", second.as_ptr(), None);
  println!(
    "[1] nodes = {}, used = {}, reserved = {}",
    arena.node_count(),
    arena.used_bytes(),
    arena.reserved_bytes()
  );

  // ----------------------------------------------------------------------
  // 2) Marks: everything allocated after a mark goes away on rewind.
  // ----------------------------------------------------------------------
  let mark = arena.mark();
  let numbers = alloc_array::<u64, _>(&arena, 16);
  for i in 0..16 {
    unsafe { numbers.as_ptr().add(i).write(i as u64 * i as u64) };
  }
  println!("[2] numbers[15] = {}", unsafe { numbers.as_ptr().add(15).read() });
  arena.rewind(mark);
  let reused = arena.alloc(16);
  println!(
    "[2] after rewind the same address is handed out again: {}",
    reused.cast::<u64>() == numbers
  );

  // ----------------------------------------------------------------------
  // 3) realloc on the newest block extends it in place.
  // ----------------------------------------------------------------------
  let block = arena.alloc(32);
  let grown = unsafe { realloc(&arena, block.as_ptr(), 32, 96) };
  print_block("3", grown.as_ptr(), Some(block.as_ptr()));

  arena.delete();
  println!("[3] deleted, nodes = {}", arena.node_count());

  // ----------------------------------------------------------------------
  // 4) An explicit scope stack: ending the outer scope ends the inner one,
  //    running deferred callbacks newest first.
  // ----------------------------------------------------------------------
  let stack = ScopeStack::new();
  let outer = stack.begin(256);
  outer.defer(|| println!("[4] outer cleanup"));

  let inner = stack.begin(256);
  inner.defer(|| println!("[4] inner cleanup, registered first"));
  inner.defer(|| println!("[4] inner cleanup, registered second"));

  println!("[4] depth = {}", stack.depth());
  unsafe { stack.end(Some(outer)) };
  println!("[4] depth = {}", stack.depth());

  // ----------------------------------------------------------------------
  // 5) The implicit per-thread stack and a fallback allocator.
  // ----------------------------------------------------------------------
  println!("[5] without a scope: {:?}", local::last_scope_or(&HEAP).kind());

  let scope = local::begin(0);
  println!(
    "[5] with a scope: {:?}, node size = {}",
    local::last_scope_or(&HEAP).kind(),
    scope.arena().capacity()
  );

  let text = alloc_array::<u8, _>(local::last_scope_or(&HEAP), 5);
  unsafe { text.as_ptr().copy_from_nonoverlapping(b"hello".as_ptr(), 5) };
  let address = text.as_ptr() as usize;
  scope.defer(move || {
    let bytes = unsafe { std::slice::from_raw_parts(address as *const u8, 5) };
    println!("[5] still readable at cleanup: {}", String::from_utf8_lossy(bytes));
  });

  // Left open on purpose: the exit hook ends it when main returns.
  println!("\n[6] End of demo.");
}
