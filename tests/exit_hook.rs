//! Scopes left open on the main thread are ended when the process exits.
//!
//! Runs without the libtest harness so the leaked scope really lives on the
//! main thread: the binary re-executes itself as a child in each exit mode
//! and checks what the child's deferred callbacks printed.

use std::{
  env,
  io::Write,
  process::{self, Command},
};

use scopealloc::local;

const MODE_VAR: &str = "SCOPEALLOC_EXIT_HOOK_MODE";

fn leak_scopes() {
  let outer = local::begin(64);
  outer.defer(|| say("outer closed"));

  let inner = local::begin(64);
  inner.defer(|| {
    let nested = local::begin(32);
    say(&format!("inner closed at depth {}", local::depth()));
    unsafe { local::end(Some(nested)) };
  });
}

fn say(line: &str) {
  let mut out = std::io::stdout();
  let _ = writeln!(out, "{line}");
  let _ = out.flush();
}

fn child(mode: &str) {
  leak_scopes();

  if mode == "exit" {
    process::exit(0);
  }
}

fn run_child(mode: &str) -> Vec<String> {
  let exe = env::current_exe().expect("test binary path");
  let output = Command::new(exe)
    .env(MODE_VAR, mode)
    .output()
    .expect("spawn child");

  assert!(output.status.success(), "child ({mode}) failed: {output:?}");

  String::from_utf8_lossy(&output.stdout)
    .lines()
    .map(str::to_string)
    .collect()
}

fn main() {
  if let Ok(mode) = env::var(MODE_VAR) {
    child(&mode);
    return;
  }

  for mode in ["return", "exit"] {
    let lines = run_child(mode);
    assert_eq!(
      lines,
      vec!["inner closed at depth 3", "outer closed"],
      "exit mode {mode}"
    );
  }

  println!("exit_hook: ok");
}
