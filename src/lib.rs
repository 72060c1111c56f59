//! # scopealloc - Arenas and Nested Scopes
//!
//! This crate provides a small family of **allocators** that share one
//! contract, plus a per-thread stack of nested **scopes** built on top of them.
//!
//! ## Overview
//!
//! Every allocator implements [`Allocator`]: `alloc` returns aligned memory or
//! terminates the process, `dealloc` releases it (or does nothing, for region
//! allocators). Client code takes `&dyn Allocator` and never needs to know
//! which kind it was given.
//!
//! ```text
//!   Allocator kinds:
//!
//!   ┌──────────────┐    ┌──────────────────────────┐    ┌──────────────────────────┐
//!   │     Heap     │    │          Arena           │    │          Scope           │
//!   │  malloc/free │◄───│  nodes carved from Heap  │◄───│  Arena + parent + defers │
//!   └──────────────┘    └──────────────────────────┘    └──────────────────────────┘
//!     process-wide        explicit new / delete          begin / end, LIFO per thread
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   scopealloc
//!   ├── align      - ALIGNMENT and the align! macro
//!   ├── allocator  - Allocator trait, realloc, typed helpers
//!   ├── heap       - malloc-backed singleton
//!   ├── node       - one arena block (internal)
//!   ├── arena      - growable bump arena, marks and rewind
//!   ├── defer      - deferred callbacks (internal)
//!   ├── scope      - Scope and the explicit ScopeStack
//!   ├── local      - implicit per-thread ScopeStack
//!   ├── stats      - running average used to size default scopes
//!   ├── config     - ScopeConfig
//!   └── error      - ConfigError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use scopealloc::{Allocator, Arena, ScopeStack};
//!
//! let arena = Arena::new(1024);
//! let mark = arena.mark();
//! let numbers = scopealloc::alloc_array::<u32, _>(&arena, 8);
//! unsafe { numbers.as_ptr().write(42) };
//! arena.rewind(mark);
//!
//! let stack = ScopeStack::new();
//! let scope = stack.begin(0);
//! let text = scope.alloc(64);
//! scope.defer(|| println!("scope closed"));
//! unsafe { stack.end(Some(scope)) };
//! # let _ = text;
//! ```
//!
//! ## How It Works
//!
//! An arena bumps a cursor through its newest node and starts a new node
//! when a request does not fit. Nothing that was handed out ever moves:
//!
//! ```text
//!   Arena chain (oldest → newest):
//!
//!   ┌───────────────────┐   ┌───────────────────┐   ┌───────────────────┐
//!   │ A1 │ A2 │ A3 │    │   │ A4 │ A5 │ A6 │    │   │ A7 │   free       │
//!   └───────────────────┘   └───────────────────┘   └───────────────────┘
//!                                                        ▲
//!                                                     position
//!
//!   rewind(mark inside node 1): nodes 2 and 3 are freed,
//!   node 1's position moves back to the mark.
//! ```
//!
//! Scopes are arenas whose records live in a per-thread factory arena.
//! Ending a scope ends everything opened after it, running each scope's
//! deferred callbacks newest first before its memory goes away:
//!
//! ```text
//!   begin(A) ─ begin(B) ─ begin(C) ─ end(A)
//!
//!   C: defers (LIFO) → free arena
//!   B: defers (LIFO) → free arena
//!   A: defers (LIFO) → free arena
//!   factory rewound to A's record
//! ```
//!
//! `realloc` grows the newest block of an arena in place by moving the
//! cursor back and bumping again, so repeatedly growing the last allocation
//! copies nothing while the node has room.
//!
//! ## Limitations
//!
//! - **No recoverable OOM**: an exhausted heap aborts the process
//! - **No compaction**: arena memory is only reclaimed by rewind or delete
//! - **Single writer**: arenas and scopes are `!Sync`
//!
//! ## Safety
//!
//! Allocators hand out raw pointers; reading or writing through them is
//! `unsafe` and only valid until the owning region is rewound, deleted or
//! ended. Ending scopes is `unsafe` because it invalidates every `&Scope`
//! opened after the one being ended.

pub mod align;
pub mod allocator;
pub mod arena;
pub mod config;
mod defer;
pub mod error;
pub mod heap;
pub mod local;
mod node;
pub mod scope;
pub mod stats;

pub use allocator::{Allocator, AllocatorKind, alloc_array, alloc_array_zeroed, realloc};
pub use arena::{Arena, Mark};
pub use config::ScopeConfig;
pub use error::ConfigError;
pub use heap::{HEAP, Heap};
pub use scope::{Scope, ScopeStack};
