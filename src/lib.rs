//! # bufalloc - A Fixed-Buffer Memory Allocator
//!
//! This crate provides a **first-fit block allocator** that carves every
//! allocation out of one caller-supplied byte buffer. It never asks the
//! operating system for memory, so heap usage is bounded by the buffer and
//! can be audited at any time.
//!
//! ## Overview
//!
//! ```text
//!   Arena Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                        CALLER'S BUFFER                               │
//!   │                                                                      │
//!   │   ┌─────┬──────┬─────┬──────────┬─────┬─────┬─────┬───────────────┐  │
//!   │   │ HDR │  A1  │ HDR │   free   │ HDR │ A2  │ HDR │     free      │  │
//!   │   └─────┴──────┴─────┴──────────┴─────┴─────┴─────┴───────────────┘  │
//!   │     ▲  ─next──▶  ▲  ◀──prev──    ▲                                   │
//!   │     │            │               │                                   │
//!   │   first        every block, free or used, sits in one chain          │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Allocation takes the first free block that fits and splits off the rest.
//!   Release merges the block with free neighbors straight away.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   bufalloc
//!   ├── align      - Alignment macro (align_to!)
//!   ├── arena      - Arena: allocate, release, verify, status
//!   ├── block      - Block header layout and canaries (internal)
//!   ├── config     - Alignment unit, eager verification, capture
//!   ├── error      - Corruption kinds and the abort path
//!   ├── global     - BufferAlloc, the #[global_allocator] wrapper
//!   └── trace      - Pluggable call-site capture
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use bufalloc::Arena;
//!
//! let mut memory = [0u8; 1024];
//! let mut arena = Arena::new(&mut memory);
//!
//! let ptr = arena.allocate(100).expect("arena exhausted");
//! unsafe { ptr.as_ptr().write_bytes(0xAB, 100) };
//!
//! arena.release(ptr.as_ptr());
//! assert!(arena.verify().is_ok());
//! ```
//!
//! ## Block Header
//!
//! ```text
//!   ┌──────────────────────────────────────────┬──────────────────────┐
//!   │               Block Header               │      User Data       │
//!   │  magic1 │ size │ alloc │ prev │ next │   │                      │
//!   │  trace  │ magic2                         │   size bytes usable  │
//!   └──────────────────────────────────────────┴──────────────────────┘
//!                                              ▲
//!                                              └── Pointer returned to user
//! ```
//!
//! The two canaries bracket the mutable fields; a write running off the end
//! of one allocation lands on the next header's leading canary and is caught
//! by the next verification or release.
//!
//! ## Failure Model
//!
//! - **Out of memory** is ordinary: [`Arena::allocate`] returns `None`.
//! - **Corruption or misuse** (double release, foreign pointer, damaged
//!   header, broken chain) aborts the process after printing a diagnostic.
//!   [`Arena::verify`] reports the same conditions without aborting.
//!
//! ## Limitations
//!
//! - **Single-threaded**: an [`Arena`] needs `&mut` access; [`BufferAlloc`]
//!   puts it behind a spin lock.
//! - **Fixed size**: the buffer never grows or shrinks.
//! - **First-fit**: the search stops at the first block that fits, which can
//!   leave avoidable fragmentation under adversarial patterns.
//! - **One alignment unit** per arena; larger alignments are refused.

pub mod align;
mod arena;
mod block;
mod config;
mod error;
mod global;
pub mod trace;

pub use align::DEFAULT_ALIGN;
pub use arena::{Arena, BlockInfo, Blocks, Stats, Status};
pub use config::{Config, ConfigError, Verify};
pub use error::Corruption;
pub use global::BufferAlloc;
pub use trace::{BacktraceTracer, NoTrace, Tracer};
