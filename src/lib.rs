//! # rovalloc - A Next-Fit Arena Allocator
//!
//! This crate provides a general-purpose allocator that manages **one
//! contiguous, growable arena** with a single free list searched next-fit.
//! It can stand in for the platform's `malloc`/`calloc`/`realloc`/`free`.
//!
//! ## Overview
//!
//! ```text
//!   Arena:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         BACKING BUFFER                               │
//!   │                                                                      │
//!   │   ┌───┬──────┬───┬──────────┬───┬────┬───┬─────────────────────────┐ │
//!   │   │ H │ used │ H │   free   │ H │used│ H │          free           │ │
//!   │   └───┴──────┴───┴──────────┴───┴────┴───┴─────────────────────────┘ │
//!   │   ▲                ▲                                               ▲ │
//!   │   │                │                                               │ │
//!   │ offset 0         rover                                       capacity│
//!   │                (next search)                                         │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Every byte belongs to exactly one block. Blocks are linked by offset,
//!   so the buffer can move when it grows.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rovalloc
//!   ├── align      - align_to! macro
//!   ├── arena      - Arena, Payload and the allocate/release surface
//!   ├── block      - Block header layout (internal)
//!   ├── config     - ArenaConfig and size limits
//!   ├── error      - ArenaError
//!   ├── global     - process-wide malloc/calloc/realloc/free
//!   ├── inspect    - block iteration, stats and consistency checks
//!   └── ledger     - next-fit search, split, merge, growth (internal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rovalloc::Arena;
//!
//! let mut arena = Arena::new(4096).unwrap();
//!
//! let payload = arena.allocate(12).unwrap();
//! arena.bytes_mut(payload).unwrap()[..5].copy_from_slice(b"hello");
//!
//! // Growth may move the buffer, the handle stays valid.
//! let big = arena.allocate(4080).unwrap();
//! assert_eq!(arena.capacity(), 8192);
//! assert_eq!(&arena.bytes(payload).unwrap()[..5], b"hello");
//!
//! arena.release(big).unwrap();
//! arena.release(payload).unwrap();
//! assert_eq!(arena.stats().blocks, 1);
//! ```
//!
//! ## How It Works
//!
//! Each block starts with a 16 byte header:
//!
//! ```text
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ tag: 0xBEEF     │  │  ┌──────────────────────────┐  │
//!   │  │ free: 0/1       │  │  │                          │  │
//!   │  │ size: N         │  │  │     N bytes usable       │  │
//!   │  │ prev: offset    │  │  │                          │  │
//!   │  │ next: offset    │  │  └──────────────────────────┘  │
//!   │  └─────────────────┘  │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Payload returned to the caller
//! ```
//!
//! - **Allocate**: search from the rover for a free block big enough,
//!   wrapping to the start once. If nothing fits, `realloc` the buffer by one
//!   growth increment and search again. Split off the unused tail when it can
//!   hold a header and some payload.
//! - **Release**: check the tag and the free flag, mark the block free and
//!   merge it with free neighbours on either side.
//! - **Zero-allocate** clears the payload, **resize** moves it to a fresh
//!   block copying the shorter of both lengths.
//!
//! ## Limitations
//!
//! - **Single-threaded**: an [`Arena`] is `Send` but not `Sync`. The
//!   [`global`] functions serialize callers with a mutex.
//! - **Moving buffer**: raw pointers into an arena are invalidated by growth.
//!   [`Payload`] handles are not.
//! - **Alignment**: payloads are aligned to the header's 4 bytes, and only
//!   when the arena size and growth increment are multiples of 4.
//! - **Tag check**: the tag is not cleared on release, a second release is
//!   caught by the free flag alone. Overruns that keep the tag intact are not
//!   detected.

pub mod align;
mod arena;
mod block;
mod config;
mod error;
pub mod global;
mod inspect;
mod ledger;

pub use arena::{Arena, Payload};
pub use block::{HEADER_SIZE, NULL_LINK, TAG};
pub use config::{ArenaConfig, MAX_ARENA_SIZE, MIN_ARENA_SIZE};
pub use error::ArenaError;
pub use inspect::{BlockInfo, Blocks, HeapStats};
