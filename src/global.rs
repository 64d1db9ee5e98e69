//! A process-wide arena behind the classic `malloc`-style calls.
//!
//! The arena itself is not thread-safe, so every call takes one lock around
//! the whole operation. Pointers handed out here are raw addresses into the
//! arena's buffer: any call that grows the arena may move the buffer, after
//! which older pointers no longer refer to their blocks. Code that needs
//! allocations to survive growth should own an [`Arena`] and hold
//! [`Payload`](crate::Payload) handles instead.

use std::{
  ptr,
  sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{Arena, ArenaConfig, ArenaError};

static ARENA: Mutex<Option<Arena>> = Mutex::new(None);

fn lock() -> MutexGuard<'static, Option<Arena>> {
  ARENA.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sets up the process-wide arena with `size` bytes.
pub fn init(size: usize) -> Result<(), ArenaError> {
  init_with_config(ArenaConfig::new(size))
}

pub fn init_with_config(config: ArenaConfig) -> Result<(), ArenaError> {
  let mut arena = lock();

  if arena.is_some() {
    log::warn!("init: arena has already been initialized");
    return Err(ArenaError::AlreadyInitialized);
  }

  *arena = Some(Arena::with_config(config)?);

  Ok(())
}

pub fn is_initialized() -> bool {
  lock().is_some()
}

/// Drops the process-wide arena and its buffer.
///
/// Every pointer handed out so far dangles afterwards.
pub fn reset() {
  lock().take();
}

/// Runs `f` against the process-wide arena, if there is one.
pub fn with_arena<R>(f: impl FnOnce(&mut Arena) -> R) -> Option<R> {
  lock().as_mut().map(f)
}

fn with_initialized<T>(
  call: &str,
  f: impl FnOnce(&mut Arena) -> Result<T, ArenaError>,
) -> Option<T> {
  let Some(result) = with_arena(f) else {
    log::warn!("{}: arena is not initialized", call);
    return None;
  };

  result.ok()
}

/// Allocates `size` bytes. Null on failure.
pub fn malloc(size: usize) -> *mut u8 {
  with_initialized("malloc", |arena| arena.allocate_ptr(size)).unwrap_or(ptr::null_mut())
}

/// Allocates `count * size` zeroed bytes. Null on failure.
pub fn calloc(
  count: usize,
  size: usize,
) -> *mut u8 {
  with_initialized("calloc", |arena| {
    let payload = arena.zero_allocate(count, size)?;
    Ok(arena.as_ptr(payload))
  })
  .unwrap_or(ptr::null_mut())
}

/// Moves `address` into a block of `size` bytes. Null on failure, in which
/// case `address` is still valid.
pub fn realloc(
  address: *mut u8,
  size: usize,
) -> *mut u8 {
  with_initialized("realloc", |arena| arena.resize_ptr(address, size)).unwrap_or(ptr::null_mut())
}

/// Releases `address`. Null is ignored, invalid pointers are logged.
pub fn free(address: *mut u8) {
  with_initialized("free", |arena| arena.release_ptr(address));
}

#[cfg(test)]
mod tests {
  use super::*;

  // Every test here shares the one process-wide arena.
  static SERIAL: Mutex<()> = Mutex::new(());

  fn serial() -> MutexGuard<'static, ()> {
    let guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    reset();
    guard
  }

  #[test]
  fn test_init_twice() {
    let _guard = serial();

    assert_eq!(init(100), Err(ArenaError::SizeOutOfRange {
      size: 100,
      min: 256,
      max: u32::MAX as usize,
    }));
    assert!(!is_initialized());

    init(256).unwrap();
    assert_eq!(init(4096), Err(ArenaError::AlreadyInitialized));
    assert_eq!(with_arena(|arena| arena.capacity()), Some(256));

    reset();
  }

  #[test]
  fn test_uninitialized_calls() {
    let _guard = serial();

    assert!(malloc(16).is_null());
    assert!(calloc(4, 4).is_null());
    free(ptr::null_mut());
  }

  #[test]
  fn test_malloc_free() {
    let _guard = serial();
    init(256).unwrap();

    let p1 = malloc(20);
    let p2 = malloc(40);
    assert!(!p1.is_null() && !p2.is_null());
    assert_ne!(p1, p2);

    unsafe {
      p1.write_bytes(1, 20);
      p2.write_bytes(2, 40);
      assert_eq!(*p1.add(19), 1);
    }

    free(p1);
    free(p1);
    free(p2);

    assert!(malloc(0).is_null());
    assert!(malloc(300).is_null());

    let stats = with_arena(|arena| arena.stats()).unwrap();
    assert_eq!(stats.blocks, 1);
    assert_eq!(stats.free_bytes, 240);

    reset();
  }

  #[test]
  fn test_calloc_realloc() {
    let _guard = serial();
    init(512).unwrap();

    let p = calloc(8, 4);
    assert!(!p.is_null());
    unsafe {
      assert!(std::slice::from_raw_parts(p, 32).iter().all(|byte| *byte == 0));
      p.copy_from(b"rover".as_ptr(), 5);
    }

    let q = realloc(p, 100);
    assert!(!q.is_null());
    assert_eq!(unsafe { std::slice::from_raw_parts(q, 5) }, b"rover");

    assert!(realloc(q, 0).is_null());
    assert_eq!(unsafe { std::slice::from_raw_parts(q, 5) }, b"rover");

    let r = realloc(ptr::null_mut(), 8);
    assert!(!r.is_null());

    reset();
  }
}
