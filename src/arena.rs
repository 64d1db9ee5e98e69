use std::{ptr, ptr::NonNull, slice};

use libc::c_void;

use crate::{
  align_to,
  block::{BLOCK_ALIGN, Block, HEADER_SIZE, NULL_LINK, TAG},
  config::{ArenaConfig, Limits},
  error::ArenaError,
};

/// Handle to the payload of a live allocation.
///
/// It stores the payload's byte offset into the arena, so unlike a raw
/// pointer it stays valid when the arena grows and its buffer moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(u32);

impl Payload {
  pub fn offset(&self) -> u32 {
    self.0
  }

  fn header(&self) -> u32 {
    self.0 - HEADER_SIZE
  }
}

/// A growable arena carved into blocks by a next-fit free list.
///
/// The arena owns one buffer obtained from `malloc`. Every byte of it belongs
/// to exactly one block, and blocks are chained by offset in address order.
/// When no free block is large enough the buffer is `realloc`ed by one growth
/// increment and the new space is appended as a free block.
pub struct Arena {
  memory: NonNull<u8>,
  capacity: u32,
  growth_increment: u32,
  max_capacity: u32,
  pub(crate) rover: u32,
}

// The buffer is owned exclusively by the arena.
unsafe impl Send for Arena {}

impl Arena {
  /// Creates an arena of `size` bytes that grows by `size` bytes at a time.
  pub fn new(size: usize) -> Result<Self, ArenaError> {
    Self::with_config(ArenaConfig::new(size))
  }

  pub fn with_config(config: ArenaConfig) -> Result<Self, ArenaError> {
    let Limits {
      initial_size,
      growth_increment,
      max_capacity,
    } = config.limits()?;

    let address = unsafe { libc::malloc(initial_size as usize) };
    let memory = NonNull::new(address as *mut u8).ok_or(ArenaError::OutOfMemory {
      requested: initial_size as usize,
    })?;

    // Headers are read back as integers, the whole buffer must be initialized.
    unsafe { ptr::write_bytes(memory.as_ptr(), 0, initial_size as usize) };

    let mut arena = Self {
      memory,
      capacity: initial_size,
      growth_increment,
      max_capacity,
      rover: 0,
    };

    arena.write_block(0, Block::free(initial_size - HEADER_SIZE, NULL_LINK, NULL_LINK));

    log::debug!(
      "arena initialized: {} bytes at {:?}, growth increment {}",
      initial_size,
      memory,
      growth_increment
    );

    Ok(arena)
  }

  /// Current size of the backing buffer in bytes.
  pub fn capacity(&self) -> usize {
    self.capacity as usize
  }

  pub fn growth_increment(&self) -> usize {
    self.growth_increment as usize
  }

  pub fn max_capacity(&self) -> usize {
    self.max_capacity as usize
  }

  /// Offset of the block the next search starts from.
  pub fn rover(&self) -> u32 {
    self.rover
  }

  /// Base address of the buffer. Changes whenever the arena grows.
  pub fn base(&self) -> *mut u8 {
    self.memory.as_ptr()
  }

  /// Reserves `size` bytes and returns a handle to them.
  ///
  /// The size is rounded up to the header alignment. Fails with
  /// `InvalidSize` for zero or anything larger than the arena's current
  /// capacity minus one header.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Payload, ArenaError> {
    if size == 0 || size > (self.capacity - HEADER_SIZE) as usize {
      log::warn!("allocate({}): size outside 1-{}", size, self.capacity - HEADER_SIZE);
      return Err(ArenaError::InvalidSize { size });
    }

    let requested = align_to!(size as u32, BLOCK_ALIGN);

    let offset = self.get_free(requested)?;

    if self.block(offset).size > requested {
      self.try_split(offset, requested);
    }

    let mut block = self.block(offset);
    block.set_free(false);
    block.tag = TAG;
    self.write_block(offset, block);

    log::trace!("allocate({}) -> block {} ({} bytes)", size, offset, block.size);
    self.trace_blocks();

    Ok(Payload(offset + HEADER_SIZE))
  }

  /// Reserves `count * size` bytes, all set to zero.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<Payload, ArenaError> {
    let bytes = count
      .checked_mul(size)
      .ok_or(ArenaError::InvalidSize { size: usize::MAX })?;

    let payload = self.allocate(bytes)?;

    unsafe { ptr::write_bytes(self.as_ptr(payload), 0, bytes) };

    Ok(payload)
  }

  /// Returns a block to the free list, merging it with free neighbours.
  ///
  /// Releasing something that is not a live allocation is logged and
  /// reported, and leaves the arena untouched.
  pub fn release(
    &mut self,
    payload: Payload,
  ) -> Result<(), ArenaError> {
    let mut block = match self.header_of(payload) {
      Ok(block) => block,
      Err(err) => {
        log::warn!("release: memory was not previously allocated or a buffer overrun has corrupted it ({err})");
        return Err(err);
      }
    };

    if block.is_free() {
      log::warn!("release: memory at offset {} is already free", payload.offset());
      return Err(ArenaError::DoubleFree {
        offset: payload.offset() as usize,
      });
    }

    let offset = payload.header();
    block.set_free(true);
    self.write_block(offset, block);

    let merged = self.try_merge(offset);

    log::trace!("release block {} -> free block {}", offset, merged);
    self.trace_blocks();

    Ok(())
  }

  /// Moves an allocation into a fresh block of `new_size` bytes.
  ///
  /// Copies as many bytes as fit in both blocks, then releases the old one.
  /// On failure the old allocation is left as it was.
  pub fn resize(
    &mut self,
    payload: Payload,
    new_size: usize,
  ) -> Result<Payload, ArenaError> {
    let old_size = self.usable_size(payload)?;

    let fresh = self.allocate(new_size)?;

    let count = old_size.min(new_size);
    unsafe { ptr::copy_nonoverlapping(self.as_ptr(payload), self.as_ptr(fresh), count) };

    self.release(payload)?;

    Ok(fresh)
  }

  /// Bytes usable through `payload`, at least what was asked for.
  pub fn usable_size(
    &self,
    payload: Payload,
  ) -> Result<usize, ArenaError> {
    let block = self.used_block(payload)?;

    Ok(block.size as usize)
  }

  /// Address of a payload's first byte.
  ///
  /// Only valid until the next call that may grow the arena.
  pub fn as_ptr(
    &self,
    payload: Payload,
  ) -> *mut u8 {
    debug_assert!(payload.offset() <= self.capacity);
    unsafe { self.memory.as_ptr().add(payload.offset() as usize) }
  }

  pub fn bytes(
    &self,
    payload: Payload,
  ) -> Result<&[u8], ArenaError> {
    let len = self.usable_size(payload)?;

    Ok(unsafe { slice::from_raw_parts(self.as_ptr(payload), len) })
  }

  pub fn bytes_mut(
    &mut self,
    payload: Payload,
  ) -> Result<&mut [u8], ArenaError> {
    let len = self.usable_size(payload)?;

    Ok(unsafe { slice::from_raw_parts_mut(self.as_ptr(payload), len) })
  }

  /// Turns a raw payload pointer back into a handle.
  ///
  /// Returns `None` for pointers outside the current buffer. Pointers taken
  /// before the arena last grew may land anywhere and must not be passed in.
  pub fn payload_of(
    &self,
    address: *const u8,
  ) -> Option<Payload> {
    let base = self.memory.as_ptr() as usize;
    let offset = (address as usize).checked_sub(base)?;

    if offset < HEADER_SIZE as usize || offset > self.capacity as usize {
      return None;
    }

    Some(Payload(offset as u32))
  }

  /// [`allocate`](Self::allocate) returning a raw pointer.
  pub fn allocate_ptr(
    &mut self,
    size: usize,
  ) -> Result<*mut u8, ArenaError> {
    let payload = self.allocate(size)?;

    Ok(self.as_ptr(payload))
  }

  /// [`release`](Self::release) taking a raw pointer. Null is a no-op.
  pub fn release_ptr(
    &mut self,
    address: *mut u8,
  ) -> Result<(), ArenaError> {
    if address.is_null() {
      return Ok(());
    }

    let payload = self.payload_from_ptr(address)?;
    self.release(payload)
  }

  /// [`resize`](Self::resize) taking a raw pointer. Null allocates.
  pub fn resize_ptr(
    &mut self,
    address: *mut u8,
    new_size: usize,
  ) -> Result<*mut u8, ArenaError> {
    if address.is_null() {
      return self.allocate_ptr(new_size);
    }

    let payload = self.payload_from_ptr(address)?;
    let fresh = self.resize(payload, new_size)?;

    Ok(self.as_ptr(fresh))
  }

  fn payload_from_ptr(
    &self,
    address: *mut u8,
  ) -> Result<Payload, ArenaError> {
    self.payload_of(address).ok_or_else(|| {
      log::warn!("pointer {:?} does not belong to the arena at {:?}", address, self.memory);
      ArenaError::InvalidTag {
        offset: (address as usize).wrapping_sub(self.memory.as_ptr() as usize),
      }
    })
  }

  /// Header in front of `payload`, provided it looks like one of ours.
  fn header_of(
    &self,
    payload: Payload,
  ) -> Result<Block, ArenaError> {
    let invalid = ArenaError::InvalidTag {
      offset: payload.offset() as usize,
    };

    if payload.offset() < HEADER_SIZE || payload.offset() > self.capacity {
      return Err(invalid);
    }

    let block = self.block(payload.header());

    if !block.has_tag() || block.end(payload.header()) > self.capacity as u64 {
      return Err(invalid);
    }

    Ok(block)
  }

  fn used_block(
    &self,
    payload: Payload,
  ) -> Result<Block, ArenaError> {
    let block = self.header_of(payload)?;

    if block.is_free() {
      return Err(ArenaError::DoubleFree {
        offset: payload.offset() as usize,
      });
    }

    Ok(block)
  }

  pub(crate) fn block(
    &self,
    offset: u32,
  ) -> Block {
    debug_assert!(offset as u64 + HEADER_SIZE as u64 <= self.capacity as u64);
    unsafe { ptr::read_unaligned(self.memory.as_ptr().add(offset as usize) as *const Block) }
  }

  pub(crate) fn write_block(
    &mut self,
    offset: u32,
    block: Block,
  ) {
    debug_assert!(offset as u64 + HEADER_SIZE as u64 <= self.capacity as u64);
    unsafe { ptr::write_unaligned(self.memory.as_ptr().add(offset as usize) as *mut Block, block) };
  }

  /// Reallocates the buffer one growth increment larger and returns the old
  /// capacity, where the new space begins.
  pub(crate) fn grow_buffer(&mut self) -> Result<u32, ArenaError> {
    let old_capacity = self.capacity;
    let new_capacity = old_capacity
      .checked_add(self.growth_increment)
      .filter(|capacity| *capacity <= self.max_capacity)
      .ok_or_else(|| {
        log::warn!(
          "cannot grow arena past {} bytes (limit {})",
          old_capacity,
          self.max_capacity
        );
        ArenaError::OutOfMemory {
          requested: old_capacity as usize + self.growth_increment as usize,
        }
      })?;

    let address = unsafe { libc::realloc(self.memory.as_ptr() as *mut c_void, new_capacity as usize) };
    let Some(memory) = NonNull::new(address as *mut u8) else {
      log::warn!("could not reallocate arena to {} bytes", new_capacity);
      return Err(ArenaError::OutOfMemory {
        requested: new_capacity as usize,
      });
    };

    unsafe {
      ptr::write_bytes(
        memory.as_ptr().add(old_capacity as usize),
        0,
        self.growth_increment as usize,
      )
    };

    log::debug!(
      "arena grown {} -> {} bytes, base {:?} -> {:?}",
      old_capacity,
      new_capacity,
      self.memory,
      memory
    );

    self.memory = memory;
    self.capacity = new_capacity;

    Ok(old_capacity)
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    unsafe { libc::free(self.memory.as_ptr() as *mut c_void) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_arena() {
    let arena = Arena::new(256).unwrap();

    assert_eq!(arena.capacity(), 256);
    assert_eq!(arena.growth_increment(), 256);
    assert_eq!(arena.rover(), 0);
    assert_eq!(arena.block(0), Block::free(240, NULL_LINK, NULL_LINK));
  }

  #[test]
  fn test_size_out_of_range() {
    assert!(matches!(Arena::new(100), Err(ArenaError::SizeOutOfRange { size: 100, .. })));
  }

  #[test]
  fn test_alloc() {
    let mut arena = Arena::new(256).unwrap();

    let first = arena.allocate(8).unwrap();
    unsafe { (arena.as_ptr(first) as *mut u64).write_unaligned(3) };

    let second = arena.allocate(12).unwrap();
    for (i, byte) in arena.bytes_mut(second).unwrap().iter_mut().enumerate() {
      *byte = i as u8 + 1;
    }

    assert_eq!(unsafe { (arena.as_ptr(first) as *const u64).read_unaligned() }, 3);
    assert_eq!(arena.bytes(second).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    assert_eq!(second.offset(), first.offset() + 8 + HEADER_SIZE);

    arena.release(first).unwrap();
    arena.release(second).unwrap();

    assert_eq!(arena.block(0), Block::free(240, NULL_LINK, NULL_LINK));
  }

  #[test]
  fn test_allocate_rounds_to_header_alignment() {
    let mut arena = Arena::new(256).unwrap();

    let payload = arena.allocate(13).unwrap();

    assert_eq!(arena.usable_size(payload).unwrap(), 16);
    assert_eq!(payload.offset() % BLOCK_ALIGN, 0);
  }

  #[test]
  fn test_invalid_size() {
    let mut arena = Arena::new(256).unwrap();

    assert_eq!(arena.allocate(0), Err(ArenaError::InvalidSize { size: 0 }));
    assert_eq!(arena.allocate(300), Err(ArenaError::InvalidSize { size: 300 }));
    assert_eq!(arena.capacity(), 256);

    assert!(arena.allocate(240).is_ok());
  }

  #[test]
  fn test_zero_allocate() {
    let mut arena = Arena::new(256).unwrap();

    let dirty = arena.allocate(64).unwrap();
    arena.bytes_mut(dirty).unwrap().fill(0xAB);
    arena.release(dirty).unwrap();

    let clean = arena.zero_allocate(16, 4).unwrap();
    assert_eq!(clean, dirty);
    assert!(arena.bytes(clean).unwrap().iter().all(|byte| *byte == 0));

    assert_eq!(
      arena.zero_allocate(usize::MAX, 2),
      Err(ArenaError::InvalidSize { size: usize::MAX })
    );
    assert_eq!(arena.zero_allocate(0, 8), Err(ArenaError::InvalidSize { size: 0 }));
  }

  #[test]
  fn test_double_free() {
    let mut arena = Arena::new(256).unwrap();

    let first = arena.allocate(20).unwrap();
    let _second = arena.allocate(20).unwrap();

    arena.release(first).unwrap();
    let before = arena.block(first.header());

    let expected = ArenaError::DoubleFree { offset: first.offset() as usize };
    assert_eq!(arena.release(first), Err(expected.clone()));
    assert_eq!(arena.release(first), Err(expected));
    assert_eq!(arena.block(first.header()), before);
  }

  #[test]
  fn test_invalid_tag() {
    let mut arena = Arena::new(256).unwrap();

    let payload = arena.allocate(32).unwrap();

    assert!(matches!(arena.release(Payload(payload.offset() + 4)), Err(ArenaError::InvalidTag { .. })));
    assert!(matches!(arena.release(Payload(4)), Err(ArenaError::InvalidTag { .. })));
    assert!(matches!(arena.release(Payload(10_000)), Err(ArenaError::InvalidTag { .. })));

    assert_eq!(arena.usable_size(payload).unwrap(), 32);
  }

  #[test]
  fn test_release_ptr() {
    let mut arena = Arena::new(256).unwrap();

    assert_eq!(arena.release_ptr(ptr::null_mut()), Ok(()));

    let address = arena.allocate_ptr(24).unwrap();
    assert_eq!(arena.payload_of(address).map(|p| p.offset()), Some(HEADER_SIZE));

    let mut outside = 0u64;
    let result = arena.release_ptr(&mut outside as *mut u64 as *mut u8);
    assert!(matches!(result, Err(ArenaError::InvalidTag { .. })));

    arena.release_ptr(address).unwrap();
    assert!(arena.block(0).is_free());
  }

  #[test]
  fn test_resize_copies_shorter_length() {
    let mut arena = Arena::new(512).unwrap();

    let small = arena.allocate(8).unwrap();
    arena.bytes_mut(small).unwrap().copy_from_slice(b"abcdefgh");

    let big = arena.resize(small, 64).unwrap();
    assert_ne!(big, small);
    assert_eq!(&arena.bytes(big).unwrap()[..8], b"abcdefgh");
    assert!(matches!(arena.release(small), Err(ArenaError::DoubleFree { .. })));

    let shrunk = arena.resize(big, 4).unwrap();
    assert_eq!(arena.bytes(shrunk).unwrap(), b"abcd");
  }

  #[test]
  fn test_resize_failure_keeps_old_block() {
    let mut arena = Arena::new(256).unwrap();

    let payload = arena.allocate(16).unwrap();
    arena.bytes_mut(payload).unwrap().fill(7);

    assert_eq!(arena.resize(payload, 0), Err(ArenaError::InvalidSize { size: 0 }));
    assert_eq!(arena.bytes(payload).unwrap(), &[7; 16]);
  }

  #[test]
  fn test_resize_ptr_null_allocates() {
    let mut arena = Arena::new(256).unwrap();

    let address = arena.resize_ptr(ptr::null_mut(), 10).unwrap();

    assert!(!address.is_null());
    assert_eq!(arena.usable_size(arena.payload_of(address).unwrap()).unwrap(), 12);
  }
}
