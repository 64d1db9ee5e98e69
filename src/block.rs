use std::mem;

/// Marker stamped into every header this allocator writes.
pub const TAG: u16 = 0xBEEF;

/// Link value meaning "no neighbour".
pub const NULL_LINK: u32 = u32::MAX;

/// Width of a header in bytes. Payloads start right after it.
pub const HEADER_SIZE: u32 = mem::size_of::<Block>() as u32;

/// Natural alignment of a header. Requested sizes are rounded up to it.
pub const BLOCK_ALIGN: u32 = mem::align_of::<Block>() as u32;

/// Header embedded in the arena in front of every payload.
///
/// Links are byte offsets into the arena, not addresses: the backing buffer
/// can move when it grows, offsets survive that.
///
/// ```text
///   offset   0      2       3       4        8        12       16
///            ┌──────┬───────┬───────┬────────┬────────┬────────┐
///            │ tag  │ free  │  pad  │  size  │  prev  │  next  │
///            │ u16  │  u8   │  u8   │  u32   │  u32   │  u32   │
///            └──────┴───────┴───────┴────────┴────────┴────────┘
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
  pub tag: u16,
  free: u8,
  _pad: u8,
  pub size: u32,
  pub prev: u32,
  pub next: u32,
}

impl Block {
  pub fn new(
    size: u32,
    is_free: bool,
    prev: u32,
    next: u32,
  ) -> Self {
    Self {
      tag: TAG,
      free: is_free as u8,
      _pad: 0,
      size,
      prev,
      next,
    }
  }

  pub fn free(
    size: u32,
    prev: u32,
    next: u32,
  ) -> Self {
    Self::new(size, true, prev, next)
  }

  pub fn is_free(&self) -> bool {
    self.free != 0
  }

  pub fn set_free(
    &mut self,
    is_free: bool,
  ) {
    self.free = is_free as u8;
  }

  pub fn has_tag(&self) -> bool {
    self.tag == TAG
  }

  /// Raw value of the free flag, anything but 0 or 1 means a stray write.
  pub fn free_flag(&self) -> u8 {
    self.free
  }

  pub fn prev_link(&self) -> Option<u32> {
    link(self.prev)
  }

  pub fn next_link(&self) -> Option<u32> {
    link(self.next)
  }

  /// Offset one past the end of this block's payload.
  pub fn end(
    &self,
    offset: u32,
  ) -> u64 {
    offset as u64 + HEADER_SIZE as u64 + self.size as u64
  }
}

fn link(offset: u32) -> Option<u32> {
  (offset != NULL_LINK).then_some(offset)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_header_layout() {
    assert_eq!(HEADER_SIZE, 16);
    assert_eq!(BLOCK_ALIGN, 4);
    assert_eq!(mem::offset_of!(Block, size), 4);
    assert_eq!(mem::offset_of!(Block, prev), 8);
    assert_eq!(mem::offset_of!(Block, next), 12);
  }

  #[test]
  fn test_links() {
    let block = Block::free(100, NULL_LINK, 116);

    assert!(block.is_free());
    assert!(block.has_tag());
    assert_eq!(block.prev_link(), None);
    assert_eq!(block.next_link(), Some(116));
    assert_eq!(block.end(0), 116);
  }

  #[test]
  fn test_set_free() {
    let mut block = Block::new(8, false, 0, NULL_LINK);
    assert!(!block.is_free());

    block.set_free(true);
    assert!(block.is_free());
    assert_eq!(block.free_flag(), 1);
  }
}
