//! Free-list bookkeeping over the headers embedded in an [`Arena`].
//!
//! ```text
//!   rover
//!     │
//!     ▼
//!   ┌────┬──────┬────┬──────────┬────┬───┬────┬─────────────┐
//!   │ H0 │ used │ H1 │   free   │ H2 │ u │ H3 │    free     │
//!   └────┴──────┴────┴──────────┴────┴───┴────┴─────────────┘
//!     │  next ▲ │      next ▲ │     next ▲ │
//!     └───────┼─┘  ─────────┘ └──────────┘ └──► NULL_LINK
//!             └── prev links mirror every next link
//! ```
//!
//! A search starts at the rover and walks `next` links, wrapping from the
//! tail back to offset 0. Splitting carves a free suffix off a block,
//! merging folds free neighbours into one block.

use crate::{
  arena::Arena,
  block::{Block, HEADER_SIZE, NULL_LINK},
  error::ArenaError,
};

impl Arena {
  /// Next-fit search for a free block with at least `size` payload bytes.
  ///
  /// The rover is left on the block returned. Once that block is used the
  /// next search steps past it.
  pub(crate) fn find_free(
    &mut self,
    size: u32,
  ) -> Option<u32> {
    let start = self.rover;
    let mut offset = start;

    log::trace!("finding free block of {} bytes, rover at {}", size, start);

    loop {
      let block = self.block(offset);

      if block.is_free() && block.size >= size {
        self.rover = offset;
        return Some(offset);
      }

      offset = block.next_link().unwrap_or(0);

      if offset == start {
        log::trace!("no free block of {} bytes", size);
        return None;
      }
    }
  }

  /// Like [`find_free`](Self::find_free), growing the arena until a block
  /// fits or growth fails.
  pub(crate) fn get_free(
    &mut self,
    size: u32,
  ) -> Result<u32, ArenaError> {
    loop {
      if let Some(offset) = self.find_free(size) {
        return Ok(offset);
      }

      self.grow()?;
    }
  }

  /// Grows the buffer and links the new space in as a free block at the
  /// tail. A free tail absorbs it so no two free blocks end up adjacent.
  pub(crate) fn grow(&mut self) -> Result<(), ArenaError> {
    let old_capacity = self.grow_buffer()?;
    let size = self.capacity() as u32 - old_capacity - HEADER_SIZE;

    let tail_offset = self.tail();
    let mut tail = self.block(tail_offset);

    if tail.is_free() {
      tail.size += HEADER_SIZE + size;
      self.write_block(tail_offset, tail);
      log::trace!("grown space merged into free tail {} ({} bytes)", tail_offset, tail.size);
    } else {
      self.write_block(old_capacity, Block::free(size, tail_offset, NULL_LINK));
      tail.next = old_capacity;
      self.write_block(tail_offset, tail);
      log::trace!("grown space linked as block {} ({} bytes)", old_capacity, size);
    }

    Ok(())
  }

  /// Carves a free block off the end of `offset` when what is left after
  /// `requested` bytes can hold a header and some payload.
  pub(crate) fn try_split(
    &mut self,
    offset: u32,
    requested: u32,
  ) {
    let mut block = self.block(offset);
    let excess = block.size - requested;

    if excess <= HEADER_SIZE {
      log::trace!("block {} kept whole, {} bytes of slack", offset, excess);
      return;
    }

    let split_offset = offset + HEADER_SIZE + requested;
    let split = Block::free(excess - HEADER_SIZE, offset, block.next);
    self.write_block(split_offset, split);

    if let Some(next_offset) = block.next_link() {
      self.set_prev(next_offset, split_offset);
    }

    block.next = split_offset;
    block.size = requested;
    self.write_block(offset, block);

    log::trace!("split block {} at {} ({} bytes free)", offset, split_offset, split.size);
  }

  /// Merges the freshly freed block at `offset` with whichever direct
  /// neighbours are free. Returns the offset of the resulting block.
  pub(crate) fn try_merge(
    &mut self,
    offset: u32,
  ) -> u32 {
    let mut block = self.block(offset);

    if let Some(next_offset) = block.next_link() {
      let next = self.block(next_offset);

      if next.is_free() {
        block.size += HEADER_SIZE + next.size;
        block.next = next.next;
        self.write_block(offset, block);

        if let Some(after) = next.next_link() {
          self.set_prev(after, offset);
        }
        self.retarget_rover(next_offset, offset);

        log::trace!("merged block {} into {}", next_offset, offset);
      }
    }

    let Some(prev_offset) = block.prev_link() else {
      return offset;
    };

    let mut prev = self.block(prev_offset);
    if !prev.is_free() {
      return offset;
    }

    prev.size += HEADER_SIZE + block.size;
    prev.next = block.next;
    self.write_block(prev_offset, prev);

    if let Some(after) = block.next_link() {
      self.set_prev(after, prev_offset);
    }
    self.retarget_rover(offset, prev_offset);

    log::trace!("merged block {} into {}", offset, prev_offset);

    prev_offset
  }

  /// Last block in the list.
  pub(crate) fn tail(&self) -> u32 {
    let mut offset = 0;

    while let Some(next) = self.block(offset).next_link() {
      offset = next;
    }

    offset
  }

  fn set_prev(
    &mut self,
    offset: u32,
    prev: u32,
  ) {
    let mut block = self.block(offset);
    block.prev = prev;
    self.write_block(offset, block);
  }

  // An absorbed header is dead memory, the rover must not rest on it.
  fn retarget_rover(
    &mut self,
    absorbed: u32,
    survivor: u32,
  ) {
    if self.rover == absorbed {
      self.rover = survivor;
    }
  }
}
