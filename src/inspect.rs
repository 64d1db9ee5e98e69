use std::collections::HashSet;

use crate::{
  arena::Arena,
  block::{HEADER_SIZE, NULL_LINK},
  error::ArenaError,
};

/// One block as seen from outside the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// Offset of the block's header.
  pub offset: u32,
  /// Payload bytes, excluding the header.
  pub size: u32,
  pub is_free: bool,
}

/// Totals over every block in an arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub capacity: usize,
  pub blocks: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub used_bytes: usize,
  pub largest_free: usize,
}

/// Walks the block list in address order.
pub struct Blocks<'a> {
  arena: &'a Arena,
  next: u32,
  remaining: usize,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    if self.next == NULL_LINK || self.remaining == 0 {
      return None;
    }

    if self.next as usize + HEADER_SIZE as usize > self.arena.capacity() {
      log::warn!("block link {} points past the arena", self.next);
      return None;
    }

    let offset = self.next;
    let block = self.arena.block(offset);

    self.next = block.next;
    self.remaining -= 1;

    Some(BlockInfo {
      offset,
      size: block.size,
      is_free: block.is_free(),
    })
  }
}

impl Arena {
  /// Iterates over every block, used and free.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      arena: self,
      next: 0,
      // No more blocks than headers fit, even if a link got overwritten.
      remaining: self.capacity() / HEADER_SIZE as usize,
    }
  }

  pub fn stats(&self) -> HeapStats {
    self.blocks().fold(
      HeapStats {
        capacity: self.capacity(),
        ..HeapStats::default()
      },
      |mut stats, block| {
        let size = block.size as usize;

        stats.blocks += 1;
        if block.is_free {
          stats.free_blocks += 1;
          stats.free_bytes += size;
          stats.largest_free = stats.largest_free.max(size);
        } else {
          stats.used_bytes += size;
        }

        stats
      },
    )
  }

  /// Walks the whole list and verifies every structural invariant.
  ///
  /// Tags are intact, links agree in both directions and with physical
  /// adjacency, blocks cover the buffer exactly, no two free blocks touch,
  /// and the rover sits on a live header.
  pub fn check(&self) -> Result<(), ArenaError> {
    let corrupted = |offset: u32, reason: &'static str| -> Result<(), ArenaError> {
      Err(ArenaError::Corrupted { offset, reason })
    };

    let capacity = self.capacity() as u64;
    let mut offset = 0u32;
    let mut prev = NULL_LINK;
    let mut prev_free = false;
    let mut headers = HashSet::new();

    loop {
      if offset as u64 + HEADER_SIZE as u64 > capacity {
        return corrupted(offset, "header extends past the arena");
      }

      let block = self.block(offset);

      if !block.has_tag() {
        return corrupted(offset, "tag mismatch");
      }
      if block.free_flag() > 1 {
        return corrupted(offset, "free flag is neither set nor clear");
      }
      if block.prev != prev {
        return corrupted(offset, "back link does not point at the previous block");
      }
      if block.is_free() && prev_free {
        return corrupted(offset, "adjacent free blocks were not merged");
      }

      headers.insert(offset);

      let end = block.end(offset);
      match block.next_link() {
        None if end == capacity => break,
        None => return corrupted(offset, "last block does not reach the end of the arena"),
        Some(next) if next as u64 != end => {
          return corrupted(offset, "next link skips or overlaps a block");
        }
        Some(next) => {
          prev = offset;
          prev_free = block.is_free();
          offset = next;
        }
      }
    }

    if !headers.contains(&self.rover) {
      return corrupted(self.rover, "rover is not on a block header");
    }

    Ok(())
  }

  /// Dumps the block list at trace level.
  pub(crate) fn trace_blocks(&self) {
    if !log::log_enabled!(log::Level::Trace) {
      return;
    }

    for (number, info) in self.blocks().enumerate() {
      let block = self.block(info.offset);
      let (prev_link, next_link) = (block.prev_link(), block.next_link());
      log::trace!(
        "block {}: offset {} free {} size {} prev {:?} next {:?}",
        number + 1,
        info.offset,
        info.is_free,
        info.size,
        prev_link,
        next_link,
      );
    }
  }
}
