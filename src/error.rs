//! Error type shared by every arena operation.

use thiserror::Error;

/// Everything that can go wrong while managing an arena.
///
/// Configuration errors (`AlreadyInitialized`, `SizeOutOfRange`) leave no
/// trace. `OutOfMemory` leaves the arena as it was before the call.
/// `InvalidTag` and `DoubleFree` come from caller misuse and are no-ops.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
  /// The process-wide arena was already set up.
  #[error("arena has already been initialized")]
  AlreadyInitialized,

  /// Requested arena size is outside the supported range.
  #[error("arena size {size} should be in range {min}-{max} bytes")]
  SizeOutOfRange { size: usize, min: usize, max: usize },

  /// Zero-byte request, or more than the arena could ever hold.
  #[error("invalid allocation size {size}")]
  InvalidSize { size: usize },

  /// The backing buffer could not be obtained or grown.
  #[error("out of memory while reserving {requested} bytes")]
  OutOfMemory { requested: usize },

  /// Memory was not previously allocated, or an overrun corrupted it.
  #[error("no valid block header for payload at offset {offset}")]
  InvalidTag { offset: usize },

  /// The block is already free.
  #[error("block at offset {offset} is already free")]
  DoubleFree { offset: usize },

  /// The block list failed a consistency check.
  #[error("corrupted block at offset {offset}: {reason}")]
  Corrupted { offset: u32, reason: &'static str },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_messages() {
    let err = ArenaError::SizeOutOfRange { size: 12, min: 256, max: 4_294_967_295 };
    assert_eq!(err.to_string(), "arena size 12 should be in range 256-4294967295 bytes");

    let err = ArenaError::DoubleFree { offset: 16 };
    assert_eq!(err.to_string(), "block at offset 16 is already free");
  }
}
