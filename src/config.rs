use crate::error::ArenaError;

/// Smallest arena accepted.
pub const MIN_ARENA_SIZE: usize = 256;

/// Largest arena accepted, offsets are 32 bits wide.
pub const MAX_ARENA_SIZE: usize = u32::MAX as usize;

/// Settings for an [`Arena`](crate::Arena).
///
/// Only the initial size is required. The growth increment defaults to the
/// initial size and growth is capped at [`MAX_ARENA_SIZE`] unless a smaller
/// ceiling is given.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
  /// Bytes reserved up front, headers included.
  pub initial_size: usize,
  /// Bytes added on every growth step. `None` reuses `initial_size`.
  pub growth_increment: Option<usize>,
  /// Growth past this many bytes fails with `OutOfMemory`.
  pub max_capacity: usize,
}

/// A config that passed validation, narrowed to 32-bit sizes.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Limits {
  pub initial_size: u32,
  pub growth_increment: u32,
  pub max_capacity: u32,
}

impl ArenaConfig {
  pub fn new(initial_size: usize) -> Self {
    ArenaConfig {
      initial_size,
      growth_increment: None,
      max_capacity: MAX_ARENA_SIZE,
    }
  }

  pub fn growth_increment(
    mut self,
    increment: usize,
  ) -> Self {
    self.growth_increment = Some(increment);
    self
  }

  pub fn max_capacity(
    mut self,
    max_capacity: usize,
  ) -> Self {
    self.max_capacity = max_capacity;
    self
  }

  pub(crate) fn limits(&self) -> Result<Limits, ArenaError> {
    let initial_size = check_range(self.initial_size, MIN_ARENA_SIZE, MAX_ARENA_SIZE)?;
    let growth_increment = check_range(
      self.growth_increment.unwrap_or(self.initial_size),
      MIN_ARENA_SIZE,
      MAX_ARENA_SIZE,
    )?;
    let max_capacity = check_range(self.max_capacity, self.initial_size, MAX_ARENA_SIZE)?;

    Ok(Limits {
      initial_size,
      growth_increment,
      max_capacity,
    })
  }
}

fn check_range(
  size: usize,
  min: usize,
  max: usize,
) -> Result<u32, ArenaError> {
  if size < min || size > max {
    return Err(ArenaError::SizeOutOfRange { size, min, max });
  }

  Ok(size as u32)
}
