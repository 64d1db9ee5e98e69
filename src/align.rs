/// Rounds `value` up to the next multiple of `align`, which must be a power
/// of two.
///
/// # Examples
///
/// ```rust
/// use rovalloc::align_to;
///
/// assert_eq!(align_to!(13u32, 4), 16);
/// assert_eq!(align_to!(16u32, 4), 16);
/// assert_eq!(align_to!(1usize, 8), 8);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}
