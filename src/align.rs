/// Default alignment unit: the machine word.
pub const DEFAULT_ALIGN: usize = core::mem::size_of::<usize>();

/// Rounds `value` up to the next multiple of `unit`, which must be a power
/// of two.
///
/// # Examples
///
/// ```rust
/// use bufalloc::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(16, 8), 16);
/// assert_eq!(align_to!(0, 16), 0);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $unit:expr) => {
    ($value + $unit - 1) & !($unit - 1)
  };
}
