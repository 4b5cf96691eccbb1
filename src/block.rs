use core::num::NonZeroUsize;

use crate::error::Corruption;

/// Leading canary stamped into every header.
pub(crate) const MAGIC1: usize = 0xFF00_AA55;
/// Trailing canary stamped into every header.
pub(crate) const MAGIC2: usize = 0xEE11_9966;
/// Link value meaning "no neighbor".
pub(crate) const NIL: usize = usize::MAX;

/// Header prefixed to every block in the arena.
///
/// Links are byte offsets from the arena base, in physical address order,
/// and cover free and used blocks alike. Every bit pattern is a valid
/// `Block`, so a header can be viewed in place over arbitrary bytes and then
/// judged by [`Block::check`].
#[repr(C)]
pub(crate) struct Block {
  pub magic1: usize,
  pub size: usize,
  pub alloc: usize,
  pub prev: usize,
  pub next: usize,
  pub trace: Option<NonZeroUsize>,
  pub magic2: usize,
}

impl Block {
  pub fn new(
    size: usize,
    prev: usize,
    next: usize,
  ) -> Self {
    Self {
      magic1: MAGIC1,
      size,
      alloc: 0,
      prev,
      next,
      trace: None,
      magic2: MAGIC2,
    }
  }

  pub fn is_free(&self) -> bool {
    self.alloc == 0
  }

  /// Checks the canaries and the allocation flag of the header found at
  /// `offset`. Never mutates.
  pub fn check(
    &self,
    offset: usize,
  ) -> Result<(), Corruption> {
    if self.magic1 != MAGIC1 {
      return Err(Corruption::Magic1 { offset });
    }

    if self.magic2 != MAGIC2 {
      return Err(Corruption::Magic2 { offset });
    }

    if self.alloc > 1 {
      return Err(Corruption::IllegalAllocFlag {
        offset,
        value: self.alloc,
      });
    }

    Ok(())
  }
}
