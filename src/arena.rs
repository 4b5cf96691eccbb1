use std::{fmt, marker::PhantomData, mem, num::NonZeroUsize, ptr, ptr::NonNull};

use crate::{
  align_to,
  block::{Block, NIL},
  config::Config,
  error::{Corruption, fatal},
  trace::{NoTrace, Tracer},
};

fn link(value: usize) -> Option<usize> {
  (value != NIL).then_some(value)
}

/// Usage counters, updated on every successful allocate and release.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
  /// Payload bytes currently handed out (after rounding).
  pub used: usize,
  /// Highest `used` since creation or the last [`Arena::reset_peak`].
  pub max_used: usize,
  /// Blocks currently allocated.
  pub live: usize,
  /// Highest `live` since creation or the last [`Arena::reset_peak`].
  pub max_live: usize,
  /// Successful allocations since creation.
  pub allocs: usize,
  /// Successful releases since creation.
  pub releases: usize,
}

/// One block of the chain, as seen by [`Arena::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Offset of the header from the arena base.
  pub offset: usize,
  pub prev: Option<usize>,
  pub next: Option<usize>,
  /// Payload bytes following the header.
  pub size: usize,
  pub allocated: bool,
  trace: Option<NonZeroUsize>,
}

/// First-fit allocator carving blocks out of one borrowed byte buffer.
///
/// Every block, free or used, is prefixed by a header and chained to its
/// physical neighbors. Free neighbors are merged as soon as a block is
/// released, so the chain never holds two free blocks in a row.
///
/// Mutating operations take `&mut self`; sharing an arena between threads
/// needs an outer lock (see [`BufferAlloc`](crate::BufferAlloc)).
///
/// Any corruption found by [`Arena::allocate`] or [`Arena::release`] aborts
/// the process. [`Arena::verify`] reports it instead.
pub struct Arena<'a, T: Tracer = NoTrace> {
  base: NonNull<u8>,
  len: usize,
  hdr: usize,
  first: Option<usize>,
  config: Config,
  tracer: T,
  stats: Stats,
  _buf: PhantomData<&'a mut [u8]>,
}

// The arena is the only path to its buffer.
unsafe impl<T: Tracer + Send> Send for Arena<'_, T> {}

impl<'a> Arena<'a, NoTrace> {
  pub fn new(buf: &'a mut [u8]) -> Self {
    Self::with_config(buf, Config::default())
  }

  pub fn with_config(
    buf: &'a mut [u8],
    config: Config,
  ) -> Self {
    Self::with_tracer(buf, config, NoTrace)
  }
}

impl<'a, T: Tracer> Arena<'a, T> {
  /// Binds an arena to `buf`.
  ///
  /// The start of the buffer is moved up to the alignment unit and the end
  /// trimmed down to it. The whole buffer is zeroed, then covered by a
  /// single free block. A buffer without room for one header and one unit
  /// gives an arena on which every allocation fails.
  pub fn with_tracer(
    buf: &'a mut [u8],
    config: Config,
    tracer: T,
  ) -> Self {
    let align = config.align();
    let total = buf.len();
    let start = buf.as_ptr() as usize;
    let skip = (align_to!(start, align) - start).min(buf.len());

    buf.fill(0);

    let region = &mut buf[skip..];
    let len = region.len() & !(align - 1);
    let base = NonNull::from(region).cast::<u8>();
    let hdr = align_to!(mem::size_of::<Block>(), align);

    let mut arena = Self {
      base,
      len,
      hdr,
      first: None,
      config,
      tracer,
      stats: Stats::default(),
      _buf: PhantomData,
    };

    if len >= hdr + align {
      arena.stamp(0, Block::new(len - hdr, NIL, NIL));
      arena.first = Some(0);
      log::debug!("arena of {len} bytes at {:p}, header {hdr} bytes", arena.base);
    } else {
      log::debug!("buffer of {total} bytes too small for an arena");
    }

    arena
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Bytes covered by the chain: headers plus payloads.
  pub fn capacity(&self) -> usize {
    self.len
  }

  /// Bytes taken by every block header.
  pub fn header_size(&self) -> usize {
    self.hdr
  }

  pub fn stats(&self) -> Stats {
    self.stats
  }

  /// Drops the peak counters to the current usage.
  pub fn reset_peak(&mut self) {
    self.stats.max_used = self.stats.used;
    self.stats.max_live = self.stats.live;
  }

  pub fn tracer(&self) -> &T {
    &self.tracer
  }

  /// Hands out at least `size` bytes, rounded up to the alignment unit.
  ///
  /// Returns `None` when no free block is large enough. Aborts if the chain
  /// turns out to be corrupt.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    self.try_allocate(size).unwrap_or_else(|err| fatal(&err))
  }

  /// Gives back a pointer returned by [`Arena::allocate`]. Null is ignored.
  ///
  /// Aborts on a pointer outside the arena, a double release, or a damaged
  /// header.
  pub fn release(
    &mut self,
    ptr: *mut u8,
  ) {
    if let Err(err) = self.try_release(ptr) {
      fatal(&err);
    }
  }

  /// Walks the whole chain and reports the first inconsistency found.
  /// Never mutates.
  pub fn verify(&self) -> Result<(), Corruption> {
    let Some(first) = self.first else {
      return Ok(());
    };

    let block = self.block(first)?;
    block.check(first)?;

    if block.prev != NIL {
      return Err(Corruption::FirstHasPrev { prev: block.prev });
    }

    let mut prev = first;
    let mut prev_free = block.is_free();
    let mut cursor = self.successor(first, block)?;

    while let Some(offset) = cursor {
      let block = self.block(offset)?;
      block.check(offset)?;

      if block.prev != prev {
        return Err(Corruption::BrokenBackLink {
          offset,
          expected: prev,
          found: block.prev,
        });
      }

      if prev_free && block.is_free() {
        return Err(Corruption::Uncoalesced { offset: prev });
      }

      prev = offset;
      prev_free = block.is_free();
      cursor = self.successor(offset, block)?;
    }

    Ok(())
  }

  /// Iterates the chain in address order. Stops early at a damaged header.
  pub fn blocks(&self) -> Blocks<'_, 'a, T> {
    Blocks {
      arena: self,
      cursor: self.first,
    }
  }

  /// Total payload bytes in free blocks.
  pub fn free_bytes(&self) -> usize {
    self
      .blocks()
      .filter(|b| !b.allocated)
      .map(|b| b.size)
      .sum()
  }

  /// Size of the largest request that would currently succeed.
  pub fn largest_free(&self) -> usize {
    self
      .blocks()
      .filter(|b| !b.allocated)
      .map(|b| b.size & !(self.config.align() - 1))
      .max()
      .unwrap_or(0)
  }

  /// Human-readable dump of the chain.
  pub fn status(&self) -> Status<'_, 'a, T> {
    Status { arena: self }
  }

  pub(crate) fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, Corruption> {
    let Some(first) = self.first else {
      return Ok(None);
    };

    if size > self.len {
      return Ok(None);
    }

    let align = self.config.align();
    let len = align_to!(size, align);

    let mut found = None;
    let mut cursor = Some(first);

    while let Some(offset) = cursor {
      let block = self.block(offset)?;

      if block.is_free() && block.size >= len {
        block.check(offset)?;
        found = Some((offset, block.size, block.next));
        break;
      }

      cursor = self.successor(offset, block)?;
    }

    let Some((offset, size_found, next)) = found else {
      log::trace!("allocate({size}): no free block of {len} bytes");
      return Ok(None);
    };

    if size_found - len >= self.hdr + align {
      let split = offset + self.hdr + len;
      self.stamp(split, Block::new(size_found - len - self.hdr, offset, next));

      if let Some(next) = link(next) {
        self.block_mut(next)?.prev = split;
      }

      let block = self.block_mut(offset)?;
      block.size = len;
      block.next = split;

      log::debug!("split block {offset:#x}, remainder at {split:#x}");
    }

    let trace = if self.config.capture() {
      self.tracer.capture()
    } else {
      None
    };

    let block = self.block_mut(offset)?;
    block.alloc = 1;
    block.trace = trace;
    let granted = block.size;

    self.stats.used += granted;
    self.stats.live += 1;
    self.stats.allocs += 1;
    self.stats.max_used = self.stats.max_used.max(self.stats.used);
    self.stats.max_live = self.stats.max_live.max(self.stats.live);

    if self.config.verify().after_alloc() {
      self.verify()?;
    }

    log::trace!("allocate({size}) -> block {offset:#x} of {granted} bytes");

    Ok(Some(unsafe { self.base.add(offset + self.hdr) }))
  }

  pub(crate) fn try_release(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), Corruption> {
    if ptr.is_null() || self.first.is_none() {
      return Ok(());
    }

    let addr = ptr as usize;
    let base = self.base.as_ptr() as usize;

    if addr < base + self.hdr || addr > base + self.len {
      return Err(Corruption::ForeignPointer { addr });
    }

    let mut offset = addr - base - self.hdr;

    let block = self
      .block(offset)
      .map_err(|_| Corruption::ForeignPointer { addr })?;
    block.check(offset)?;

    if block.is_free() {
      return Err(Corruption::DoubleRelease { addr });
    }

    let (size, prev, trace) = (block.size, block.prev, block.trace);

    let block = self.block_mut(offset)?;
    block.alloc = 0;
    block.trace = None;

    if let Some(token) = trace {
      self.tracer.discard(token);
    }

    self.stats.used -= size;
    self.stats.live -= 1;
    self.stats.releases += 1;

    log::trace!("release({ptr:p}) -> block {offset:#x} of {size} bytes");

    if let Some(prev) = link(prev) {
      let before = self.block(prev)?;
      before.check(prev)?;

      if before.is_free() {
        self.absorb(prev, offset)?;
        offset = prev;
      }
    }

    if let Some(next) = link(self.block(offset)?.next) {
      let after = self.block(next)?;
      after.check(next)?;

      if after.is_free() {
        self.absorb(offset, next)?;
      }
    }

    if self.config.verify().after_release() {
      self.verify()?;
    }

    Ok(())
  }

  /// Merges the block at `victim` into its physical predecessor `into` and
  /// wipes the victim's header.
  fn absorb(
    &mut self,
    into: usize,
    victim: usize,
  ) -> Result<(), Corruption> {
    let block = self.block(victim)?;
    let (size, next, trace) = (block.size, block.next, block.trace);

    let hdr = self.hdr;
    let block = self.block_mut(into)?;
    block.size += hdr + size;
    block.next = next;

    if let Some(next) = link(next) {
      self.block_mut(next)?.prev = into;
    }

    if let Some(token) = trace {
      self.tracer.discard(token);
    }

    self.erase(victim);

    log::debug!("merged block {victim:#x} into {into:#x}");

    Ok(())
  }

  /// Offset of the block following `block`, which must be where its size
  /// says it ends. Offsets strictly increase along a sound chain, so a walk
  /// built on this always terminates.
  fn successor(
    &self,
    offset: usize,
    block: &Block,
  ) -> Result<Option<usize>, Corruption> {
    let end = offset
      .checked_add(self.hdr)
      .and_then(|end| end.checked_add(block.size))
      .ok_or(Corruption::Tiling { offset })?;

    match link(block.next) {
      None if end == self.len => Ok(None),
      Some(next) if next == end => Ok(Some(next)),
      _ => Err(Corruption::Tiling { offset }),
    }
  }

  fn check_offset(
    &self,
    offset: usize,
  ) -> Result<(), Corruption> {
    if offset % self.config.align() != 0 || offset > self.len.saturating_sub(self.hdr) {
      return Err(Corruption::LinkOutOfBounds { offset });
    }

    Ok(())
  }

  fn header_ptr(
    &self,
    offset: usize,
  ) -> Result<*mut Block, Corruption> {
    self.check_offset(offset)?;

    // In bounds and aligned for a header, checked above.
    Ok(unsafe { self.base.as_ptr().add(offset) } as *mut Block)
  }

  fn block(
    &self,
    offset: usize,
  ) -> Result<&Block, Corruption> {
    Ok(unsafe { &*self.header_ptr(offset)? })
  }

  fn block_mut(
    &mut self,
    offset: usize,
  ) -> Result<&mut Block, Corruption> {
    Ok(unsafe { &mut *self.header_ptr(offset)? })
  }

  /// Writes a fresh header. Only called on offsets computed from a sound
  /// chain.
  fn stamp(
    &mut self,
    offset: usize,
    block: Block,
  ) {
    debug_assert!(self.check_offset(offset).is_ok());

    unsafe { (self.base.as_ptr().add(offset) as *mut Block).write(block) };
  }

  fn erase(
    &mut self,
    offset: usize,
  ) {
    debug_assert!(self.check_offset(offset).is_ok());

    unsafe { ptr::write_bytes(self.base.as_ptr().add(offset), 0, self.hdr) };
  }
}

/// Iterator returned by [`Arena::blocks`].
pub struct Blocks<'s, 'a, T: Tracer> {
  arena: &'s Arena<'a, T>,
  cursor: Option<usize>,
}

impl<T: Tracer> Iterator for Blocks<'_, '_, T> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    let offset = self.cursor.take()?;
    let block = self.arena.block(offset).ok()?;
    block.check(offset).ok()?;

    self.cursor = self.arena.successor(offset, block).ok().flatten();

    Some(BlockInfo {
      offset,
      prev: link(block.prev),
      next: link(block.next),
      size: block.size,
      allocated: !block.is_free(),
      trace: block.trace,
    })
  }
}

/// Report returned by [`Arena::status`].
pub struct Status<'s, 'a, T: Tracer> {
  arena: &'s Arena<'a, T>,
}

impl<T: Tracer> fmt::Display for Status<'_, '_, T> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    if let Err(err) = self.arena.verify() {
      return writeln!(f, "chain is corrupt: {err}");
    }

    if self.arena.blocks().all(|b| !b.allocated) {
      return writeln!(f, "all memory released in buffer arena");
    }

    writeln!(f, "memory currently allocated:")?;

    for block in self.arena.blocks() {
      writeln!(
        f,
        "HDR: OFFSET({:#x}) PREV({}) NEXT({}) ALLOC({}) SIZE({})",
        block.offset,
        Link(block.prev),
        Link(block.next),
        block.allocated as u8,
        block.size,
      )?;

      if let Some(token) = block.trace {
        writeln!(f, "TRACE:")?;
        self.arena.tracer.write_trace(token, f)?;
        writeln!(f)?;
      }
    }

    Ok(())
  }
}

struct Link(Option<usize>);

impl fmt::Display for Link {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self.0 {
      Some(offset) => write!(f, "{offset:#x}"),
      None => f.write_str("-"),
    }
  }
}
