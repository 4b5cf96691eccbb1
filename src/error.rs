use core::fmt::{self, Write};

use thiserror::Error;

/// Structural damage or misuse detected in an arena.
///
/// Offsets are relative to the aligned arena base; addresses are absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Corruption {
  #[error("leading canary overwritten in header at offset {offset:#x}")]
  Magic1 { offset: usize },

  #[error("trailing canary overwritten in header at offset {offset:#x}")]
  Magic2 { offset: usize },

  #[error("allocation flag has illegal value {value} in header at offset {offset:#x}")]
  IllegalAllocFlag { offset: usize, value: usize },

  #[error("first header links back to offset {prev:#x}")]
  FirstHasPrev { prev: usize },

  #[error("header at offset {offset:#x} links back to {found:#x}, expected {expected:#x}")]
  BrokenBackLink {
    offset: usize,
    expected: usize,
    found: usize,
  },

  #[error("link to offset {offset:#x} leaves the arena")]
  LinkOutOfBounds { offset: usize },

  #[error("header at offset {offset:#x} does not tile with its successor")]
  Tiling { offset: usize },

  #[error("free block at offset {offset:#x} was not merged with its free successor")]
  Uncoalesced { offset: usize },

  #[error("release of pointer {addr:#x} outside of managed space")]
  ForeignPointer { addr: usize },

  #[error("release of unallocated block at {addr:#x}")]
  DoubleRelease { addr: usize },
}

/// Reports `err` and aborts the process.
///
/// Once the chain is known to be inconsistent there is no safe way to keep
/// going, so this never unwinds and never returns.
#[cold]
#[inline(never)]
pub fn fatal(err: &Corruption) -> ! {
  log::error!("heap corruption: {err}");

  abort_on(err)
}

/// Same as [`fatal`], without going through the logger. Used where the
/// allocator lock is held, since a logger that allocates would re-enter it.
#[cold]
#[inline(never)]
pub fn abort_on(err: &Corruption) -> ! {
  let mut line = Line::new();
  let _ = writeln!(line, "bufalloc: FATAL: {err}");

  abort_with_message(line.as_bytes())
}

/// Writes `msg` straight to the stderr descriptor, then aborts. Nothing here
/// allocates, since the allocator itself may be the one that is broken.
#[cold]
#[inline(never)]
fn abort_with_message(msg: &[u8]) -> ! {
  unsafe {
    libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
    libc::abort();
  }
}

const LINE_CAPACITY: usize = 256;

/// Fixed-capacity text buffer; output past the capacity is dropped.
struct Line {
  buf: [u8; LINE_CAPACITY],
  len: usize,
}

impl Line {
  fn new() -> Self {
    Self {
      buf: [0; LINE_CAPACITY],
      len: 0,
    }
  }

  fn as_bytes(&self) -> &[u8] {
    &self.buf[..self.len]
  }
}

impl Write for Line {
  fn write_str(
    &mut self,
    s: &str,
  ) -> fmt::Result {
    let room = LINE_CAPACITY - self.len;
    let take = s.len().min(room);

    self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
    self.len += take;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_messages_name_the_location() {
    let err = Corruption::BrokenBackLink {
      offset: 0x80,
      expected: 0x0,
      found: 0x40,
    };

    assert_eq!(
      err.to_string(),
      "header at offset 0x80 links back to 0x40, expected 0x0"
    );
    assert_eq!(
      Corruption::DoubleRelease { addr: 0x1000 }.to_string(),
      "release of unallocated block at 0x1000"
    );
  }

  #[test]
  fn test_line_truncates_instead_of_growing() {
    let mut line = Line::new();

    for _ in 0..100 {
      write!(line, "0123456789").unwrap();
    }

    assert_eq!(line.as_bytes().len(), LINE_CAPACITY);
    assert!(line.as_bytes().starts_with(b"0123456789"));
  }

  #[test]
  fn test_line_holds_a_full_diagnostic() {
    let mut line = Line::new();
    let err = Corruption::ForeignPointer { addr: 0xdead_beef };

    writeln!(line, "bufalloc: FATAL: {err}").unwrap();

    assert_eq!(
      line.as_bytes(),
      b"bufalloc: FATAL: release of pointer 0xdeadbeef outside of managed space\n"
    );
  }
}
