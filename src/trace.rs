//! Optional call-site capture for live blocks.
//!
//! The arena only stores an opaque token per allocated block; what a
//! snapshot is, and where it lives, is up to the [`Tracer`].

use std::{backtrace::Backtrace, fmt, num::NonZeroUsize};

/// Collaborator that records where allocations came from.
///
/// Only consulted when capture is enabled in the arena's
/// [`Config`](crate::Config).
pub trait Tracer {
  /// Takes a snapshot of the current call site. `None` means nothing was
  /// recorded.
  fn capture(&mut self) -> Option<NonZeroUsize>;

  /// Drops the snapshot behind `token`; the token is never used again.
  fn discard(
    &mut self,
    token: NonZeroUsize,
  );

  /// Writes the snapshot behind `token` for a status report.
  fn write_trace(
    &self,
    token: NonZeroUsize,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result;
}

/// Tracer that never records anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTrace;

impl Tracer for NoTrace {
  fn capture(&mut self) -> Option<NonZeroUsize> {
    None
  }

  fn discard(
    &mut self,
    _token: NonZeroUsize,
  ) {
  }

  fn write_trace(
    &self,
    _token: NonZeroUsize,
    _f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    Ok(())
  }
}

/// Tracer backed by [`std::backtrace::Backtrace`].
///
/// Snapshots live on the system heap, so this is for arenas used through a
/// handle, not for one installed as the global allocator.
#[derive(Debug, Default)]
pub struct BacktraceTracer {
  slots: Vec<Option<Backtrace>>,
  vacant: Vec<usize>,
}

impl BacktraceTracer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of snapshots currently held.
  pub fn live(&self) -> usize {
    self.slots.len() - self.vacant.len()
  }
}

impl Tracer for BacktraceTracer {
  fn capture(&mut self) -> Option<NonZeroUsize> {
    let trace = Some(Backtrace::force_capture());

    let index = match self.vacant.pop() {
      Some(index) => {
        self.slots[index] = trace;
        index
      }
      None => {
        self.slots.push(trace);
        self.slots.len() - 1
      }
    };

    NonZeroUsize::new(index + 1)
  }

  fn discard(
    &mut self,
    token: NonZeroUsize,
  ) {
    let index = token.get() - 1;

    if let Some(slot) = self.slots.get_mut(index) {
      if slot.take().is_some() {
        self.vacant.push(index);
      }
    }
  }

  fn write_trace(
    &self,
    token: NonZeroUsize,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self.slots.get(token.get() - 1) {
      Some(Some(trace)) => write!(f, "{trace}"),
      _ => Ok(()),
    }
  }
}
