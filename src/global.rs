//! `#[global_allocator]` support.
//!
//! ```rust,ignore
//! use bufalloc::{BufferAlloc, Config};
//!
//! #[global_allocator]
//! static GLOBAL: BufferAlloc = BufferAlloc::new();
//!
//! static mut HEAP: [u8; 64 * 1024] = [0; 64 * 1024];
//!
//! fn main() {
//!     // SAFETY: the only reference ever taken to `HEAP`.
//!     GLOBAL.init(unsafe { &mut *core::ptr::addr_of_mut!(HEAP) }, Config::default());
//! }
//! ```
//!
//! Nothing can be allocated before `init`, so the program must not touch the
//! heap until then. Corruption aborts without going through the logger, but
//! the `trace`/`debug` records of ordinary calls are still emitted under the
//! lock: a logger that allocates must keep those levels off.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use spin::Mutex;

use crate::{
  arena::{Arena, Stats},
  config::Config,
  error::{Corruption, abort_on},
};

/// Lock-guarded arena usable as the process-wide allocator.
pub struct BufferAlloc {
  arena: Mutex<Option<Arena<'static>>>,
}

impl BufferAlloc {
  pub const fn new() -> Self {
    Self {
      arena: Mutex::new(None),
    }
  }

  /// Installs a fresh arena over `buf`.
  ///
  /// Call-site capture is switched off: snapshots would have to be stored
  /// on the heap this arena is serving.
  ///
  /// Calling this again drops the previous arena without any teardown;
  /// pointers it handed out must never be released afterwards.
  pub fn init(
    &self,
    buf: &'static mut [u8],
    config: Config,
  ) {
    if config.capture() {
      log::warn!("call-site capture is not available through the global allocator");
    }

    let arena = Arena::with_config(buf, config.with_capture(false));
    *self.arena.lock() = Some(arena);
  }

  /// Configuration of the installed arena.
  pub fn config(&self) -> Option<Config> {
    self.arena.lock().as_ref().map(|arena| *arena.config())
  }

  pub fn is_initialized(&self) -> bool {
    self.arena.lock().is_some()
  }

  pub fn verify(&self) -> Result<(), Corruption> {
    match self.arena.lock().as_ref() {
      Some(arena) => arena.verify(),
      None => Ok(()),
    }
  }

  pub fn stats(&self) -> Option<Stats> {
    self.arena.lock().as_ref().map(Arena::stats)
  }
}

impl Default for BufferAlloc {
  fn default() -> Self {
    Self::new()
  }
}

unsafe impl GlobalAlloc for BufferAlloc {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    // Zero-size types: return a well-aligned dangling pointer.
    if layout.size() == 0 {
      return layout.align() as *mut u8;
    }

    let mut guard = self.arena.lock();
    let Some(arena) = guard.as_mut() else {
      return ptr::null_mut();
    };

    if layout.align() > arena.config().align() {
      return ptr::null_mut();
    }

    match arena.try_allocate(layout.size()) {
      Ok(ptr) => ptr.map_or(ptr::null_mut(), NonNull::as_ptr),
      Err(err) => abort_on(&err),
    }
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
  ) {
    if layout.size() == 0 {
      return;
    }

    if let Some(arena) = self.arena.lock().as_mut() {
      if let Err(err) = arena.try_release(ptr) {
        abort_on(&err);
      }
    }
  }
}
