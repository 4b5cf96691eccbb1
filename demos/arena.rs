use std::ptr;

use bufalloc::{Arena, Config, Verify};

/// Prints one line per block so the effect of each step is visible.
fn print_chain(
  label: &str,
  arena: &Arena<'_>,
) {
  println!("\n[{label}]");
  print!("{}", arena.status());
  println!(
    "used = {} bytes, free = {} bytes, largest request = {} bytes",
    arena.stats().used,
    arena.free_bytes(),
    arena.largest_free(),
  );
}

fn main() {
  // The whole heap: a plain byte array. Nothing here ever reaches the OS
  // allocator.
  let mut memory = [0u8; 1024];

  // Walk the whole chain after every allocate and release.
  let config = Config::default().with_verify(Verify::ALWAYS);
  let mut arena = Arena::with_config(&mut memory, config);

  print_chain("start", &arena);

  // --------------------------------------------------------------------
  // 1) Allocate space for a u32. The request is rounded up to the
  //    alignment unit and split off the single free block.
  // --------------------------------------------------------------------
  let first_block = arena.allocate(4).expect("arena exhausted");
  let first_ptr = first_block.as_ptr() as *mut u32;
  unsafe { first_ptr.write(0xDEADBEEF) };
  println!("\n[1] Value written to first_block = 0x{:X}", unsafe {
    first_ptr.read()
  });
  print_chain("1: allocate u32", &arena);

  // --------------------------------------------------------------------
  // 2) Allocate 12 bytes to show rounding of odd sizes.
  // --------------------------------------------------------------------
  let second_block = arena.allocate(12).expect("arena exhausted");
  unsafe { ptr::write_bytes(second_block.as_ptr(), 0xAB, 12) };
  print_chain("2: allocate [u8; 12]", &arena);

  // --------------------------------------------------------------------
  // 3) Ask for more than the arena holds. This is not an error, just
  //    `None`.
  // --------------------------------------------------------------------
  println!("\n[3] allocate(4096) -> {:?}", arena.allocate(4096));

  // --------------------------------------------------------------------
  // 4) Release the first block, then allocate something small to see the
  //    freed hole reused (first fit).
  // --------------------------------------------------------------------
  arena.release(first_block.as_ptr());
  print_chain("4: release first_block", &arena);

  let third_block = arena.allocate(2).expect("arena exhausted");
  println!(
    "\n[4] third_block == first_block? {}",
    if third_block == first_block {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );

  // --------------------------------------------------------------------
  // 5) Release everything: neighbors merge back into one free block.
  // --------------------------------------------------------------------
  arena.release(second_block.as_ptr());
  arena.release(third_block.as_ptr());
  print_chain("5: release all", &arena);

  println!("\n[6] verify -> {:?}", arena.verify());
}
