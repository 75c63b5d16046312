//! # Reference Address Space and Slab Allocation
//!
//! The storage layer of the engine. A *ref* is a 64-bit offset into a
//! virtual storage space whose low region is the attached read-only file (or
//! buffer) and whose upper region is a sequence of heap-allocated slabs.
//! Every inter-node link in the engine is a ref; the allocator translates
//! them to host addresses and manages the mutable region.
//!
//! ## Module Organization
//!
//! - `header`: bit-exact file header and streaming footer (zerocopy)
//! - `slab`: the allocator itself — attach, translate, alloc/free, remap
//!
//! ## Invariants
//!
//! - Refs are 8-byte aligned; ref 0 means "none".
//! - Refs below the baseline address the mapped file, refs at or above it
//!   address slab memory.
//! - No allocation ever returns a ref below the baseline.

mod header;
mod slab;

pub use header::{
    FileHeader, StreamingFooter, DEFAULT_FILE_FORMAT_VERSION, FLAGS_SELECT_BIT,
    FLAGS_SERVER_SYNC_MODE, FOOTER_MAGIC_COOKIE, FOOTER_SIZE, HEADER_MNEMONIC, HEADER_SIZE,
};
pub use slab::{AttachOptions, Chunk, DetachGuard, MemRef, SlabAlloc};

use eyre::{ensure, Result};

/// A 64-bit offset into the engine's virtual storage space.
pub type Ref = u64;

/// The "no ref" sentinel.
pub const REF_NONE: Ref = 0;

const REF_ALIGNMENT: u64 = 8;

/// Converts a signed integer read from storage into a ref. Negative and
/// unaligned inputs are storage corruption and are rejected at this
/// boundary.
pub fn to_ref(value: i64) -> Result<Ref> {
    ensure!(value >= 0, "ref out of bounds: {}", value);
    let ref_ = value as u64;
    ensure!(
        ref_ % REF_ALIGNMENT == 0,
        "misaligned ref: {:#x}",
        ref_
    );
    Ok(ref_)
}

pub(crate) fn round_up_to_alignment(size: usize) -> usize {
    (size + (REF_ALIGNMENT as usize - 1)) & !(REF_ALIGNMENT as usize - 1)
}
