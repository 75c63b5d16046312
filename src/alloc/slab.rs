//! # Slab Allocator
//!
//! `SlabAlloc` manages the memory of one attached database: a read-only
//! region (memory-mapped file or caller-supplied buffer) plus a sequence of
//! heap-allocated slabs that extend the file's offset-addressable space.
//! Inter-node references are refs — plain file offsets — never raw pointers;
//! [`SlabAlloc::translate`] turns a ref into a host address.
//!
//! ## Address Space
//!
//! ```text
//! ref 0 ──────────────► baseline ───────────────────────►
//! +---------------------+----------------+----------------+
//! |   mapped file or    |    slab 0      |    slab 1      |  ...
//! |   user buffer       | [baseline,     | [slab0.ref_end,|
//! |   (read-only)       |  slab0.ref_end)|  slab1.ref_end)|
//! +---------------------+----------------+----------------+
//! ```
//!
//! Slabs are contiguous in ref space with strictly increasing `ref_end`, so
//! translation is one binary search. Ref 0 means "no ref"; every allocation
//! is 8-byte aligned.
//!
//! ## Free Space Tracking
//!
//! Two free lists, both kept sorted by ref and coalesced on free: one over
//! slab space, one over the read-only file region. If updating a free list
//! fails the state is poisoned to `Invalid` and every allocating call fails
//! until `reset_free_space_tracking` re-initializes the lists. The poisoned
//! state is sticky by construction, not by convention: the check sits at the
//! top of every entry point that touches a free list.
//!
//! ## Attachment State Machine
//!
//! ```text
//! None ──attach_file──► SharedFile | UnsharedFile
//! None ──attach_buffer─► UsersBuffer ──own_buffer──► OwnedBuffer
//! None ──attach_empty──► OwnedBuffer
//! any  ──detach────────► None            (idempotent)
//! ```
//!
//! Calling an attach function on an attached allocator is a caller bug and
//! only checked in debug builds.
//!
//! ## Safety
//!
//! The mapped region and the slabs are accessed through raw pointers handed
//! out by `translate`. The allocator guarantees the pointer stays valid
//! until the next `detach`, `remap` or `reset_free_space_tracking`; the
//! caller guarantees it does not outlive those. All `unsafe` blocks carry
//! SAFETY comments stating which half of the contract they rely on.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::ptr::NonNull;

use eyre::{bail, ensure, Result, WrapErr};
use memmap2::{Mmap, MmapMut, MmapOptions};
use zerocopy::IntoBytes;

use super::header::{FileHeader, StreamingFooter, HEADER_SIZE};
use super::{round_up_to_alignment, Ref};
use crate::error::CoreError;

/// Smallest slab ever allocated; growth doubles from here.
const MIN_SLAB_SIZE: usize = 128;

/// A ref paired with the host address it currently translates to.
#[derive(Debug, Clone, Copy)]
pub struct MemRef {
    pub ref_: Ref,
    pub addr: NonNull<u8>,
}

/// A free-space extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub ref_: Ref,
    pub size: usize,
}

struct Slab {
    ref_end: Ref,
    addr: NonNull<u8>,
    size: usize,
}

impl std::fmt::Debug for Slab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slab")
            .field("ref_end", &self.ref_end)
            .field("size", &self.size)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachMode {
    None,
    OwnedBuffer,
    UsersBuffer,
    SharedFile,
    UnsharedFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FreeSpaceState {
    Clean,
    Dirty,
    Invalid,
}

#[derive(Debug)]
enum FileMapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl FileMapping {
    fn bytes(&self) -> &[u8] {
        match self {
            FileMapping::ReadOnly(m) => m,
            FileMapping::ReadWrite(m) => m,
        }
    }

    fn base(&self) -> NonNull<u8> {
        // SAFETY: a mapping is never empty here; attach rejects files smaller
        // than the header.
        unsafe { NonNull::new_unchecked(self.bytes().as_ptr() as *mut u8) }
    }
}

/// Options for [`SlabAlloc::attach_file`]. `sync_to_disk` covers the fsync
/// calls made by `resize_file` and `reserve_disk_space`.
#[derive(Debug, Clone)]
pub struct AttachOptions {
    pub is_shared: bool,
    pub read_only: bool,
    pub no_create: bool,
    pub skip_validate: bool,
    pub encryption_key: Option<Vec<u8>>,
    pub server_sync_mode: bool,
    pub sync_to_disk: bool,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            is_shared: false,
            read_only: false,
            no_create: false,
            skip_validate: false,
            encryption_key: None,
            server_sync_mode: false,
            sync_to_disk: true,
        }
    }
}

pub struct SlabAlloc {
    file: Option<File>,
    mapping: Option<FileMapping>,
    buffer: Option<(NonNull<u8>, usize)>,
    attach_mode: AttachMode,
    file_on_streaming_form: bool,
    free_space_state: FreeSpaceState,
    file_format_version: u8,
    server_sync_mode: bool,
    sync_to_disk: bool,
    baseline: Ref,
    slabs: Vec<Slab>,
    free_space: Vec<Chunk>,
    free_read_only: Vec<Chunk>,
}

impl Default for SlabAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl SlabAlloc {
    pub fn new() -> Self {
        Self {
            file: None,
            mapping: None,
            buffer: None,
            attach_mode: AttachMode::None,
            file_on_streaming_form: false,
            free_space_state: FreeSpaceState::Clean,
            file_format_version: super::header::DEFAULT_FILE_FORMAT_VERSION,
            server_sync_mode: false,
            sync_to_disk: true,
            baseline: 0,
            slabs: Vec::new(),
            free_space: Vec::new(),
            free_read_only: Vec::new(),
        }
    }

    /// Attaches this allocator to a database file and returns the ref of the
    /// root node, or zero if there is none.
    ///
    /// Must only be called in the detached state.
    pub fn attach_file(&mut self, path: impl AsRef<Path>, options: &AttachOptions) -> Result<Ref> {
        debug_assert!(!self.is_attached(), "attach_file on an attached allocator");
        let path = path.as_ref();

        ensure!(
            options.encryption_key.is_none(),
            CoreError::InvalidDatabase(
                "an encryption key was supplied but encrypted mappings are not supported".into()
            )
        );

        let mut open = OpenOptions::new();
        open.read(true);
        if !options.read_only {
            open.write(true).create(!options.no_create);
        }
        let mut file = open
            .open(path)
            .wrap_err_with(|| format!("failed to open database file '{}'", path.display()))?;

        let mut size = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?
            .len();

        if size == 0 {
            ensure!(
                !options.read_only,
                CoreError::InvalidDatabase(format!("'{}' is empty", path.display()))
            );
            let header = FileHeader::new_empty(options.server_sync_mode);
            file.write_all(header.as_bytes())
                .wrap_err_with(|| format!("failed to initialize '{}'", path.display()))?;
            if options.sync_to_disk {
                file.sync_all()
                    .wrap_err_with(|| format!("failed to sync '{}'", path.display()))?;
            }
            size = HEADER_SIZE as u64;
        }

        ensure!(
            size >= HEADER_SIZE as u64,
            CoreError::InvalidDatabase(format!(
                "'{}' is truncated: {} bytes, header needs {}",
                path.display(),
                size,
                HEADER_SIZE
            ))
        );

        // SAFETY: the mapping's lifetime is tied to this allocator and all
        // access goes through translate(), which bounds-checks against
        // baseline. Database files are not modified by other processes while
        // attached; writer exclusion is the caller's contract.
        let mapping = if options.read_only {
            FileMapping::ReadOnly(unsafe {
                Mmap::map(&file)
                    .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
            })
        } else {
            FileMapping::ReadWrite(unsafe {
                MmapMut::map_mut(&file)
                    .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
            })
        };

        let top_ref = if options.skip_validate {
            let header = FileHeader::from_bytes_unchecked(mapping.bytes())?;
            self.file_format_version = header.file_format_version();
            self.server_sync_mode = header.server_sync_mode();
            header.top_ref()
        } else {
            let outcome = Self::validate_buffer(mapping.bytes())?;
            ensure!(
                outcome.server_sync_mode == options.server_sync_mode,
                CoreError::InvalidDatabase(format!(
                    "'{}' was created with server sync mode {}, attached with {}",
                    path.display(),
                    outcome.server_sync_mode,
                    options.server_sync_mode
                ))
            );
            self.file_format_version = outcome.file_format_version;
            self.server_sync_mode = outcome.server_sync_mode;
            self.file_on_streaming_form = outcome.streaming_form;
            outcome.top_ref
        };

        #[cfg(unix)]
        // SAFETY: the advised range is exactly the mapped region; madvise is
        // a hint and cannot invalidate the mapping.
        unsafe {
            libc::madvise(
                mapping.base().as_ptr() as *mut libc::c_void,
                size as usize,
                libc::MADV_WILLNEED,
            );
        }

        self.file = Some(file);
        self.mapping = Some(mapping);
        self.attach_mode = if options.is_shared {
            AttachMode::SharedFile
        } else {
            AttachMode::UnsharedFile
        };
        self.baseline = size;
        self.sync_to_disk = options.sync_to_disk;
        Ok(top_ref)
    }

    /// Attaches this allocator to a caller-supplied memory buffer and
    /// returns the ref of the root node.
    ///
    /// # Safety
    ///
    /// `data` must point to `size` readable bytes that stay valid and
    /// unmodified until [`detach`](Self::detach). If
    /// [`own_buffer`](Self::own_buffer) will be called, the buffer must have
    /// been allocated as a `Box<[u8]>` whose ownership is being handed over.
    pub unsafe fn attach_buffer(&mut self, data: *mut u8, size: usize) -> Result<Ref> {
        debug_assert!(!self.is_attached(), "attach_buffer on an attached allocator");
        let ptr = NonNull::new(data)
            .ok_or_else(|| CoreError::InvalidDatabase("null buffer".into()))?;
        let slice = std::slice::from_raw_parts(data, size);
        let outcome = Self::validate_buffer(slice)?;

        self.buffer = Some((ptr, size));
        self.attach_mode = AttachMode::UsersBuffer;
        self.baseline = size as Ref;
        self.file_format_version = outcome.file_format_version;
        self.server_sync_mode = outcome.server_sync_mode;
        self.file_on_streaming_form = outcome.streaming_form;
        Ok(outcome.top_ref)
    }

    /// Attaches this allocator to nothing: no file, no buffer, baseline 0.
    pub fn attach_empty(&mut self) {
        debug_assert!(!self.is_attached(), "attach_empty on an attached allocator");
        self.attach_mode = AttachMode::OwnedBuffer;
        self.baseline = 0;
    }

    /// Transfers ownership of the buffer supplied to `attach_buffer` to this
    /// allocator; it will be freed on detach.
    pub fn own_buffer(&mut self) {
        debug_assert_eq!(self.attach_mode, AttachMode::UsersBuffer);
        debug_assert!(self.buffer.is_some());
        self.attach_mode = AttachMode::OwnedBuffer;
    }

    pub fn is_attached(&self) -> bool {
        self.attach_mode != AttachMode::None
    }

    /// Attached, and not via `attach_empty`.
    pub fn nonempty_attachment(&self) -> bool {
        self.is_attached() && (self.mapping.is_some() || self.buffer.is_some())
    }

    /// Detaches from the current file or buffer. Idempotent. Does not reset
    /// free-space tracking.
    pub fn detach(&mut self) {
        self.mapping = None;
        self.file = None;
        if self.attach_mode == AttachMode::OwnedBuffer {
            if let Some((ptr, size)) = self.buffer.take() {
                // SAFETY: own_buffer's contract says the pointer originated
                // from Box<[u8]>; reconstructing the box frees it exactly
                // once because buffer was take()n.
                unsafe {
                    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                        ptr.as_ptr(),
                        size,
                    )));
                }
            }
        }
        self.buffer = None;
        self.release_slabs();
        self.attach_mode = AttachMode::None;
        self.file_on_streaming_form = false;
        self.baseline = 0;
    }

    /// Discards all slabs, clears both free lists and returns free-space
    /// tracking to the clean state.
    pub fn reset_free_space_tracking(&mut self) {
        self.release_slabs();
        self.free_space.clear();
        self.free_read_only.clear();
        self.free_space_state = FreeSpaceState::Clean;
    }

    fn release_slabs(&mut self) {
        for slab in self.slabs.drain(..) {
            // SAFETY: every slab was allocated in grow_slab with exactly this
            // size and alignment, and is freed only here.
            unsafe {
                dealloc(
                    slab.addr.as_ptr(),
                    Layout::from_size_align_unchecked(slab.size, 8),
                );
            }
        }
    }

    /// Size of the attached file or buffer; the boundary between the mapped
    /// region and slab space.
    pub fn baseline(&self) -> Ref {
        debug_assert!(self.is_attached());
        self.baseline
    }

    /// Baseline plus the size of every slab, free space included.
    pub fn total_size(&self) -> u64 {
        self.slabs.last().map(|s| s.ref_end).unwrap_or(self.baseline)
    }

    pub fn file_format_version(&self) -> u8 {
        self.file_format_version
    }

    fn region_base(&self) -> Option<NonNull<u8>> {
        match (&self.mapping, self.buffer) {
            (Some(m), _) => Some(m.base()),
            (None, Some((ptr, _))) => Some(ptr),
            (None, None) => None,
        }
    }

    /// Translates a ref to the host address of the byte it names.
    ///
    /// Mapped-file refs resolve with one addition; slab refs binary-search
    /// the slab vector. The returned pointer stays valid until the next
    /// `detach`, `remap` or `reset_free_space_tracking`.
    pub fn translate(&self, ref_: Ref) -> Result<NonNull<u8>> {
        if ref_ < self.baseline {
            let base = self
                .region_base()
                .ok_or(CoreError::InvalidRef(ref_))?;
            // SAFETY: ref_ < baseline == length of the mapped region.
            return Ok(unsafe { NonNull::new_unchecked(base.as_ptr().add(ref_ as usize)) });
        }
        let idx = self.slabs.partition_point(|s| s.ref_end <= ref_);
        let slab = match self.slabs.get(idx) {
            Some(s) => s,
            None => bail!(CoreError::InvalidRef(ref_)),
        };
        let prev_end = if idx == 0 {
            self.baseline
        } else {
            self.slabs[idx - 1].ref_end
        };
        // SAFETY: prev_end <= ref_ < slab.ref_end, so the offset is inside
        // the slab's allocation.
        Ok(unsafe { NonNull::new_unchecked(slab.addr.as_ptr().add((ref_ - prev_end) as usize)) })
    }

    fn ensure_valid_free_space(&self) -> Result<()> {
        if self.free_space_state == FreeSpaceState::Invalid {
            bail!(CoreError::Allocation(
                "free-space tracking is invalid; call reset_free_space_tracking".into()
            ));
        }
        Ok(())
    }

    /// Allocates `size` bytes of slab space, rounded up to 8-byte alignment.
    ///
    /// Free space is searched first-fit in ascending ref order, so the
    /// lowest adequate ref always wins; on miss a new slab is appended with
    /// exponentially growing size.
    pub fn alloc(&mut self, size: usize) -> Result<MemRef> {
        debug_assert!(self.is_attached());
        debug_assert!(size > 0);
        self.ensure_valid_free_space()?;
        let size = round_up_to_alignment(size);

        if let Some(i) = self.free_space.iter().position(|c| c.size >= size) {
            let ref_ = self.free_space[i].ref_;
            self.free_space[i].ref_ += size as u64;
            self.free_space[i].size -= size;
            if self.free_space[i].size == 0 {
                self.free_space.remove(i);
            }
            let addr = self.translate(ref_)?;
            return Ok(MemRef { ref_, addr });
        }

        self.grow_slab(size)
    }

    fn grow_slab(&mut self, size: usize) -> Result<MemRef> {
        let prev_end = self.total_size();
        let prev_size = self.slabs.last().map(|s| s.size).unwrap_or(0);
        let slab_size = size.max(if prev_size == 0 {
            MIN_SLAB_SIZE
        } else {
            prev_size.saturating_mul(2)
        });

        let layout = match Layout::from_size_align(slab_size, 8) {
            Ok(l) => l,
            Err(_) => {
                self.free_space_state = FreeSpaceState::Invalid;
                bail!(CoreError::Allocation(format!(
                    "slab size {} overflows the address space",
                    slab_size
                )));
            }
        };
        // SAFETY: layout has non-zero size (size > 0 and MIN_SLAB_SIZE > 0).
        let raw = unsafe { alloc_zeroed(layout) };
        let addr = match NonNull::new(raw) {
            Some(p) => p,
            None => {
                self.free_space_state = FreeSpaceState::Invalid;
                bail!(CoreError::Allocation(format!(
                    "failed to grow slab space by {} bytes",
                    slab_size
                )));
            }
        };

        let ref_ = prev_end;
        self.slabs.push(Slab {
            ref_end: prev_end + slab_size as u64,
            addr,
            size: slab_size,
        });
        if slab_size > size {
            // Highest ref in the system: pushing keeps free_space sorted.
            self.free_space.push(Chunk {
                ref_: ref_ + size as u64,
                size: slab_size - size,
            });
        }
        Ok(MemRef { ref_, addr })
    }

    /// Moves an allocation to a block of `new_size` bytes, copying
    /// `min(old_size, new_size)` bytes. Never shrinks in place.
    pub fn realloc(
        &mut self,
        ref_: Ref,
        old_addr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<MemRef> {
        let new = self.alloc(new_size)?;
        // SAFETY: old_addr covers old_size readable bytes (live allocation),
        // new.addr covers new_size freshly allocated bytes; the regions are
        // disjoint because alloc never returns a live block.
        unsafe {
            std::ptr::copy_nonoverlapping(
                old_addr.as_ptr(),
                new.addr.as_ptr(),
                old_size.min(new_size),
            );
        }
        self.free(ref_, old_size)?;
        Ok(new)
    }

    /// Returns an extent to the appropriate free list (slab or read-only,
    /// chosen by comparing against the baseline), coalescing with adjacent
    /// chunks. A malformed extent poisons free-space tracking.
    pub fn free(&mut self, ref_: Ref, size: usize) -> Result<()> {
        self.ensure_valid_free_space()?;
        let size = round_up_to_alignment(size);
        let is_read_only = ref_ < self.baseline;
        let region_end = if is_read_only {
            self.baseline
        } else {
            self.total_size()
        };
        if ref_ + size as u64 > region_end {
            self.free_space_state = FreeSpaceState::Invalid;
            bail!(CoreError::Allocation(format!(
                "freed extent {:#x}+{} exceeds its region",
                ref_, size
            )));
        }

        let (pos, overlaps) = {
            let list: &[Chunk] = if is_read_only {
                &self.free_read_only
            } else {
                &self.free_space
            };
            let pos = list.partition_point(|c| c.ref_ < ref_);
            let overlaps_prev =
                pos > 0 && list[pos - 1].ref_ + list[pos - 1].size as u64 > ref_;
            let overlaps_next = pos < list.len() && ref_ + size as u64 > list[pos].ref_;
            (pos, overlaps_prev || overlaps_next)
        };
        if overlaps {
            self.free_space_state = FreeSpaceState::Invalid;
            bail!(CoreError::Allocation(format!(
                "freed extent {:#x}+{} overlaps the free list",
                ref_, size
            )));
        }

        let list = if is_read_only {
            &mut self.free_read_only
        } else {
            &mut self.free_space
        };
        let merge_prev = pos > 0 && list[pos - 1].ref_ + list[pos - 1].size as u64 == ref_;
        let merge_next = pos < list.len() && ref_ + size as u64 == list[pos].ref_;
        match (merge_prev, merge_next) {
            (true, true) => {
                list[pos - 1].size += size + list[pos].size;
                list.remove(pos);
            }
            (true, false) => list[pos - 1].size += size,
            (false, true) => {
                list[pos].ref_ = ref_;
                list[pos].size += size;
            }
            (false, false) => list.insert(pos, Chunk { ref_, size }),
        }
        self.free_space_state = FreeSpaceState::Dirty;
        Ok(())
    }

    /// The free list over slab space. Fails once free-space tracking is
    /// invalid.
    pub fn free_space_chunks(&self) -> Result<&[Chunk]> {
        self.ensure_valid_free_space()?;
        Ok(&self.free_space)
    }

    /// The free list over the read-only file region. Fails once free-space
    /// tracking is invalid.
    pub fn free_read_only_chunks(&self) -> Result<&[Chunk]> {
        self.ensure_valid_free_space()?;
        Ok(&self.free_read_only)
    }

    /// Converts a streaming-form file for in-place update: rewrites the
    /// header with the live top-ref in slot 0 and the select bit clear, then
    /// syncs it. No-op when the file is not in streaming form (including
    /// whenever validation was skipped at attach).
    pub fn prepare_for_update(&mut self) -> Result<()> {
        debug_assert!(matches!(
            self.attach_mode,
            AttachMode::SharedFile | AttachMode::UnsharedFile
        ));
        if !self.file_on_streaming_form {
            return Ok(());
        }
        let Some(FileMapping::ReadWrite(map)) = self.mapping.as_mut() else {
            bail!(CoreError::InvalidDatabase(
                "cannot convert a streaming-form file attached read-only".into()
            ));
        };
        let top_ref = StreamingFooter::from_file_tail(map)
            .map(|f| f.top_ref())
            .ok_or_else(|| {
                CoreError::InvalidDatabase("streaming footer disappeared under us".into())
            })?;
        let header = FileHeader::new_converted(top_ref, self.server_sync_mode);
        map[..HEADER_SIZE].copy_from_slice(header.as_bytes());
        map.flush_range(0, HEADER_SIZE)
            .wrap_err("failed to sync the converted header")?;
        self.file_on_streaming_form = false;
        Ok(())
    }

    /// Remaps the attached file so that the prefix `[0, new_file_size)` is
    /// available in memory. Slab refs shift upward by the growth delta.
    ///
    /// Returns whether the host address of the first mapped byte changed.
    pub fn remap(&mut self, new_file_size: u64) -> Result<bool> {
        debug_assert!(matches!(
            self.attach_mode,
            AttachMode::SharedFile | AttachMode::UnsharedFile
        ));
        ensure!(
            new_file_size % 8 == 0,
            "remap size {} is not 8-byte aligned",
            new_file_size
        );
        ensure!(
            new_file_size >= self.baseline,
            "remap cannot shrink the mapped prefix ({} < {})",
            new_file_size,
            self.baseline
        );

        let file = self.file.as_ref().expect("remap requires an attached file");
        let on_disk = file.metadata().wrap_err("failed to stat attached file")?.len();
        ensure!(
            on_disk >= new_file_size,
            "file holds {} bytes, cannot map {}",
            on_disk,
            new_file_size
        );

        let old_base = self.mapping.as_ref().map(|m| m.base().as_ptr());
        let read_only = matches!(self.mapping, Some(FileMapping::ReadOnly(_)));
        self.mapping = None;

        // SAFETY: same contract as the mapping created at attach; the old
        // mapping was dropped above, so no stale reference can observe the
        // remap.
        let mapping = if read_only {
            FileMapping::ReadOnly(unsafe {
                MmapOptions::new()
                    .len(new_file_size as usize)
                    .map(file)
                    .wrap_err("failed to remap file")?
            })
        } else {
            FileMapping::ReadWrite(unsafe {
                MmapOptions::new()
                    .len(new_file_size as usize)
                    .map_mut(file)
                    .wrap_err("failed to remap file")?
            })
        };
        let base_changed = Some(mapping.base().as_ptr()) != old_base;
        self.mapping = Some(mapping);

        let delta = new_file_size - self.baseline;
        for slab in &mut self.slabs {
            slab.ref_end += delta;
        }
        for chunk in &mut self.free_space {
            chunk.ref_ += delta;
        }
        self.baseline = new_file_size;
        Ok(base_changed)
    }

    /// Grows or shrinks the attached file to exactly `new_size` bytes and
    /// syncs, unless sync-to-disk was disabled at attach.
    pub fn resize_file(&mut self, new_size: u64) -> Result<()> {
        let file = self
            .file
            .as_ref()
            .expect("resize_file requires an attached file");
        file.set_len(new_size)
            .wrap_err_with(|| format!("failed to resize file to {} bytes", new_size))?;
        if self.sync_to_disk {
            file.sync_all().wrap_err("failed to sync resized file")?;
        }
        Ok(())
    }

    /// Ensures the attached file holds at least `size` bytes, syncing if it
    /// grew. Never shrinks.
    pub fn reserve_disk_space(&mut self, size: u64) -> Result<()> {
        let file = self
            .file
            .as_ref()
            .expect("reserve_disk_space requires an attached file");
        let current = file.metadata().wrap_err("failed to stat attached file")?.len();
        if current >= size {
            return Ok(());
        }
        file.set_len(size)
            .wrap_err_with(|| format!("failed to reserve {} bytes", size))?;
        if self.sync_to_disk {
            file.sync_all().wrap_err("failed to sync reserved space")?;
        }
        Ok(())
    }

    /// Checks both free lists for ordering, disjointness and bounds.
    pub fn verify_free_space(&self) -> Result<()> {
        let check = |list: &[Chunk], end: u64, name: &str| -> Result<()> {
            let mut prev_end = 0u64;
            for chunk in list {
                ensure!(
                    chunk.ref_ >= prev_end,
                    "{} chunk at {:#x} overlaps or is out of order",
                    name,
                    chunk.ref_
                );
                ensure!(
                    chunk.ref_ + chunk.size as u64 <= end,
                    "{} chunk at {:#x}+{} exceeds region end {:#x}",
                    name,
                    chunk.ref_,
                    chunk.size,
                    end
                );
                prev_end = chunk.ref_ + chunk.size as u64;
            }
            Ok(())
        };
        check(&self.free_read_only, self.baseline, "read-only")?;
        check(&self.free_space, self.total_size(), "slab")?;
        Ok(())
    }
}

/// Outcome of validating a file or buffer header.
struct ValidateOutcome {
    top_ref: Ref,
    streaming_form: bool,
    file_format_version: u8,
    server_sync_mode: bool,
}

impl SlabAlloc {
    fn validate_buffer(data: &[u8]) -> Result<ValidateOutcome> {
        let header = FileHeader::from_bytes(data)?;
        let mut top_ref = header.top_ref();
        let mut streaming_form = false;

        if top_ref == 0 {
            if let Some(footer) = StreamingFooter::from_file_tail(data) {
                top_ref = footer.top_ref();
                streaming_form = true;
            }
        }

        ensure!(
            top_ref % 8 == 0 && top_ref < data.len() as u64,
            CoreError::InvalidDatabase(format!("top ref {:#x} is out of bounds", top_ref))
        );

        Ok(ValidateOutcome {
            top_ref,
            streaming_form,
            file_format_version: header.file_format_version(),
            server_sync_mode: header.server_sync_mode(),
        })
    }
}

impl Drop for SlabAlloc {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for SlabAlloc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlabAlloc")
            .field("attach_mode", &self.attach_mode)
            .field("baseline", &self.baseline)
            .field("slabs", &self.slabs)
            .field("free_space", &self.free_space)
            .field("free_read_only", &self.free_read_only)
            .field("free_space_state", &self.free_space_state)
            .finish()
    }
}

/// Detaches the allocator on scope exit unless released. Guards attach
/// sequences so a failure partway through leaves the allocator detached.
pub struct DetachGuard<'a> {
    alloc: Option<&'a mut SlabAlloc>,
}

impl<'a> DetachGuard<'a> {
    pub fn new(alloc: &'a mut SlabAlloc) -> Self {
        Self { alloc: Some(alloc) }
    }

    /// Disarms the guard and returns the allocator, leaving it attached.
    pub fn release(mut self) -> &'a mut SlabAlloc {
        self.alloc.take().expect("guard released twice")
    }
}

impl Drop for DetachGuard<'_> {
    fn drop(&mut self) {
        if let Some(alloc) = self.alloc.take() {
            alloc.detach();
        }
    }
}
