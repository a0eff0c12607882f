//! Buffer Backing Providers
//!
//! Each provider exposes a 4-byte region holding the integer `1` at offset 0,
//! the invariant every read task depends on. Variants differ only in where
//! the bytes live: a plain integer array, a heap byte buffer, a manually
//! allocated off-heap region, an OS memory mapping over a temp file, or a
//! raw-pointer view over one of the first two.

use memmap2::{Mmap, MmapOptions};
use std::alloc::{self, Layout};
use std::io::Write;
use std::path::Path;
use std::ptr::NonNull;
use tempfile::{Builder as TempBuilder, NamedTempFile};
use thiserror::Error;

/// Size of every backing region in bytes.
pub const BUFFER_LEN: usize = 4;

/// The constant each region is seeded with at offset 0.
pub const SEED_VALUE: i32 = 1;

/// A provider could not construct its buffer. Aborts only the affected task.
#[derive(Debug, Error)]
pub enum SetupError {
    /// File creation, write, or mapping failed.
    #[error("failed to {context}: {source}")]
    Io {
        /// What the provider was doing when the error occurred.
        context: &'static str,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// A checked read fell outside the backed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("read of 4 bytes at offset {offset} outside region of {len} bytes")]
pub struct ReadError {
    /// Requested byte offset.
    pub offset: usize,
    /// Length of the region.
    pub len: usize,
}

/// The five backing stores under comparison. `UnsafeDirect` and `UnsafeHeap`
/// are the raw-read wrapper over a direct and a heap buffer respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingKind {
    /// Native integer array on the heap.
    HeapArray,
    /// Byte-addressable heap buffer.
    HeapBuffer,
    /// Manually allocated region outside any collector's reach.
    DirectBuffer,
    /// Read-only memory mapping over a temp file.
    MappedBuffer,
    /// Raw-pointer view over a direct buffer.
    UnsafeDirect,
    /// Raw-pointer view over a heap buffer.
    UnsafeHeap,
}

impl BackingKind {
    /// Construct a seeded handle for this backing.
    ///
    /// `temp_dir` overrides where `MappedBuffer` places its backing file;
    /// other variants ignore it.
    pub fn create(self, temp_dir: Option<&Path>) -> Result<BufferHandle, SetupError> {
        match self {
            BackingKind::HeapArray => Ok(BufferHandle::HeapArray([SEED_VALUE; 1])),
            BackingKind::HeapBuffer => Ok(BufferHandle::HeapBuffer(seeded_bytes())),
            BackingKind::DirectBuffer => Ok(BufferHandle::DirectBuffer(DirectRegion::seeded())),
            BackingKind::MappedBuffer => {
                Ok(BufferHandle::MappedBuffer(MappedRegion::seeded(temp_dir)?))
            }
            BackingKind::UnsafeDirect => Ok(BufferHandle::UnsafeBuffer(RawView::over(
                BufferHandle::DirectBuffer(DirectRegion::seeded()),
            ))),
            BackingKind::UnsafeHeap => Ok(BufferHandle::UnsafeBuffer(RawView::over(
                BufferHandle::HeapBuffer(seeded_bytes()),
            ))),
        }
    }
}

fn seeded_bytes() -> Box<[u8; BUFFER_LEN]> {
    Box::new(SEED_VALUE.to_ne_bytes())
}

/// A readable region of at least 4 bytes containing `SEED_VALUE` at offset 0.
#[derive(Debug)]
pub enum BufferHandle {
    /// Single-element integer array.
    HeapArray([i32; 1]),
    /// 4-byte heap buffer, native byte order.
    HeapBuffer(Box<[u8; BUFFER_LEN]>),
    /// 4-byte off-heap region.
    DirectBuffer(DirectRegion),
    /// Mapping over the first 4 bytes of a temp file.
    MappedBuffer(MappedRegion),
    /// Raw-address view over a heap or direct buffer.
    UnsafeBuffer(RawView),
}

impl BufferHandle {
    /// Bounds-checked read of the 32-bit value at `offset` (native byte
    /// order). This is the managed accessor the unsafe path is measured
    /// against; for `UnsafeBuffer` it reads through the view's byte slice,
    /// checks included.
    #[inline]
    pub fn get_int(&self, offset: usize) -> Result<i32, ReadError> {
        match self {
            BufferHandle::HeapArray(array) => {
                if offset != 0 {
                    return Err(ReadError {
                        offset,
                        len: BUFFER_LEN,
                    });
                }
                Ok(array[0])
            }
            BufferHandle::HeapBuffer(bytes) => read_ne_i32(&bytes[..], offset),
            BufferHandle::DirectBuffer(region) => read_ne_i32(region.as_bytes(), offset),
            BufferHandle::MappedBuffer(region) => read_ne_i32(region.as_bytes(), offset),
            BufferHandle::UnsafeBuffer(view) => read_ne_i32(view.as_bytes(), offset),
        }
    }

    /// Length in bytes of the readable region.
    pub fn len(&self) -> usize {
        BUFFER_LEN
    }

    /// Regions are fixed-size and never empty.
    pub fn is_empty(&self) -> bool {
        false
    }
}

#[inline]
fn read_ne_i32(bytes: &[u8], offset: usize) -> Result<i32, ReadError> {
    let end = offset.checked_add(4).ok_or(ReadError {
        offset,
        len: bytes.len(),
    })?;
    match bytes.get(offset..end) {
        Some(window) => {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(window);
            Ok(i32::from_ne_bytes(raw))
        }
        None => Err(ReadError {
            offset,
            len: bytes.len(),
        }),
    }
}

// ─── DirectBuffer ────────────────────────────────────────────────────────────

/// Off-heap region obtained straight from the global allocator and freed in
/// `Drop`. Stands in for memory a compacting collector would never move.
#[derive(Debug)]
pub struct DirectRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the region is written once during construction and read-only
// afterwards; ownership is unique until Drop.
unsafe impl Send for DirectRegion {}
unsafe impl Sync for DirectRegion {}

impl DirectRegion {
    fn seeded() -> Self {
        // 4-byte alignment so the raw i32 read path never straddles it.
        let layout = Layout::from_size_align(BUFFER_LEN, 4).expect("static layout");
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        // SAFETY: freshly allocated region of BUFFER_LEN bytes.
        unsafe {
            ptr.as_ptr()
                .copy_from_nonoverlapping(SEED_VALUE.to_ne_bytes().as_ptr(), BUFFER_LEN);
        }
        Self { ptr, layout }
    }

    /// The region as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: ptr points to BUFFER_LEN initialized bytes owned by self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), BUFFER_LEN) }
    }
}

impl Drop for DirectRegion {
    fn drop(&mut self) {
        // SAFETY: allocated in seeded() with the same layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// ─── MappedBuffer ────────────────────────────────────────────────────────────

/// Read-only mapping over the first 4 bytes of a freshly written temp file.
///
/// The file is removed at handle teardown; removal failure is logged, never
/// fatal, matching delete-on-exit semantics. Every handle gets a unique path,
/// so a file left behind by an aborted run cannot corrupt the next one.
#[derive(Debug)]
pub struct MappedRegion {
    map: Mmap,
    file: Option<NamedTempFile>,
}

impl MappedRegion {
    fn seeded(temp_dir: Option<&Path>) -> Result<Self, SetupError> {
        let mut builder = TempBuilder::new();
        builder.prefix("bufbench-mapped-");
        let mut file = match temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|source| SetupError::Io {
            context: "create mapping backing file",
            source,
        })?;

        file.write_all(&SEED_VALUE.to_ne_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| SetupError::Io {
                context: "write mapping backing file",
                source,
            })?;

        // SAFETY: the file is owned by this handle and never truncated or
        // rewritten while the mapping exists.
        let map = unsafe { MmapOptions::new().len(BUFFER_LEN).map(file.as_file()) }.map_err(
            |source| SetupError::Io {
                context: "map backing file",
                source,
            },
        )?;

        Ok(Self {
            map,
            file: Some(file),
        })
    }

    /// The mapped bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.map[..]
    }

    /// Path of the backing file (present until teardown).
    pub fn backing_path(&self) -> Option<&Path> {
        self.file.as_ref().map(NamedTempFile::path)
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let path = file.path().to_path_buf();
            if let Err(err) = file.close() {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove mapping backing file");
            }
        }
    }
}

// ─── UnsafeBuffer ────────────────────────────────────────────────────────────

/// Raw-address view over a heap or direct buffer.
///
/// Reads through [`RawView::get_int_unchecked`] skip the bounds check the
/// wrapped buffer's own accessor performs, isolating what that check and the
/// enum dispatch cost.
#[derive(Debug)]
pub struct RawView {
    base: *const u8,
    len: usize,
    // Keeps the pointed-to region alive for the view's lifetime.
    _backing: Box<BufferHandle>,
}

// SAFETY: the backing region is immutable after construction and owned by
// the boxed handle, which never moves the bytes it points to.
unsafe impl Send for RawView {}
unsafe impl Sync for RawView {}

impl RawView {
    fn over(backing: BufferHandle) -> Self {
        let backing = Box::new(backing);
        let bytes = match &*backing {
            BufferHandle::HeapBuffer(b) => &b[..],
            BufferHandle::DirectBuffer(region) => region.as_bytes(),
            // Registry only constructs views over the two byte buffers.
            other => unreachable!("raw view over unsupported backing {other:?}"),
        };
        Self {
            base: bytes.as_ptr(),
            len: bytes.len(),
            _backing: backing,
        }
    }

    /// Read the 32-bit value at `offset` from the base address, no bounds or
    /// alignment check.
    ///
    /// # Safety
    /// `offset + 4` must not exceed [`RawView::len`].
    #[inline(always)]
    pub unsafe fn get_int_unchecked(&self, offset: usize) -> i32 {
        unsafe { std::ptr::read_unaligned(self.base.add(offset).cast::<i32>()) }
    }

    /// The viewed region, bounds-checked.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: base/len describe the backing buffer owned by self.
        unsafe { std::slice::from_raw_parts(self.base, self.len) }
    }

    /// Length of the viewed region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Views are never empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_backing_reads_one_at_offset_zero() {
        for kind in [
            BackingKind::HeapArray,
            BackingKind::HeapBuffer,
            BackingKind::DirectBuffer,
            BackingKind::MappedBuffer,
            BackingKind::UnsafeDirect,
            BackingKind::UnsafeHeap,
        ] {
            let handle = kind.create(None).expect("setup");
            assert_eq!(handle.get_int(0).unwrap(), SEED_VALUE, "{kind:?}");
        }
    }

    #[test]
    fn checked_read_rejects_out_of_bounds() {
        let handle = BackingKind::HeapBuffer.create(None).unwrap();
        let err = handle.get_int(1).unwrap_err();
        assert_eq!(err.offset, 1);
        assert_eq!(err.len, BUFFER_LEN);
        assert!(handle.get_int(usize::MAX).is_err());
    }

    #[test]
    fn unsafe_view_matches_checked_read() {
        for kind in [BackingKind::UnsafeDirect, BackingKind::UnsafeHeap] {
            let handle = kind.create(None).unwrap();
            let BufferHandle::UnsafeBuffer(view) = &handle else {
                panic!("expected raw view");
            };
            let raw = unsafe { view.get_int_unchecked(0) };
            assert_eq!(raw, handle.get_int(0).unwrap());
        }
    }

    #[test]
    fn mapped_backing_file_created_then_removed() {
        let handle = BackingKind::MappedBuffer.create(None).unwrap();
        let BufferHandle::MappedBuffer(region) = &handle else {
            panic!("expected mapped region");
        };
        let path = region.backing_path().unwrap().to_path_buf();
        assert!(path.exists(), "backing file present during scope");
        assert_eq!(handle.get_int(0).unwrap(), SEED_VALUE);
        drop(handle);
        assert!(!path.exists(), "backing file removed at teardown");
    }

    #[test]
    fn mapped_setup_failure_is_io_error() {
        let missing = Path::new("/nonexistent/bufbench-test-dir");
        let err = BackingKind::MappedBuffer.create(Some(missing)).unwrap_err();
        let SetupError::Io { context, .. } = err;
        assert_eq!(context, "create mapping backing file");
    }

    #[test]
    fn mapped_file_respects_temp_dir_override() {
        let dir = tempfile::tempdir().unwrap();
        let handle = BackingKind::MappedBuffer.create(Some(dir.path())).unwrap();
        let BufferHandle::MappedBuffer(region) = &handle else {
            panic!("expected mapped region");
        };
        assert!(region.backing_path().unwrap().starts_with(dir.path()));
    }

    #[test]
    fn direct_region_is_seeded_and_readable_after_moves() {
        let handle = BackingKind::DirectBuffer.create(None).unwrap();
        let moved = handle;
        assert_eq!(moved.get_int(0).unwrap(), SEED_VALUE);
    }
}
