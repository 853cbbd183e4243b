//! Bounds-checked byte sources
//!
//! Everything the reader parses comes out of a [`ByteSource`]: either the
//! memory-mapped file on disk or a buffer produced by inflating a compressed
//! region. Both expose the same read semantics, and every read is checked
//! against the source size so malformed length fields surface as
//! [`CKError::OutOfRange`] instead of reading adjacent memory.

use crate::error::{CKError, CKResult};
use binrw::BinRead;
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fmt;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Uniform random-access view over a bounded run of bytes
pub trait ByteSource {
    /// Entire contents of the source
    fn bytes(&self) -> &[u8];

    /// Number of readable bytes
    fn size(&self) -> usize {
        self.bytes().len()
    }

    /// Borrow `length` bytes starting at `offset`
    ///
    /// Fails with [`CKError::OutOfRange`] if any part of the range lies past
    /// [`size`](Self::size); short reads never happen.
    fn read(&self, offset: usize, length: usize) -> CKResult<&[u8]> {
        let data = self.bytes();
        offset
            .checked_add(length)
            .filter(|&end| end <= data.len())
            .map(|end| &data[offset..end])
            .ok_or(CKError::OutOfRange {
                offset,
                length,
                size: data.len(),
            })
    }
}

impl ByteSource for &[u8] {
    fn bytes(&self) -> &[u8] {
        self
    }
}

/// Read-only mapping of a file on disk
pub struct MappedFileSource {
    path: PathBuf,
    mmap: Mmap,
}

impl MappedFileSource {
    /// Map `path` read-only
    ///
    /// Files too short to hold even the primary header are rejected before
    /// mapping, which also sidesteps platforms that refuse empty mappings.
    pub fn open(path: impl AsRef<Path>, min_len: u64) -> CKResult<Self> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| CKError::Open {
            path: path.clone(),
            source,
        };

        let file = File::open(&path).map_err(open_err)?;
        let len = file.metadata().map_err(open_err)?.len();
        if len < min_len {
            return Err(CKError::invalid(format!(
                "file is {len} bytes, shorter than the {min_len} byte header"
            )));
        }

        // The mapping is private to this reader and the file is only read.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(open_err)?;

        trace!("mapped {} ({} bytes)", path.display(), mmap.len());
        Ok(Self { path, mmap })
    }

    /// Path the mapping was created from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for MappedFileSource {
    fn bytes(&self) -> &[u8] {
        &self.mmap
    }
}

impl fmt::Debug for MappedFileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedFileSource")
            .field("path", &self.path)
            .field("size", &self.mmap.len())
            .finish()
    }
}

/// Backing storage of a [`MaterializedSource`]
enum Storage {
    Heap(Vec<u8>),
    Anonymous(Mmap),
}

/// Owned buffer holding an inflated region
///
/// Small regions live on the heap; regions at or above the anonymous-map
/// threshold are placed in an anonymous memory map. Which one was picked is
/// only visible through [`is_anonymous_map`](Self::is_anonymous_map).
pub struct MaterializedSource {
    storage: Storage,
}

/// Writable buffer a [`MaterializedSource`] is filled through
pub(crate) enum MaterializedBuffer {
    Heap(Vec<u8>),
    Anonymous(MmapMut),
}

impl MaterializedBuffer {
    /// Zeroed buffer of `len` bytes, anonymous-mapped when `len >= anon_threshold`
    pub(crate) fn allocate(len: usize, anon_threshold: usize) -> CKResult<Self> {
        if len > 0 && len >= anon_threshold {
            let map = MmapOptions::new().len(len).map_anon().map_err(|e| {
                CKError::corrupt(format!("cannot reserve {len} bytes for inflated data: {e}"))
            })?;
            Ok(Self::Anonymous(map))
        } else {
            Ok(Self::Heap(vec![0u8; len]))
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Self::Heap(buf) => buf.as_mut_slice(),
            Self::Anonymous(map) => &mut map[..],
        }
    }

    /// Freeze the buffer into a read-only source
    pub(crate) fn freeze(self) -> CKResult<MaterializedSource> {
        let storage = match self {
            Self::Heap(buf) => Storage::Heap(buf),
            Self::Anonymous(map) => Storage::Anonymous(map.make_read_only().map_err(|e| {
                CKError::corrupt(format!("cannot seal inflated data: {e}"))
            })?),
        };
        Ok(MaterializedSource { storage })
    }
}

impl MaterializedSource {
    /// Wrap an already-owned buffer
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            storage: Storage::Heap(data),
        }
    }

    /// Whether the contents live in an anonymous memory map
    pub fn is_anonymous_map(&self) -> bool {
        matches!(self.storage, Storage::Anonymous(_))
    }
}

impl ByteSource for MaterializedSource {
    fn bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Heap(buf) => buf.as_slice(),
            Storage::Anonymous(map) => &map[..],
        }
    }
}

impl fmt::Debug for MaterializedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterializedSource")
            .field("size", &self.size())
            .field("anonymous_map", &self.is_anonymous_map())
            .finish()
    }
}

/// Sequential little-endian reader over a [`ByteSource`]
pub struct SourceCursor<'a> {
    source: &'a dyn ByteSource,
    position: usize,
}

impl<'a> SourceCursor<'a> {
    /// Cursor positioned at `position` inside `source`
    pub fn new(source: &'a dyn ByteSource, position: usize) -> Self {
        Self { source, position }
    }

    /// Current offset into the source
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left between the cursor and the end of the source
    pub fn remaining(&self) -> usize {
        self.source.size().saturating_sub(self.position)
    }

    /// Borrow the next `length` bytes and advance past them
    pub fn read_bytes(&mut self, length: usize) -> CKResult<&'a [u8]> {
        let source = self.source;
        let data = source.read(self.position, length)?;
        self.position += length;
        Ok(data)
    }

    /// Advance without reading
    pub fn skip(&mut self, length: usize) -> CKResult<()> {
        self.read_bytes(length).map(|_| ())
    }

    /// Next little-endian u32
    pub fn read_u32(&mut self) -> CKResult<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Next little-endian i32
    pub fn read_i32(&mut self) -> CKResult<i32> {
        self.read_u32().map(|v| v as i32)
    }

    /// Next `size` bytes decoded as a little-endian fixed-layout structure
    pub fn read_struct<T>(&mut self, size: usize) -> CKResult<T>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
    {
        let bytes = self.read_bytes(size)?;
        let value = T::read_options(&mut Cursor::new(bytes), binrw::Endian::Little, ())?;
        Ok(value)
    }

    /// Next `u32` length-prefixed string, decoded as lossy UTF-8
    ///
    /// Returns `None` for a zero length. Invalid sequences are replaced with
    /// U+FFFD rather than failing the read.
    pub fn read_prefixed_name(&mut self) -> CKResult<Option<String>> {
        let len = self.read_u32()? as usize;
        if len == 0 {
            return Ok(None);
        }
        let raw = self.read_bytes(len)?;
        Ok(Some(String::from_utf8_lossy(raw).into_owned()))
    }
}

impl fmt::Debug for SourceCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCursor")
            .field("position", &self.position)
            .field("size", &self.source.size())
            .finish()
    }
}
