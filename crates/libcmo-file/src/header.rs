//! File header structures and parsing
//!
//! A composition file opens with two fixed 32-byte blocks of little-endian
//! words. The primary block carries the magic, checksum and format version;
//! the secondary block (format version 5 and later) carries region sizes and
//! object counts. Which blocks and which later sections exist depends on the
//! format version, summarised by [`FormatRevision`].
//!
//! ```text
//! offset  primary (32 bytes)          secondary (32 bytes, v >= 5)
//! 0x00    magic "Nemo Fi\0"           0x20  body pack size
//! 0x08    checksum                    0x24  body unpack size
//! 0x0C    engine version              0x28  manager count
//! 0x10    file version                0x2C  object count
//! 0x14    reserved (zero)             0x30  max object id saved
//! 0x18    write mode                  0x34  product version
//! 0x1C    header pack size            0x38  product build
//!                                     0x3C  header unpack size
//! ```

use crate::checksum::{Adler32, finalize};
use crate::compression::inflate;
use crate::config::LoadOptions;
use crate::error::{CKError, CKResult};
use crate::source::{ByteSource, MaterializedSource, SourceCursor};
use binrw::{BinRead, BinWrite};
use std::io::Cursor;
use tracing::{debug, warn};

/// Magic marker at offset 0
pub const NEMO_MAGIC: [u8; 8] = *b"Nemo Fi\0";

/// Newest file format version this reader understands
pub const MAX_SUPPORTED_VERSION: u32 = 9;

/// Product version values at or above this are reset on load
const PRODUCT_VERSION_RESET_THRESHOLD: u32 = 12;

/// Product build substituted when the product version is reset
const DEFAULT_PRODUCT_BUILD: u32 = 0x0101_0000;

/// Layout family derived from the file format version
///
/// Computed once from the version word; every later decision about which
/// sections exist goes through the predicates on this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatRevision {
    /// Versions 0-4: primary header only
    Legacy,
    /// Versions 5-6: primary and secondary header, no directory in the header
    SplitHeader,
    /// Version 7: uncompressed object directory, data region carries its own checksum
    Directory,
    /// Versions 8-9: whole-file checksum, packable header region, plugin
    /// dependencies and included files
    Checksummed,
}

impl FormatRevision {
    /// Revision for a version word; `None` above [`MAX_SUPPORTED_VERSION`]
    pub const fn from_version(version: u32) -> Option<Self> {
        match version {
            0..=4 => Some(Self::Legacy),
            5 | 6 => Some(Self::SplitHeader),
            7 => Some(Self::Directory),
            8 | 9 => Some(Self::Checksummed),
            _ => None,
        }
    }

    /// A secondary header follows the primary one
    pub fn has_secondary_header(self) -> bool {
        self >= Self::SplitHeader
    }

    /// Header and data region are covered by the stored checksum, and the
    /// header region may be compressed
    pub fn has_header_checksum(self) -> bool {
        self >= Self::Checksummed
    }

    /// The header region holds the object directory
    pub fn has_object_directory(self) -> bool {
        self >= Self::Directory
    }

    /// The header region holds a plugin dependency table
    pub fn has_plugin_dependencies(self) -> bool {
        self >= Self::Checksummed
    }

    /// The header region announces included files stored after the data region
    pub fn has_included_files(self) -> bool {
        self >= Self::Checksummed
    }

    /// A data region with manager and object payloads follows the header region
    pub fn has_data_region(self) -> bool {
        self >= Self::Directory
    }
}

/// Save options recorded in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WriteMode(pub u32);

impl WriteMode {
    /// Data saved uncompressed
    pub const UNCOMPRESSED: Self = Self(0);
    /// Data compressed chunk by chunk (obsolete)
    pub const CHUNK_COMPRESSED_OLD: Self = Self(1);
    /// Textures stored externally (obsolete)
    pub const EXTERNAL_TEXTURES_OLD: Self = Self(2);
    /// No interface data saved; not editable
    pub const FOR_VIEWER: Self = Self(4);
    /// Whole data region compressed
    pub const WHOLE_COMPRESSED: Self = Self(8);

    /// Raw flag word
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the data region is stored zlib-compressed
    pub const fn is_body_compressed(self) -> bool {
        self.0 & (Self::CHUNK_COMPRESSED_OLD.0 | Self::WHOLE_COMPRESSED.0) != 0
    }
}

/// First 32-byte header block
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct PrimaryHeader {
    /// Magic marker, [`NEMO_MAGIC`] in valid files
    pub magic: [u8; 8],
    /// Adler-32 of the header and packed regions
    pub checksum: u32,
    /// Build identifier of the engine that saved the file
    pub engine_version: u32,
    /// File format version
    pub file_version: u32,
    /// Reserved, zero in valid files
    pub reserved: u32,
    /// [`WriteMode`] flags
    pub write_mode: u32,
    /// Packed size of the header region
    pub header_pack_size: u32,
}

impl PrimaryHeader {
    /// On-disk size
    pub const SIZE: usize = 32;

    /// Serialized bytes with the checksum word zeroed
    ///
    /// This is the form the stored checksum is computed over.
    pub fn checksum_input(&self) -> CKResult<[u8; Self::SIZE]> {
        let mut header = *self;
        header.checksum = 0;

        let mut out = [0u8; Self::SIZE];
        header.write(&mut Cursor::new(&mut out[..]))?;
        Ok(out)
    }
}

/// Second 32-byte header block (version 5 and later)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
#[brw(little)]
pub struct SecondaryHeader {
    /// Packed size of the data region
    pub body_pack_size: u32,
    /// Unpacked size of the data region
    pub body_unpack_size: u32,
    /// Number of manager data records in the data region
    pub manager_count: u32,
    /// Number of objects in the directory
    pub object_count: u32,
    /// Largest object id at save time
    pub max_id_saved: u32,
    /// Product version of the saving application
    pub product_version: u32,
    /// Product build of the saving application
    pub product_build: u32,
    /// Unpacked size of the header region
    pub header_unpack_size: u32,
}

impl SecondaryHeader {
    /// On-disk size
    pub const SIZE: usize = 32;
}

/// Header metadata of a loaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CKFileInfo {
    /// File format version
    pub file_version: u32,
    /// Build identifier of the engine that saved the file
    pub engine_version: u32,
    /// Product version of the saving application
    pub product_version: u32,
    /// Product build of the saving application
    pub product_build: u32,
    /// Save options
    pub write_mode: WriteMode,
    /// Size of the file on disk in bytes
    pub file_size: u64,
    /// Number of objects in the directory
    ///
    /// Zero for revisions without an object directory (before version 7),
    /// whatever the secondary header declares.
    pub object_count: u32,
    /// Number of manager data records
    pub manager_count: u32,
    /// Largest object id at save time
    pub max_id_saved: u32,
    /// Packed size of the header region (zero before version 8)
    pub header_pack_size: u32,
    /// Unpacked size of the header region (zero before version 8)
    pub header_unpack_size: u32,
    /// Packed size of the data region
    pub body_pack_size: u32,
    /// Unpacked size of the data region
    pub body_unpack_size: u32,
    /// Stored checksum
    pub checksum: u32,
}

impl CKFileInfo {
    fn from_headers(
        primary: &PrimaryHeader,
        secondary: &SecondaryHeader,
        revision: FormatRevision,
        file_size: u64,
    ) -> Self {
        let packable = revision.has_header_checksum();
        Self {
            file_version: primary.file_version,
            engine_version: primary.engine_version,
            product_version: secondary.product_version,
            product_build: secondary.product_build,
            write_mode: WriteMode(primary.write_mode),
            file_size,
            object_count: if revision.has_object_directory() {
                secondary.object_count
            } else {
                0
            },
            manager_count: secondary.manager_count,
            max_id_saved: secondary.max_id_saved,
            header_pack_size: if packable { primary.header_pack_size } else { 0 },
            header_unpack_size: if packable {
                secondary.header_unpack_size
            } else {
                0
            },
            body_pack_size: secondary.body_pack_size,
            body_unpack_size: secondary.body_unpack_size,
            checksum: primary.checksum,
        }
    }

    /// Whether the header region is stored compressed
    pub fn is_header_compressed(&self) -> bool {
        self.header_pack_size != self.header_unpack_size
    }
}

/// Where the header region is read from
#[derive(Debug)]
pub enum HeaderRegion {
    /// Directly from the raw file, starting at `offset`
    Raw {
        /// Offset of the header region in the raw file
        offset: usize,
    },
    /// From an inflated copy of the packed header region
    Inflated(MaterializedSource),
}

impl HeaderRegion {
    /// Cursor at the start of the header region
    pub fn cursor<'a>(&'a self, raw: &'a dyn ByteSource) -> SourceCursor<'a> {
        match self {
            Self::Raw { offset } => SourceCursor::new(raw, *offset),
            Self::Inflated(source) => SourceCursor::new(source, 0),
        }
    }

    /// Whether the region was inflated
    pub fn is_inflated(&self) -> bool {
        matches!(self, Self::Inflated(_))
    }
}

/// Result of header parsing
#[derive(Debug)]
pub struct ParsedHeader {
    /// Header metadata
    pub info: CKFileInfo,
    /// Layout family of the file
    pub revision: FormatRevision,
    /// Source the object directory is read from
    pub region: HeaderRegion,
}

impl ParsedHeader {
    /// Offset just past the fixed header blocks
    pub fn fixed_header_len(&self) -> usize {
        if self.revision.has_secondary_header() {
            PrimaryHeader::SIZE + SecondaryHeader::SIZE
        } else {
            PrimaryHeader::SIZE
        }
    }
}

/// Parse and validate the fixed headers of `raw`
///
/// For checksummed revisions this also verifies the stored Adler-32 and
/// inflates the header region when its packed and unpacked sizes differ.
pub fn parse_header(raw: &dyn ByteSource, options: &LoadOptions) -> CKResult<ParsedHeader> {
    let file_size = raw.size();
    let mut cursor = SourceCursor::new(raw, 0);

    let bytes = cursor.read_bytes(PrimaryHeader::SIZE).map_err(|_| {
        CKError::invalid(format!(
            "file is {file_size} bytes, primary header needs {}",
            PrimaryHeader::SIZE
        ))
    })?;
    let primary = PrimaryHeader::read(&mut Cursor::new(bytes))?;

    if primary.magic != NEMO_MAGIC {
        return Err(CKError::invalid(format!(
            "bad magic {:02X?}, expected {:02X?}",
            primary.magic, NEMO_MAGIC
        )));
    }

    let max = options.max_file_version.min(MAX_SUPPORTED_VERSION);
    let revision = FormatRevision::from_version(primary.file_version)
        .filter(|_| primary.file_version <= max)
        .ok_or(CKError::UnsupportedVersion {
            version: primary.file_version,
            max,
        })?;

    let mut secondary = if revision.has_secondary_header() {
        let bytes = cursor.read_bytes(SecondaryHeader::SIZE).map_err(|_| {
            CKError::invalid(format!(
                "file is {file_size} bytes, secondary header needs {}",
                PrimaryHeader::SIZE + SecondaryHeader::SIZE
            ))
        })?;
        SecondaryHeader::read(&mut Cursor::new(bytes))?
    } else {
        SecondaryHeader::default()
    };

    if secondary.product_version >= PRODUCT_VERSION_RESET_THRESHOLD {
        debug!(
            "product version {} out of range, resetting",
            secondary.product_version
        );
        secondary.product_version = 0;
        secondary.product_build = DEFAULT_PRODUCT_BUILD;
    }

    let info = CKFileInfo::from_headers(&primary, &secondary, revision, file_size as u64);
    debug!(
        "file version {} ({:?}), {} objects, {} managers, write mode {:#x}",
        info.file_version,
        revision,
        info.object_count,
        info.manager_count,
        info.write_mode.bits()
    );

    if revision.has_header_checksum() {
        verify_checksum(raw, &primary, &info)?;
    }

    // Word 5 is zero in every file the engine writes
    if primary.reserved != 0 {
        return Err(CKError::invalid(format!(
            "reserved header word is {:#x}, expected 0",
            primary.reserved
        )));
    }

    let region_offset = cursor.position();
    let region = if revision.has_header_checksum() && info.is_header_compressed() {
        HeaderRegion::Inflated(inflate(
            raw,
            region_offset,
            info.header_pack_size as usize,
            info.header_unpack_size as usize,
            options,
        )?)
    } else {
        HeaderRegion::Raw {
            offset: region_offset,
        }
    };

    Ok(ParsedHeader {
        info,
        revision,
        region,
    })
}

/// Recompute the whole-file checksum of a checksummed revision
///
/// Input: the primary header with its checksum word zeroed, then the raw
/// bytes from the secondary header through the end of the packed data
/// region.
///
/// Fails with [`CKError::OutOfRange`] when the window runs past the end of
/// `raw`.
pub fn compute_checksum(
    raw: &dyn ByteSource,
    primary: &PrimaryHeader,
    info: &CKFileInfo,
) -> CKResult<u32> {
    let window = raw.read(PrimaryHeader::SIZE, checksum_window_len(info))?;
    checksum_over(primary, window)
}

fn checksum_window_len(info: &CKFileInfo) -> usize {
    SecondaryHeader::SIZE + info.header_pack_size as usize + info.body_pack_size as usize
}

fn checksum_over(primary: &PrimaryHeader, window: &[u8]) -> CKResult<u32> {
    let mut adler = Adler32::new();
    adler.update(&primary.checksum_input()?);
    adler.update(window);
    Ok(finalize(adler.finish()))
}

/// Compare the stored checksum against the file contents
///
/// A window reaching past the end of the file is reported as a mismatch,
/// with `actual` folded over the bytes that are present.
fn verify_checksum(
    raw: &dyn ByteSource,
    primary: &PrimaryHeader,
    info: &CKFileInfo,
) -> CKResult<()> {
    let window_len = checksum_window_len(info);
    let available = raw.size().saturating_sub(PrimaryHeader::SIZE);
    if window_len > available {
        warn!(
            "checksum window of {} bytes exceeds the {} bytes after the primary header",
            window_len, available
        );
    }

    let window = raw.read(PrimaryHeader::SIZE, window_len.min(available))?;
    let actual = checksum_over(primary, window)?;
    if window_len > available || actual != info.checksum {
        warn!(
            "checksum mismatch: stored {:#010x}, computed {:#010x}",
            info.checksum, actual
        );
        return Err(CKError::ChecksumError {
            expected: info.checksum,
            actual,
        });
    }
    Ok(())
}
