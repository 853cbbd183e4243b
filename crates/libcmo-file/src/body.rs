//! Data region: manager data, object payloads and included files
//!
//! The data region follows the header region. It may be zlib-compressed as a
//! whole (see [`WriteMode::is_body_compressed`](crate::WriteMode::is_body_compressed));
//! its records are opaque byte blobs as far as this reader is concerned.

use crate::checksum::accumulate;
use crate::compression::inflate;
use crate::config::LoadOptions;
use crate::directory::HeaderTables;
use crate::error::{CKError, CKResult};
use crate::guid::CKGuid;
use crate::header::{FormatRevision, ParsedHeader};
use crate::source::{ByteSource, SourceCursor};
use bytes::Bytes;
use tracing::{debug, warn};

/// Data a manager saved into the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerData {
    /// GUID of the manager that owns the data
    pub guid: CKGuid,
    /// Saved data, `None` when the manager saved nothing
    pub data: Option<Bytes>,
}

/// Auxiliary file embedded after the data region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedFile {
    /// File name as stored
    pub name: String,
    /// File contents
    pub data: Bytes,
}

/// Tables read from the data region
#[derive(Debug, Default)]
pub struct BodyTables {
    /// Manager data in on-disk order
    pub managers: Vec<ManagerData>,
    /// Included files in on-disk order
    pub included_files: Vec<IncludedFile>,
    /// Max object id re-read from the data region (version 7 only)
    pub max_id_saved: Option<u32>,
}

/// Read the data region, filling in object payloads in `tables`
pub fn parse_body(
    parsed: &ParsedHeader,
    tables: &mut HeaderTables,
    raw: &dyn ByteSource,
    options: &LoadOptions,
) -> CKResult<BodyTables> {
    let info = &parsed.info;
    let mut body_tables = BodyTables::default();
    if !parsed.revision.has_data_region() {
        return Ok(body_tables);
    }

    let start = match parsed.revision {
        FormatRevision::Checksummed => parsed.fixed_header_len() + info.header_pack_size as usize,
        // Version 7 stores the directory uncompressed; the data region
        // starts where it ends.
        _ => tables.end,
    };

    let inflated;
    let body: &[u8] = if info.write_mode.is_body_compressed() {
        inflated = inflate(
            raw,
            start,
            info.body_pack_size as usize,
            info.body_unpack_size as usize,
            options,
        )?;
        inflated.bytes()
    } else if parsed.revision == FormatRevision::Checksummed {
        raw.read(start, info.body_pack_size as usize)?
    } else {
        raw.read(start, raw.size().saturating_sub(start))?
    };
    debug!(
        "data region at {}: {} bytes ({})",
        start,
        body.len(),
        if info.write_mode.is_body_compressed() {
            "inflated"
        } else {
            "raw"
        }
    );

    let mut cursor = SourceCursor::new(&body, 0);

    if parsed.revision == FormatRevision::Directory {
        verify_body_checksum(body, info.checksum)?;

        let max_id_saved = cursor.read_i32()? as u32;
        let object_count = cursor.read_u32()?;
        if object_count as usize != tables.objects.len() {
            return Err(CKError::invalid(format!(
                "data region declares {object_count} objects, directory has {}",
                tables.objects.len()
            )));
        }
        body_tables.max_id_saved = Some(max_id_saved);
    }

    body_tables.managers = read_managers(&mut cursor, info.manager_count)?;

    for object in &mut tables.objects {
        object.pack_size = cursor.read_u32()?;
        object.data = read_blob(&mut cursor, object.pack_size)?;
    }

    if tables.included_file_count > 0 {
        let files_start = start + info.body_pack_size as usize;
        let mut cursor = SourceCursor::new(raw, files_start);
        body_tables.included_files = read_included_files(&mut cursor, tables.included_file_count)?;
    }

    Ok(body_tables)
}

fn verify_body_checksum(body: &[u8], expected: u32) -> CKResult<()> {
    let actual = accumulate(0, body);
    if actual != expected {
        warn!(
            "data region checksum mismatch: stored {:#010x}, computed {:#010x}",
            expected, actual
        );
        return Err(CKError::ChecksumError { expected, actual });
    }
    Ok(())
}

fn read_managers(cursor: &mut SourceCursor<'_>, count: u32) -> CKResult<Vec<ManagerData>> {
    let count = count as usize;
    let mut managers = Vec::with_capacity(count.min(cursor.remaining() / (CKGuid::SIZE + 4)));

    for _ in 0..count {
        let guid: CKGuid = cursor.read_struct(CKGuid::SIZE)?;
        let len = cursor.read_u32()?;
        managers.push(ManagerData {
            guid,
            data: read_blob(cursor, len)?,
        });
    }

    Ok(managers)
}

fn read_included_files(cursor: &mut SourceCursor<'_>, count: u32) -> CKResult<Vec<IncludedFile>> {
    let count = count as usize;
    let mut files = Vec::with_capacity(count.min(cursor.remaining() / 8));

    for _ in 0..count {
        let name = cursor.read_prefixed_name()?.unwrap_or_default();
        let len = cursor.read_u32()? as usize;
        let data = Bytes::copy_from_slice(cursor.read_bytes(len)?);
        debug!("included file {:?}: {} bytes", name, data.len());
        files.push(IncludedFile { name, data });
    }

    Ok(files)
}

/// Copy a `len`-byte blob out of the region; zero length means no data
fn read_blob(cursor: &mut SourceCursor<'_>, len: u32) -> CKResult<Option<Bytes>> {
    if len == 0 {
        return Ok(None);
    }
    let bytes = cursor.read_bytes(len as usize)?;
    Ok(Some(Bytes::copy_from_slice(bytes)))
}
