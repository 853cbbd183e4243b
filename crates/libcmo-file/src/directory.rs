//! Object directory, plugin dependencies and included-file preamble
//!
//! These tables live in the header region, which is read either straight from
//! the file or from its inflated copy (see [`HeaderRegion`]).

use crate::config::LoadOptions;
use crate::error::{CKError, CKResult};
use crate::guid::{CKGuid, PluginCategory, PluginDependency};
use crate::header::{HeaderRegion, ParsedHeader};
use crate::source::{ByteSource, SourceCursor};
use binrw::BinRead;
use bytes::Bytes;
use tracing::{debug, trace};

/// Fixed part of a directory record, before the name
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
#[br(little)]
struct ObjectRecord {
    object_id: u32,
    class_id: i32,
    file_index: i32,
}

impl ObjectRecord {
    const SIZE: usize = 12;
}

/// One row of the object directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CKFileObjectEntry {
    /// Object id as saved; never zero
    pub object_id: u32,
    /// Class id at save time
    pub class_id: i32,
    /// Position of the object's data in the saving engine's uncompressed buffer
    pub file_index: i32,
    /// Display name, `None` for anonymous objects
    pub name: Option<String>,
    /// Size of the serialized payload (zero until the data region is read)
    pub pack_size: u32,
    /// Serialized payload, opaque to this reader
    pub data: Option<Bytes>,
}

impl CKFileObjectEntry {
    /// Whether the object has no display name
    pub fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }
}

/// Tables read from the header region
#[derive(Debug, Default)]
pub struct HeaderTables {
    /// Object directory in on-disk order
    pub objects: Vec<CKFileObjectEntry>,
    /// Plugin dependencies grouped by category
    pub plugin_dependencies: Vec<PluginDependency>,
    /// Number of included files stored after the data region
    pub included_file_count: u32,
    /// Offset just past the tables in the header region's source
    pub end: usize,
}

/// Read the object directory and the tables that follow it
///
/// Revisions without a directory yield empty tables.
pub fn parse_tables(
    parsed: &ParsedHeader,
    raw: &dyn ByteSource,
    options: &LoadOptions,
) -> CKResult<HeaderTables> {
    let mut cursor = parsed.region.cursor(raw);
    let mut tables = HeaderTables::default();

    if parsed.revision.has_object_directory() {
        tables.objects = read_objects(&mut cursor, parsed.info.object_count)?;
    }

    if parsed.revision.has_plugin_dependencies() {
        tables.plugin_dependencies = read_plugin_dependencies(&mut cursor, options)?;
    }

    if parsed.revision.has_included_files() {
        tables.included_file_count = read_included_preamble(&mut cursor)?;
    }

    tables.end = cursor.position();
    debug!(
        "directory: {} objects, {} dependency groups, {} included files ({} source)",
        tables.objects.len(),
        tables.plugin_dependencies.len(),
        tables.included_file_count,
        match parsed.region {
            HeaderRegion::Raw { .. } => "raw",
            HeaderRegion::Inflated(_) => "inflated",
        }
    );
    Ok(tables)
}

/// Read `count` directory records
fn read_objects(cursor: &mut SourceCursor<'_>, count: u32) -> CKResult<Vec<CKFileObjectEntry>> {
    let count = count as usize;
    let mut objects = Vec::with_capacity(count.min(cursor.remaining() / (ObjectRecord::SIZE + 4)));

    for index in 0..count {
        let record: ObjectRecord = cursor.read_struct(ObjectRecord::SIZE)?;
        if record.object_id == 0 {
            return Err(CKError::invalid(format!(
                "directory entry {index} uses reserved object id 0"
            )));
        }
        let name = cursor.read_prefixed_name()?;
        trace!(
            "object {}: class {} name {:?}",
            record.object_id, record.class_id, name
        );

        objects.push(CKFileObjectEntry {
            object_id: record.object_id,
            class_id: record.class_id,
            file_index: record.file_index,
            name,
            pack_size: 0,
            data: None,
        });
    }

    Ok(objects)
}

fn read_plugin_dependencies(
    cursor: &mut SourceCursor<'_>,
    options: &LoadOptions,
) -> CKResult<Vec<PluginDependency>> {
    let count = cursor.read_u32()? as usize;
    let mut groups = Vec::with_capacity(count.min(cursor.remaining() / 8));

    for _ in 0..count {
        let category = PluginCategory::from_raw(cursor.read_u32()?);
        let guid_count = cursor.read_u32()? as usize;

        let mut guids = Vec::with_capacity(guid_count.min(cursor.remaining() / CKGuid::SIZE));
        for _ in 0..guid_count {
            guids.push(cursor.read_struct::<CKGuid>(CKGuid::SIZE)?);
        }
        let valid = guids.iter().map(|guid| options.knows_plugin(*guid)).collect();

        groups.push(PluginDependency {
            category,
            guids,
            valid,
        });
    }

    Ok(groups)
}

/// Read the included-file preamble and return the announced file count
///
/// The preamble starts with the byte size of the rest of the section. When
/// positive, the section begins with the file count; anything after that is
/// skipped.
fn read_included_preamble(cursor: &mut SourceCursor<'_>) -> CKResult<u32> {
    let section_size = cursor.read_i32()?;
    if section_size < 0 {
        return Err(CKError::invalid(format!(
            "negative included-file section size {section_size}"
        )));
    }
    if section_size == 0 {
        return Ok(0);
    }

    let section_size = section_size as usize;
    if section_size < 4 {
        return Err(CKError::invalid(format!(
            "included-file section of {section_size} bytes cannot hold a file count"
        )));
    }
    let count = cursor.read_u32()?;
    cursor.skip(section_size - 4)?;
    Ok(count)
}
