//! Loaded composition file

use crate::body::{IncludedFile, ManagerData, parse_body};
use crate::config::LoadOptions;
use crate::directory::{CKFileObjectEntry, parse_tables};
use crate::error::{CKError, CKResult};
use crate::guid::PluginDependency;
use crate::header::{CKFileInfo, FormatRevision, PrimaryHeader, parse_header};
use crate::source::MappedFileSource;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A fully decoded composition file
///
/// Produced only by a successful [`load`](Self::load); everything it exposes
/// is owned, so the file on disk is unmapped and closed by the time `load`
/// returns.
#[derive(Debug, Clone)]
pub struct CKFile {
    path: PathBuf,
    info: CKFileInfo,
    revision: FormatRevision,
    objects: Vec<CKFileObjectEntry>,
    plugin_dependencies: Vec<PluginDependency>,
    managers: Vec<ManagerData>,
    included_files: Vec<IncludedFile>,
    save_id_max: u32,
}

impl CKFile {
    /// Load `path` with default options
    pub fn load(path: impl AsRef<Path>) -> CKResult<Self> {
        Self::load_with(path, &LoadOptions::default())
    }

    /// Load `path` with explicit options
    pub fn load_with(path: impl AsRef<Path>, options: &LoadOptions) -> CKResult<Self> {
        let path = path.as_ref();
        options.validate().map_err(CKError::InvalidOptions)?;

        let raw = MappedFileSource::open(path, PrimaryHeader::SIZE as u64)?;
        info!("loading {}", path.display());

        let parsed = parse_header(&raw, options)?;
        let mut tables = parse_tables(&parsed, &raw, options)?;

        let body = if options.read_body {
            parse_body(&parsed, &mut tables, &raw, options)?
        } else {
            debug!("skipping data region");
            Default::default()
        };

        let save_id_max = body.max_id_saved.unwrap_or(parsed.info.max_id_saved);
        let file = Self {
            path: path.to_path_buf(),
            info: parsed.info,
            revision: parsed.revision,
            objects: tables.objects,
            plugin_dependencies: tables.plugin_dependencies,
            managers: body.managers,
            included_files: body.included_files,
            save_id_max,
        };

        debug!(
            "loaded {}: version {}, {} objects, {} managers, {} included files",
            file.path.display(),
            file.info.file_version,
            file.objects.len(),
            file.managers.len(),
            file.included_files.len()
        );
        Ok(file)
    }

    /// Path the file was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header metadata
    pub fn info(&self) -> &CKFileInfo {
        &self.info
    }

    /// Layout family of the file
    pub fn revision(&self) -> FormatRevision {
        self.revision
    }

    /// Object directory in on-disk order
    pub fn objects(&self) -> &[CKFileObjectEntry] {
        &self.objects
    }

    /// Look up a directory entry by its saved object id
    pub fn object(&self, object_id: u32) -> Option<&CKFileObjectEntry> {
        self.objects.iter().find(|o| o.object_id == object_id)
    }

    /// Plugin dependencies (version 8 and later)
    pub fn plugin_dependencies(&self) -> &[PluginDependency] {
        &self.plugin_dependencies
    }

    /// Manager data records
    pub fn managers(&self) -> &[ManagerData] {
        &self.managers
    }

    /// Files embedded after the data region
    pub fn included_files(&self) -> &[IncludedFile] {
        &self.included_files
    }

    /// Largest object id at save time
    ///
    /// Taken from the data region for version 7 files, from the header
    /// otherwise.
    pub fn save_id_max(&self) -> u32 {
        self.save_id_max
    }
}
