//! Reader for Virtools composition files (`.nmo` / `.cmo`)
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // Format terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
//! A composition file is a single binary container holding a versioned
//! header, an object directory, per-manager data and the serialized state of
//! every saved object. This crate decodes the container layer: it validates
//! the header across all known format revisions, verifies the Adler-32
//! checksum, inflates compressed regions and rebuilds the object directory.
//! Object payloads are returned as opaque bytes.
//!
//! # Pipeline
//!
//! 1. [`source`]: the file is memory-mapped into a bounds-checked
//!    [`ByteSource`](source::ByteSource)
//! 2. [`header`]: the fixed headers are parsed, the format revision derived,
//!    the checksum verified and the header region inflated when packed
//! 3. [`directory`]: object directory, plugin dependencies and the
//!    included-file preamble are read from the header region
//! 4. [`body`]: manager data, object payloads and included files are read
//!    from the data region
//!
//! The first error aborts the load; no partially decoded file is returned.
//!
//! # Example
//!
//! ```no_run
//! use libcmo_file::CKFile;
//!
//! let file = CKFile::load("level.nmo")?;
//! println!("file version {}", file.info().file_version);
//! for object in file.objects() {
//!     println!(
//!         "{:>6} class {:>3} {}",
//!         object.object_id,
//!         object.class_id,
//!         object.name.as_deref().unwrap_or("<anonymous>")
//!     );
//! }
//! # Ok::<(), libcmo_file::CKError>(())
//! ```

#![warn(missing_docs)]

pub mod body;
pub mod checksum;
pub mod compression;
/// Load options
pub mod config;
pub mod directory;
pub mod error;
mod file;
pub mod guid;
pub mod header;
pub mod source;

pub use body::{IncludedFile, ManagerData};
pub use config::LoadOptions;
pub use directory::CKFileObjectEntry;
pub use error::{CKError, CKResult};
pub use file::CKFile;
pub use guid::{CKGuid, PluginCategory, PluginDependency};
pub use header::{CKFileInfo, FormatRevision, MAX_SUPPORTED_VERSION, NEMO_MAGIC, WriteMode};
