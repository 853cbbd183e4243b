//! Engine GUIDs and plugin dependency records

use binrw::{BinRead, BinWrite};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two-word engine GUID identifying a plugin or manager
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, BinRead, BinWrite, Serialize, Deserialize,
)]
#[brw(little)]
pub struct CKGuid {
    /// First GUID word
    pub d1: u32,
    /// Second GUID word
    pub d2: u32,
}

impl CKGuid {
    /// On-disk size of a GUID
    pub const SIZE: usize = 8;

    /// Create a GUID from its two words
    pub const fn new(d1: u32, d2: u32) -> Self {
        Self { d1, d2 }
    }

    /// Whether both words are zero
    pub const fn is_null(&self) -> bool {
        self.d1 == 0 && self.d2 == 0
    }
}

impl fmt::Display for CKGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{0x{:08x},0x{:08x}}}", self.d1, self.d2)
    }
}

/// Kind of plugin a dependency refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginCategory {
    /// Bitmap (texture, sprite) reader
    BitmapReader,
    /// Sound reader
    SoundReader,
    /// 3D model reader
    ModelReader,
    /// Plugin implementing a manager
    ManagerDll,
    /// Plugin implementing behaviors
    BehaviorDll,
    /// Render engine
    RenderEngineDll,
    /// Movie reader
    MovieReader,
    /// Generic extension (parameter types, operations)
    ExtensionDll,
    /// Category value this reader does not know
    Unknown(u32),
}

impl PluginCategory {
    /// Parse from the raw category word
    pub const fn from_raw(value: u32) -> Self {
        match value {
            0 => Self::BitmapReader,
            1 => Self::SoundReader,
            2 => Self::ModelReader,
            3 => Self::ManagerDll,
            4 => Self::BehaviorDll,
            5 => Self::RenderEngineDll,
            6 => Self::MovieReader,
            7 => Self::ExtensionDll,
            other => Self::Unknown(other),
        }
    }

    /// Raw category word
    pub const fn as_raw(&self) -> u32 {
        match self {
            Self::BitmapReader => 0,
            Self::SoundReader => 1,
            Self::ModelReader => 2,
            Self::ManagerDll => 3,
            Self::BehaviorDll => 4,
            Self::RenderEngineDll => 5,
            Self::MovieReader => 6,
            Self::ExtensionDll => 7,
            Self::Unknown(value) => *value,
        }
    }
}

/// Plugins of one category the file depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDependency {
    /// Plugin category
    pub category: PluginCategory,
    /// GUIDs in on-disk order
    pub guids: Vec<CKGuid>,
    /// `valid[i]` is true when `guids[i]` is available to the caller
    pub valid: Vec<bool>,
}

impl PluginDependency {
    /// GUIDs of this category the caller cannot resolve
    pub fn missing(&self) -> impl Iterator<Item = CKGuid> + '_ {
        self.guids
            .iter()
            .zip(&self.valid)
            .filter(|(_, valid)| !**valid)
            .map(|(guid, _)| *guid)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_guid_reads_little_endian() {
        let bytes = [0x78, 0x56, 0x34, 0x12, 0xEF, 0xCD, 0xAB, 0x90];
        let guid = CKGuid::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(guid, CKGuid::new(0x1234_5678, 0x90AB_CDEF));
        assert_eq!(guid.to_string(), "{0x12345678,0x90abcdef}");
    }

    #[test]
    fn test_null_guid() {
        assert!(CKGuid::default().is_null());
        assert!(!CKGuid::new(0, 1).is_null());
    }

    #[test]
    fn test_category_raw_values() {
        for raw in 0..8 {
            assert_eq!(PluginCategory::from_raw(raw).as_raw(), raw);
        }
        assert_eq!(PluginCategory::from_raw(3), PluginCategory::ManagerDll);
        assert_eq!(PluginCategory::from_raw(42), PluginCategory::Unknown(42));
        assert_eq!(PluginCategory::Unknown(42).as_raw(), 42);
    }

    #[test]
    fn test_missing_dependencies() {
        let dep = PluginDependency {
            category: PluginCategory::BehaviorDll,
            guids: vec![CKGuid::new(1, 1), CKGuid::new(2, 2), CKGuid::new(3, 3)],
            valid: vec![true, false, true],
        };
        assert_eq!(dep.missing().collect::<Vec<_>>(), vec![CKGuid::new(2, 2)]);
    }
}
