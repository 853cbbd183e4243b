//! Synthetic composition-file builder shared by the integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use flate2::Compression;
use flate2::write::ZlibEncoder;
use libcmo_file::checksum::accumulate;
use libcmo_file::{CKGuid, NEMO_MAGIC, WriteMode};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

pub const ENGINE_VERSION: u32 = 0x1302_2002;

/// One object to place in the directory and data region
#[derive(Debug, Clone)]
pub struct TestObject {
    pub id: u32,
    pub class_id: i32,
    pub name: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl TestObject {
    pub fn named(id: u32, class_id: i32, name: &str, payload: &[u8]) -> Self {
        Self {
            id,
            class_id,
            name: Some(name.as_bytes().to_vec()),
            payload: payload.to_vec(),
        }
    }

    pub fn anonymous(id: u32, class_id: i32, payload: &[u8]) -> Self {
        Self {
            id,
            class_id,
            name: None,
            payload: payload.to_vec(),
        }
    }
}

/// Builder producing file images in the on-disk layout
#[derive(Debug, Clone)]
pub struct FileBuilder {
    pub version: u32,
    pub write_mode: WriteMode,
    pub compress_header: bool,
    pub objects: Vec<TestObject>,
    pub managers: Vec<(CKGuid, Vec<u8>)>,
    pub plugin_dependencies: Vec<(u32, Vec<CKGuid>)>,
    pub included_files: Vec<(String, Vec<u8>)>,
    pub max_id_saved: u32,
    pub product_version: u32,
    pub product_build: u32,
    /// Replaces the declared header unpack size when set
    pub header_unpack_override: Option<u32>,
}

/// Byte layout facts about a built image
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub header_pack_size: usize,
    pub header_unpack_size: usize,
    pub body_pack_size: usize,
    pub body_unpack_size: usize,
}

impl Layout {
    /// Range covered by the checksum after the primary header
    pub fn checksum_window(&self) -> std::ops::Range<usize> {
        32..64 + self.header_pack_size + self.body_pack_size
    }
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

impl FileBuilder {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            write_mode: WriteMode::UNCOMPRESSED,
            compress_header: false,
            objects: Vec::new(),
            managers: Vec::new(),
            plugin_dependencies: Vec::new(),
            included_files: Vec::new(),
            max_id_saved: 0,
            product_version: 5,
            product_build: 0x0205_0001,
            header_unpack_override: None,
        }
    }

    pub fn object(mut self, object: TestObject) -> Self {
        self.max_id_saved = self.max_id_saved.max(object.id);
        self.objects.push(object);
        self
    }

    pub fn manager(mut self, guid: CKGuid, data: &[u8]) -> Self {
        self.managers.push((guid, data.to_vec()));
        self
    }

    pub fn plugin_dependency(mut self, category: u32, guids: &[CKGuid]) -> Self {
        self.plugin_dependencies.push((category, guids.to_vec()));
        self
    }

    pub fn included_file(mut self, name: &str, data: &[u8]) -> Self {
        self.included_files.push((name.to_string(), data.to_vec()));
        self
    }

    pub fn compressed_header(mut self) -> Self {
        self.compress_header = true;
        self
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    fn directory(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for object in &self.objects {
            push_u32(&mut out, object.id);
            push_i32(&mut out, object.class_id);
            push_i32(&mut out, 0);
            match &object.name {
                Some(name) => {
                    push_u32(&mut out, name.len() as u32);
                    out.extend_from_slice(name);
                }
                None => push_u32(&mut out, 0),
            }
        }
        out
    }

    fn header_region(&self) -> Vec<u8> {
        let mut out = self.directory();

        push_u32(&mut out, self.plugin_dependencies.len() as u32);
        for (category, guids) in &self.plugin_dependencies {
            push_u32(&mut out, *category);
            push_u32(&mut out, guids.len() as u32);
            for guid in guids {
                push_u32(&mut out, guid.d1);
                push_u32(&mut out, guid.d2);
            }
        }

        if self.included_files.is_empty() {
            push_i32(&mut out, 0);
        } else {
            push_i32(&mut out, 4);
            push_u32(&mut out, self.included_files.len() as u32);
        }
        out
    }

    fn data_records(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (guid, data) in &self.managers {
            push_u32(&mut out, guid.d1);
            push_u32(&mut out, guid.d2);
            push_u32(&mut out, data.len() as u32);
            out.extend_from_slice(data);
        }
        for object in &self.objects {
            push_u32(&mut out, object.payload.len() as u32);
            out.extend_from_slice(&object.payload);
        }
        out
    }

    fn fixed_headers(&self, checksum: u32, header_pack: usize, layout: &Layout) -> Vec<u8> {
        let mut out = NEMO_MAGIC.to_vec();
        push_u32(&mut out, checksum);
        push_u32(&mut out, ENGINE_VERSION);
        push_u32(&mut out, self.version);
        push_u32(&mut out, 0);
        push_u32(&mut out, self.write_mode.bits());
        push_u32(&mut out, header_pack as u32);

        if self.version >= 5 {
            push_u32(&mut out, layout.body_pack_size as u32);
            push_u32(&mut out, layout.body_unpack_size as u32);
            push_u32(&mut out, self.managers.len() as u32);
            push_u32(&mut out, self.objects.len() as u32);
            push_u32(&mut out, self.max_id_saved);
            push_u32(&mut out, self.product_version);
            push_u32(&mut out, self.product_build);
            push_u32(
                &mut out,
                self.header_unpack_override
                    .unwrap_or(layout.header_unpack_size as u32),
            );
        }
        out
    }

    fn pack_body(&self, body: &[u8]) -> Vec<u8> {
        if self.write_mode.is_body_compressed() {
            zlib(body)
        } else {
            body.to_vec()
        }
    }

    /// Build the image and describe its layout
    pub fn build_with_layout(&self) -> (Vec<u8>, Layout) {
        match self.version {
            0..=6 => {
                let layout = Layout {
                    header_pack_size: 0,
                    header_unpack_size: 0,
                    body_pack_size: 0,
                    body_unpack_size: 0,
                };
                (self.fixed_headers(0, 0, &layout), layout)
            }
            7 => {
                let mut body = Vec::new();
                push_u32(&mut body, self.max_id_saved);
                push_u32(&mut body, self.objects.len() as u32);
                body.extend_from_slice(&self.data_records());
                let checksum = accumulate(0, &body);
                let packed = self.pack_body(&body);

                let layout = Layout {
                    header_pack_size: 0,
                    header_unpack_size: 0,
                    body_pack_size: packed.len(),
                    body_unpack_size: body.len(),
                };
                let mut image = self.fixed_headers(checksum, 0, &layout);
                image.extend_from_slice(&self.directory());
                image.extend_from_slice(&packed);
                (image, layout)
            }
            _ => {
                let header = self.header_region();
                let packed_header = if self.compress_header {
                    zlib(&header)
                } else {
                    header.clone()
                };
                let body = self.data_records();
                let packed_body = self.pack_body(&body);

                let layout = Layout {
                    header_pack_size: packed_header.len(),
                    header_unpack_size: header.len(),
                    body_pack_size: packed_body.len(),
                    body_unpack_size: body.len(),
                };
                let mut image = self.fixed_headers(0, packed_header.len(), &layout);
                image.extend_from_slice(&packed_header);
                image.extend_from_slice(&packed_body);
                for (name, data) in &self.included_files {
                    push_u32(&mut image, name.len() as u32);
                    image.extend_from_slice(name.as_bytes());
                    push_u32(&mut image, data.len() as u32);
                    image.extend_from_slice(data);
                }
                seal(&mut image, &layout);
                (image, layout)
            }
        }
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_layout().0
    }
}

/// Recompute and store the checksum of a version 8+ image
pub fn seal(image: &mut [u8], layout: &Layout) {
    let mut primary = image[..32].to_vec();
    primary[8..12].fill(0);
    let crc = accumulate(accumulate(0, &primary), &image[layout.checksum_window()]);
    image[8..12].copy_from_slice(&crc.to_le_bytes());
}

/// Temporary directory holding written images
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn write(&self, name: &str, image: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, image).unwrap();
        path
    }
}
