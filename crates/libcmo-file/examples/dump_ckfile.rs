//! Dump the header, directory and tables of a composition file.
//!
//! Usage:
//!   cargo run --example dump_ckfile -p libcmo-file -- path/to/level.nmo
//!   RUST_LOG=libcmo_file=debug cargo run --example dump_ckfile -p libcmo-file -- \
//!       --header-only --known-plugin 0x6bed328b,0x141f5148 level.cmo

use anyhow::{Context, Result};
use clap::Parser;
use libcmo_file::{CKFile, CKGuid, LoadOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dump_ckfile")]
struct Cli {
    /// Composition file to read.
    pub file: PathBuf,

    /// Stop after the header region; payloads are not read.
    #[clap(long)]
    pub header_only: bool,

    /// Newest file format version to accept.
    #[clap(long)]
    pub max_version: Option<u32>,

    /// Inflated regions of at least this many bytes go to an anonymous map.
    #[clap(long)]
    pub map_threshold: Option<usize>,

    /// Plugin GUID to report as available, written `0xd1,0xd2`.
    #[clap(long = "known-plugin", value_parser = parse_guid)]
    pub known_plugins: Vec<CKGuid>,

    /// Show every directory entry instead of the first 50.
    #[clap(long)]
    pub all: bool,
}

fn parse_guid(value: &str) -> Result<CKGuid, String> {
    let (d1, d2) = value
        .split_once(',')
        .ok_or_else(|| format!("expected `d1,d2`, got {value:?}"))?;
    let word = |s: &str| {
        let s = s.trim();
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        u32::from_str_radix(digits, 16).map_err(|e| format!("bad GUID word {s:?}: {e}"))
    };
    Ok(CKGuid::new(word(d1)?, word(d2)?))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
    let args = Cli::parse();

    let mut options = LoadOptions::new();
    if args.header_only {
        options = options.header_only();
    }
    if let Some(version) = args.max_version {
        options = options.with_max_file_version(version);
    }
    if let Some(threshold) = args.map_threshold {
        options = options.with_anonymous_map_threshold(threshold);
    }
    for guid in args.known_plugins {
        options = options.with_known_plugin(guid);
    }

    let file = CKFile::load_with(&args.file, &options)
        .with_context(|| format!("failed to load {}", args.file.display()))?;
    let info = file.info();

    println!("=== {} ===", file.path().display());
    println!("  File version:    {} ({:?})", info.file_version, file.revision());
    println!("  Engine version:  {:#010x}", info.engine_version);
    println!(
        "  Product:         {} build {:#010x}",
        info.product_version, info.product_build
    );
    println!("  Write mode:      {:#x}", info.write_mode.bits());
    println!("  File size:       {}", info.file_size);
    println!("  Checksum:        {:#010x}", info.checksum);
    println!(
        "  Header region:   {} packed / {} unpacked",
        info.header_pack_size, info.header_unpack_size
    );
    println!(
        "  Data region:     {} packed / {} unpacked",
        info.body_pack_size, info.body_unpack_size
    );
    println!("  Max saved id:    {}", file.save_id_max());
    println!();

    println!("=== Objects ({}) ===", file.objects().len());
    let shown = if args.all { usize::MAX } else { 50 };
    for object in file.objects().iter().take(shown) {
        println!(
            "  {:>8}  class {:>4}  {:>8} bytes  {}",
            object.object_id,
            object.class_id,
            object.pack_size,
            object.name.as_deref().unwrap_or("<anonymous>")
        );
    }
    if file.objects().len() > shown {
        println!("  ... {} more", file.objects().len() - shown);
    }
    println!();

    if !file.plugin_dependencies().is_empty() {
        println!("=== Plugin dependencies ===");
        for dep in file.plugin_dependencies() {
            println!("  {:?}:", dep.category);
            for (guid, valid) in dep.guids.iter().zip(&dep.valid) {
                println!("    {guid} {}", if *valid { "" } else { "(missing)" });
            }
        }
        println!();
    }

    if !file.managers().is_empty() {
        println!("=== Managers ({}) ===", file.managers().len());
        for manager in file.managers() {
            let len = manager.data.as_ref().map_or(0, |d| d.len());
            println!("  {}  {len} bytes", manager.guid);
        }
        println!();
    }

    if !file.included_files().is_empty() {
        println!("=== Included files ===");
        for included in file.included_files() {
            println!("  {}  {} bytes", included.name, included.data.len());
        }
    }

    Ok(())
}
