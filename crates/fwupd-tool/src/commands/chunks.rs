//! Transfer layout and checksum commands

use std::path::Path;

use anyhow::{Context, Result};
use fwupd_common::crc::{self, CrcKind};
use fwupd_stream::ChunkArray;
use serde_json::json;

use crate::commands::firmware::read_file;
use crate::output;

pub fn chunks(file: &Path, packet_size: usize, page_size: u64, address: u64, json: bool) -> Result<()> {
    let blob = read_file(file)?;
    let chunks = ChunkArray::from_bytes(&blob, address, page_size, packet_size)
        .context("invalid chunk geometry")?;
    let xml = chunks.to_xml()?;
    if json {
        output::print_success_json(json!({
            "count": chunks.len(),
            "xml": xml,
        }));
    } else {
        output::print_document(&xml);
    }
    Ok(())
}

/// Checksum of `blob` as fixed-width hex.
pub fn format_crc(kind: CrcKind, blob: &[u8]) -> String {
    let digits = usize::try_from(kind.bitwidth() / 4).unwrap_or(8);
    format!("0x{:0digits$x}", crc::crc(kind, blob))
}

pub fn checksum(file: &Path, kind: &str, json: bool) -> Result<()> {
    let kind: CrcKind = kind.parse()?;
    let blob = read_file(file)?;
    let value = format_crc(kind, &blob);
    if json {
        output::print_success_json(json!({
            "kind": kind.as_str(),
            "size": blob.len(),
            "crc": value,
        }));
    } else {
        println!("{kind}: {value}");
    }
    Ok(())
}
