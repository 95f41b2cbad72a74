//! Firmware container commands
//!
//! - `firmware-parse <file>` - Print the image tree
//! - `firmware-export <file>` - Print the XML export
//! - `firmware-build <builder.xml> <out>` - Build an image from XML
//! - `firmware-convert <in> <out>` - Parse then write an image

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use fwupd_firmware::{Firmware, ParseConfig, ParseFlags};
use serde_json::json;
use tracing::{debug, info};

use crate::commands::ParseArgs;
use crate::error::CliError;
use crate::output;

/// Formats tried in order when no format is given.
pub const DETECT_ORDER: &[&str] = &[
    "efi-volume",
    "ifwi-fpt",
    "efi-vss2-variable-store",
    "acpi-table",
];

pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(CliError::from)
        .with_context(|| format!("failed to read {}", path.display()))
}

pub fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data)
        .map_err(CliError::from)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn parse_as(
    format: &str,
    blob: &[u8],
    offset: u64,
    flags: ParseFlags,
    config: &ParseConfig,
) -> fwupd_errors::Result<Firmware> {
    let mut fw = Firmware::from_name(format)?;
    fw.parse_with_config(&mut Cursor::new(blob), offset, flags, config)?;
    Ok(fw)
}

/// Parse the file named by `args`, detecting the format if needed.
pub fn load(args: &ParseArgs, config: &ParseConfig) -> Result<Firmware> {
    let blob = read_file(&args.file)?;
    let flags = args.flags();
    if let Some(format) = &args.format {
        return parse_as(format, &blob, args.offset, flags, config)
            .with_context(|| format!("failed to parse {}", args.file.display()));
    }
    for format in DETECT_ORDER {
        match parse_as(format, &blob, args.offset, flags, config) {
            Ok(fw) => {
                info!("detected {format} in {}", args.file.display());
                return Ok(fw);
            }
            Err(e) => debug!("not {format}: {e}"),
        }
    }
    Err(CliError::UnknownFormat(args.file.clone()).into())
}

pub fn parse(args: &ParseArgs, config: &ParseConfig, json: bool) -> Result<()> {
    let fw = load(args, config)?;
    if json {
        output::print_success_json(json!({
            "format": fw.format_name(),
            "size": fw.base().size,
            "images": fw.images().len(),
            "tree": fw.to_string(),
        }));
    } else {
        print!("{fw}");
    }
    Ok(())
}

pub fn export(args: &ParseArgs, config: &ParseConfig, json: bool) -> Result<()> {
    let fw = load(args, config)?;
    let xml = fw.export_xml()?;
    if json {
        output::print_success_json(json!({
            "format": fw.format_name(),
            "xml": xml,
        }));
    } else {
        output::print_document(&xml);
    }
    Ok(())
}

fn report_written(fw: &Firmware, path: &Path, size: usize, json: bool) {
    if json {
        output::print_success_json(json!({
            "format": fw.format_name(),
            "output": path.display().to_string(),
            "size": size,
        }));
    } else {
        println!(
            "{} Wrote {} image of {size} bytes to {}",
            "✓".green(),
            fw.format_name().bold(),
            path.display()
        );
    }
}

pub fn build(builder: &Path, out: &Path, json: bool) -> Result<()> {
    let xml = std::fs::read_to_string(builder)
        .map_err(CliError::from)
        .with_context(|| format!("failed to read {}", builder.display()))?;
    let fw = Firmware::build_from_xml(&xml)
        .with_context(|| format!("failed to build {}", builder.display()))?;
    let blob = fw.write()?;
    write_file(out, &blob)?;
    report_written(&fw, out, blob.len(), json);
    Ok(())
}

pub fn convert(args: &ParseArgs, out: &Path, config: &ParseConfig, json: bool) -> Result<()> {
    let fw = load(args, config)?;
    let blob = fw
        .write()
        .with_context(|| format!("failed to write {} image", fw.format_name()))?;
    write_file(out, &blob)?;
    report_written(&fw, out, blob.len(), json);
    Ok(())
}
