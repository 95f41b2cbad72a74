//! fwupd-tool - Firmware container and transfer layout CLI
//!
//! Parses, exports, builds and converts firmware containers, and prints the
//! chunk layout used when streaming an image to a device.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod config;
mod error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{ParseArgs, parse_number, parse_size};
use crate::config::ToolConfig;

#[derive(Parser, Debug)]
#[command(name = "fwupd-tool")]
#[command(about = "Parse, build and chunk firmware images")]
#[command(version)]
#[command(long_about = "
fwupd-tool exercises the firmware container parsers and the transfer layout
used by device plugins. Images can be parsed into a tree, exported to XML,
rebuilt from XML and re-serialized.

Use --json for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// JSON file with parse limits and session settings
    #[arg(long, global = true, env = "FWUPD_TOOL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse an image and print its image tree
    FirmwareParse(ParseArgs),

    /// Parse an image and print its XML export
    FirmwareExport(ParseArgs),

    /// Build an image from an XML description
    FirmwareBuild {
        /// XML builder file
        builder: PathBuf,
        /// Output image
        output: PathBuf,
    },

    /// Parse an image and write it back out
    FirmwareConvert {
        #[command(flatten)]
        args: ParseArgs,
        /// Output image
        output: PathBuf,
    },

    /// Print the chunk layout of a file
    Chunks {
        /// File to split
        file: PathBuf,
        /// Largest payload of one chunk
        #[arg(long, value_parser = parse_size)]
        packet_size: usize,
        /// Page size, or 0 for none
        #[arg(long, default_value = "0", value_parser = parse_number)]
        page_size: u64,
        /// Device address of the first byte
        #[arg(long, default_value = "0", value_parser = parse_number)]
        address: u64,
    },

    /// Print the CRC of a file
    Crc {
        /// File to checksum
        file: PathBuf,
        /// Algorithm, e.g. b32-standard or b16-xmodem
        #[arg(short, long, default_value = "b32-standard")]
        kind: String,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_e| {
                format!("fwupd_tool={log_level},fwupd_firmware={log_level},fwupd_stream={log_level}")
                    .into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match execute_command(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }
            ExitCode::from(error::exit_code(&e))
        }
    }
}

fn execute_command(cli: &Cli) -> Result<()> {
    let config = ToolConfig::load(cli.config.as_deref())?;
    match &cli.command {
        Commands::FirmwareParse(args) => commands::firmware::parse(args, &config.parse, cli.json),
        Commands::FirmwareExport(args) => commands::firmware::export(args, &config.parse, cli.json),
        Commands::FirmwareBuild { builder, output } => {
            commands::firmware::build(builder, output, cli.json)
        }
        Commands::FirmwareConvert { args, output } => {
            commands::firmware::convert(args, output, &config.parse, cli.json)
        }
        Commands::Chunks {
            file,
            packet_size,
            page_size,
            address,
        } => commands::chunks::chunks(file, *packet_size, *page_size, *address, cli.json),
        Commands::Crc { file, kind } => commands::chunks::checksum(file, kind, cli.json),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_firmware_parse_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["fwupd-tool", "firmware-parse", "image.bin"])?;
        assert!(!cli.json);
        assert_eq!(cli.verbose, 0);
        let Commands::FirmwareParse(args) = cli.command else {
            return Err("expected firmware-parse".into());
        };
        assert_eq!(args.file, PathBuf::from("image.bin"));
        assert_eq!(args.format, None);
        assert_eq!(args.offset, 0);
        assert_eq!(args.flags(), fwupd_firmware::ParseFlags::NONE);
        Ok(())
    }

    #[test]
    fn parse_flags_and_hex_offset() -> TestResult {
        let cli = Cli::try_parse_from([
            "fwupd-tool",
            "-vv",
            "--json",
            "firmware-export",
            "bios.bin",
            "--format",
            "efi-volume",
            "--offset",
            "0x1000",
            "--ignore-checksum",
            "--no-search",
        ])?;
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        let Commands::FirmwareExport(args) = cli.command else {
            return Err("expected firmware-export".into());
        };
        assert_eq!(args.format.as_deref(), Some("efi-volume"));
        assert_eq!(args.offset, 0x1000);
        let flags = args.flags();
        assert!(flags.contains(fwupd_firmware::ParseFlags::IGNORE_CHECKSUM));
        assert!(flags.contains(fwupd_firmware::ParseFlags::NO_SEARCH));
        Ok(())
    }

    #[test]
    fn parse_convert_takes_output() -> TestResult {
        let cli = Cli::try_parse_from(["fwupd-tool", "firmware-convert", "in.bin", "out.bin"])?;
        let Commands::FirmwareConvert { args, output } = cli.command else {
            return Err("expected firmware-convert".into());
        };
        assert_eq!(args.file, PathBuf::from("in.bin"));
        assert_eq!(output, PathBuf::from("out.bin"));
        Ok(())
    }

    #[test]
    fn parse_chunks_geometry() -> TestResult {
        let cli = Cli::try_parse_from([
            "fwupd-tool",
            "chunks",
            "blob.bin",
            "--packet-size",
            "0x40",
            "--address",
            "100",
        ])?;
        let Commands::Chunks {
            packet_size,
            page_size,
            address,
            ..
        } = cli.command
        else {
            return Err("expected chunks".into());
        };
        assert_eq!(packet_size, 0x40);
        assert_eq!(page_size, 0);
        assert_eq!(address, 100);
        Ok(())
    }

    #[test]
    fn chunks_requires_packet_size() {
        assert!(Cli::try_parse_from(["fwupd-tool", "chunks", "blob.bin"]).is_err());
    }

    #[test]
    fn invalid_offset_rejected() {
        let result = Cli::try_parse_from(["fwupd-tool", "firmware-parse", "x.bin", "--offset", "0xZZ"]);
        assert!(result.is_err());
    }

    #[test]
    fn crc_defaults_to_standard() -> TestResult {
        let cli = Cli::try_parse_from(["fwupd-tool", "crc", "blob.bin"])?;
        let Commands::Crc { kind, .. } = cli.command else {
            return Err("expected crc".into());
        };
        assert_eq!(kind, "b32-standard");
        Ok(())
    }
}
