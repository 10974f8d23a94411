use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::{SlotAddress, UnitId, UnitParams};
use protocol_scsi::{cdb, DataDirection};
use sim_ramdisk::{spawn_handlers, RamDisk, RamDiskConfig};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use storage_port::{PortConfig, StoragePort};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod console;
mod manifest;

use manifest::Manifest;

const SELFTEST_TRANSFER_BLOCKS: u32 = 8;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let format = std::env::var("VSTOR_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

        // stdout belongs to the console.
        if format.eq_ignore_ascii_case("json") {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter.clone())
                .with_target(true)
                .with_writer(io::stderr)
                .json()
                .flatten_event(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_writer(io::stderr)
                .compact()
                .init();
        }
    });
}

#[derive(Parser)]
#[command(name = "vstorctl")]
#[command(about = "Virtual storage port control utility", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a RAM disk, write a pattern, read it back and tear down
    Selftest {
        #[arg(long, default_value_t = 64)]
        blocks: u64,
        #[arg(long, default_value_t = 512)]
        block_length: u32,
    },
    /// Provision units from a YAML manifest and serve them from RAM
    Serve {
        #[arg(short, long)]
        manifest: PathBuf,
        /// Handler threads per unit
        #[arg(long)]
        handler_threads: Option<usize>,
    },
    /// Convert between bus/slot/lun triples and packed addresses
    Btl {
        #[command(subcommand)]
        command: BtlCommands,
    },
}

#[derive(Subcommand)]
enum BtlCommands {
    /// Pack a triple into an address
    Encode { bus: u8, slot: u8, lun: u8 },
    /// Unpack an address (decimal or 0x-prefixed hex)
    Decode { value: String },
}

fn run_selftest(blocks: u64, block_length: u32) -> Result<()> {
    let port = StoragePort::new(PortConfig::from_env()?)?;
    let transfer_blocks = u32::try_from(blocks.min(u64::from(SELFTEST_TRANSFER_BLOCKS)))?;
    let params = UnitParams::new(
        UnitId::new(),
        blocks,
        block_length,
        block_length.saturating_mul(transfer_blocks),
    );
    let id = params.unique_id;
    let disk = Arc::new(RamDisk::for_unit(&params)?);
    let address = port.provision(params)?;
    let handlers = spawn_handlers(&port, address, disk, &RamDiskConfig::default())?;
    info!(%id, %address, blocks, block_length, "selftest unit ready");

    let length = usize::try_from(u64::from(transfer_blocks) * u64::from(block_length))?;
    let mut pattern: Vec<u8> = (0..length).map(|i| (i % 253) as u8).collect();
    let lba = blocks - u64::from(transfer_blocks);

    let written = port.execute(
        address,
        &cdb::write16(lba, transfer_blocks, true),
        DataDirection::Out,
        &mut pattern,
    )?;
    let mut readback = vec![0u8; length];
    let read = port.execute(
        address,
        &cdb::read16(lba, transfer_blocks, false),
        DataDirection::In,
        &mut readback,
    )?;

    port.unprovision(id)?;
    for handle in handlers {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("RAM disk handler panicked"))??;
    }

    if !written.is_good() || !read.is_good() {
        bail!("selftest command failed: write {written:?}, read {read:?}");
    }
    if readback != pattern {
        bail!("selftest readback does not match the written pattern");
    }
    println!("selftest passed: {length} bytes at lba {lba} on {address}");
    Ok(())
}

fn run_serve(manifest_path: PathBuf, handler_threads: Option<usize>) -> Result<()> {
    let manifest = Manifest::load(&manifest_path)?;
    let mut config = PortConfig::from_env()?;
    if let Some(capacity) = manifest.capacity {
        config.capacity = capacity;
    }
    let port = StoragePort::new(config)?;

    let mut ramdisk_config = RamDiskConfig::default();
    if let Some(threads) = handler_threads {
        ramdisk_config.handler_threads = threads;
    }

    let mut handlers = Vec::new();
    for params in manifest.units {
        let disk = Arc::new(RamDisk::for_unit(&params)?);
        let id = params.unique_id;
        let address = port
            .provision(params)
            .with_context(|| format!("provisioning unit {id}"))?;
        println!("{id} -> {address} ({:#08x})", address.as_u32());
        handlers.extend(spawn_handlers(&port, address, disk, &ramdisk_config)?);
    }

    console::run(&port, io::stdin().lock(), &mut io::stdout().lock())?;

    let removed = port.shutdown();
    let mut served = 0;
    for handle in handlers {
        served += handle
            .join()
            .map_err(|_| anyhow::anyhow!("RAM disk handler panicked"))??;
    }
    info!(removed, served, "storage port stopped");
    Ok(())
}

fn parse_address(value: &str) -> Result<SlotAddress> {
    let raw = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    }
    .with_context(|| format!("invalid address '{value}'"))?;
    Ok(SlotAddress(raw))
}

fn run_btl_command(command: BtlCommands) -> Result<()> {
    match command {
        BtlCommands::Encode { bus, slot, lun } => {
            let address = SlotAddress::new(bus, slot, lun);
            println!("{:#08x}", address.as_u32());
        }
        BtlCommands::Decode { value } => {
            let address = parse_address(&value)?;
            println!(
                "bus {} slot {} lun {}{}",
                address.bus(),
                address.slot(),
                address.lun(),
                if address.is_local() { "" } else { " (not served by this port)" }
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Selftest {
            blocks,
            block_length,
        } => run_selftest(blocks, block_length)?,
        Commands::Serve {
            manifest,
            handler_threads,
        } => run_serve(manifest, handler_threads)?,
        Commands::Btl { command } => run_btl_command(command)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn parses_hex_and_decimal_addresses() {
        assert_eq!(parse_address("0x100").unwrap(), SlotAddress::new(0, 1, 0));
        assert_eq!(parse_address("512").unwrap(), SlotAddress::new(0, 2, 0));
        assert!(parse_address("0xzz").is_err());
    }

    #[test]
    #[traced_test]
    fn selftest_round_trips() {
        run_selftest(16, 512).unwrap();
        assert!(logs_contain("selftest unit ready"));
    }

    #[test]
    fn selftest_small_disk() {
        run_selftest(3, 4096).unwrap();
    }
}
