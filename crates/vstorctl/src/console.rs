//! Line-oriented operator console for `vstorctl serve`.

use anyhow::{anyhow, bail, Context, Result};
use common::{SlotAddress, UnitId};
use protocol_scsi::{cdb, DataDirection, ExecuteOutcome};
use std::io::{BufRead, Write};
use std::str::FromStr;
use storage_port::StoragePort;

const HELP: &str = "\
commands:
  list                         addresses of provisioned units
  units                        unit records as JSON
  read <slot> <lba> <blocks>   read blocks and print them as hex
  write <slot> <lba> <hex>     write bytes, zero-padded to whole blocks
  unprovision <unit-id>        remove a unit
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    Units,
    Read { slot: u8, lba: u64, blocks: u32 },
    Write { slot: u8, lba: u64, data: Vec<u8> },
    Unprovision { id: UnitId },
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["list"] => Ok(Self::List),
            ["units"] => Ok(Self::Units),
            ["help"] | ["?"] => Ok(Self::Help),
            ["quit"] | ["exit"] => Ok(Self::Quit),
            ["read", slot, lba, blocks] => Ok(Self::Read {
                slot: slot.parse().context("slot")?,
                lba: lba.parse().context("lba")?,
                blocks: blocks.parse().context("block count")?,
            }),
            ["write", slot, lba, data] => Ok(Self::Write {
                slot: slot.parse().context("slot")?,
                lba: lba.parse().context("lba")?,
                data: hex::decode(data).context("data must be hex")?,
            }),
            ["unprovision", id] => Ok(Self::Unprovision {
                id: UnitId::from_uuid(id.parse().context("unit id")?),
            }),
            [] => bail!("empty command"),
            [other, ..] => bail!("unknown command '{other}' (try 'help')"),
        }
    }
}

/// Read commands from `input` until `quit` or end of input. Command
/// failures are reported on `out` and do not end the session.
pub fn run<R: BufRead, W: Write>(port: &StoragePort, input: R, out: &mut W) -> Result<()> {
    for line in input.lines() {
        let line = line.context("reading console input")?;
        if line.trim().is_empty() {
            continue;
        }
        let outcome = line
            .parse::<ConsoleCommand>()
            .and_then(|command| dispatch(port, command, out));
        match outcome {
            Ok(false) => break,
            Ok(true) => {}
            Err(err) => writeln!(out, "error: {err:#}")?,
        }
    }
    Ok(())
}

/// Returns `false` once the session should end.
fn dispatch<W: Write>(port: &StoragePort, command: ConsoleCommand, out: &mut W) -> Result<bool> {
    match command {
        ConsoleCommand::List => {
            let addresses = port.list(port.capacity())?;
            if addresses.is_empty() {
                writeln!(out, "(no units)")?;
            }
            for address in addresses {
                let unit = port.unit(address)?;
                writeln!(
                    out,
                    "{address}\t{:#08x}\t{}\t{} x {}",
                    address.as_u32(),
                    unit.id(),
                    unit.block_count(),
                    unit.block_length()
                )?;
            }
        }
        ConsoleCommand::Units => {
            let json = serde_json::to_string_pretty(&port.units())?;
            writeln!(out, "{json}")?;
        }
        ConsoleCommand::Read { slot, lba, blocks } => {
            let address = SlotAddress::new(0, slot, 0);
            let unit = port.unit(address)?;
            let length = usize::try_from(u64::from(blocks) * u64::from(unit.block_length()))?;
            let mut buffer = vec![0u8; length];
            let outcome = port.execute(
                address,
                &cdb::read16(lba, blocks, false),
                DataDirection::In,
                &mut buffer,
            )?;
            check(&outcome)?;
            writeln!(out, "{}", hex::encode(&buffer[..outcome.data_length]))?;
        }
        ConsoleCommand::Write { slot, lba, mut data } => {
            let address = SlotAddress::new(0, slot, 0);
            let unit = port.unit(address)?;
            let block_length = usize::try_from(unit.block_length())?;
            let blocks = data.len().div_ceil(block_length).max(1);
            data.resize(blocks * block_length, 0);
            let outcome = port.execute(
                address,
                &cdb::write16(lba, u32::try_from(blocks)?, false),
                DataDirection::Out,
                &mut data,
            )?;
            check(&outcome)?;
            writeln!(out, "wrote {} bytes at lba {lba}", outcome.data_length)?;
        }
        ConsoleCommand::Unprovision { id } => {
            port.unprovision(id)?;
            writeln!(out, "unprovisioned {id}")?;
        }
        ConsoleCommand::Help => writeln!(out, "{HELP}")?,
        ConsoleCommand::Quit => return Ok(false),
    }
    Ok(true)
}

fn check(outcome: &ExecuteOutcome) -> Result<()> {
    if outcome.is_good() {
        return Ok(());
    }
    Err(anyhow!(
        "CHECK CONDITION: sense key {:#x}, asc {:#04x}, ascq {:#04x}",
        outcome.sense.sense_key,
        outcome.sense.additional_sense_code,
        outcome.sense.additional_sense_code_qualifier
    ))
}
