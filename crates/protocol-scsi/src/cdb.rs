//! Command Descriptor Block decoding into transaction requests.
//!
//! Layouts follow SBC-3: READ/WRITE (10) carry a 32-bit LBA at bytes 2..6 and
//! a 16-bit transfer length at bytes 7..9; READ/WRITE (16) carry a 64-bit LBA
//! at bytes 2..10 and a 32-bit transfer length at bytes 10..14. Multi-byte
//! fields are big-endian and the transfer length counts blocks.

use thiserror::Error;
use transact::RequestKind;

use crate::scsi::{opcode, FUA_BIT};

/// Reasons a CDB cannot be turned into a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CdbError {
    #[error("empty CDB")]
    Empty,

    #[error("unsupported operation code {0:#04x}")]
    UnsupportedOpcode(u8),

    #[error("CDB for opcode {opcode:#04x} is {actual} bytes, expected {expected}")]
    Truncated {
        opcode: u8,
        expected: usize,
        actual: usize,
    },
}

/// Decode a CDB into the request it describes.
pub fn decode(cdb: &[u8]) -> Result<RequestKind, CdbError> {
    let &op = cdb.first().ok_or(CdbError::Empty)?;
    match op {
        opcode::READ_10 | opcode::WRITE_10 => {
            let cdb = require(cdb, op, 10)?;
            let block_address = u64::from(u32::from_be_bytes([cdb[2], cdb[3], cdb[4], cdb[5]]));
            let block_count = u32::from(u16::from_be_bytes([cdb[7], cdb[8]]));
            Ok(build(op == opcode::WRITE_10, block_address, block_count, cdb[1]))
        }
        opcode::READ_16 | opcode::WRITE_16 => {
            let cdb = require(cdb, op, 16)?;
            let mut lba = [0u8; 8];
            lba.copy_from_slice(&cdb[2..10]);
            let block_count = u32::from_be_bytes([cdb[10], cdb[11], cdb[12], cdb[13]]);
            Ok(build(
                op == opcode::WRITE_16,
                u64::from_be_bytes(lba),
                block_count,
                cdb[1],
            ))
        }
        other => Err(CdbError::UnsupportedOpcode(other)),
    }
}

fn require(cdb: &[u8], opcode: u8, expected: usize) -> Result<&[u8], CdbError> {
    if cdb.len() < expected {
        return Err(CdbError::Truncated {
            opcode,
            expected,
            actual: cdb.len(),
        });
    }
    Ok(&cdb[..expected])
}

fn build(write: bool, block_address: u64, block_count: u32, flags: u8) -> RequestKind {
    let force_unit_access = flags & FUA_BIT != 0;
    if write {
        RequestKind::Write {
            block_address,
            block_count,
            force_unit_access,
        }
    } else {
        RequestKind::Read {
            block_address,
            block_count,
            force_unit_access,
        }
    }
}

/// READ(16) CDB.
pub fn read16(block_address: u64, block_count: u32, force_unit_access: bool) -> [u8; 16] {
    encode16(opcode::READ_16, block_address, block_count, force_unit_access)
}

/// WRITE(16) CDB.
pub fn write16(block_address: u64, block_count: u32, force_unit_access: bool) -> [u8; 16] {
    encode16(opcode::WRITE_16, block_address, block_count, force_unit_access)
}

fn encode16(op: u8, block_address: u64, block_count: u32, force_unit_access: bool) -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = op;
    if force_unit_access {
        cdb[1] |= FUA_BIT;
    }
    cdb[2..10].copy_from_slice(&block_address.to_be_bytes());
    cdb[10..14].copy_from_slice(&block_count.to_be_bytes());
    cdb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read16_fields_are_verbatim() {
        let mut cdb = [0u8; 16];
        cdb[0] = opcode::READ_16;
        cdb[9] = 7;
        cdb[13] = 5;
        assert_eq!(
            decode(&cdb),
            Ok(RequestKind::Read {
                block_address: 7,
                block_count: 5,
                force_unit_access: false,
            })
        );
    }

    #[test]
    fn write10_with_fua() {
        let cdb = [opcode::WRITE_10, FUA_BIT, 0, 0, 0x01, 0x00, 0, 0x00, 0x08, 0];
        assert_eq!(
            decode(&cdb),
            Ok(RequestKind::Write {
                block_address: 0x100,
                block_count: 8,
                force_unit_access: true,
            })
        );
    }

    #[test]
    fn builders_match_decoder() {
        let kind = decode(&write16(u64::MAX - 1, 3, true)).unwrap();
        assert_eq!(kind.block_address(), u64::MAX - 1);
        assert_eq!(kind.block_count(), 3);
        assert!(kind.force_unit_access());

        let kind = decode(&read16(9, 1, false)).unwrap();
        assert_eq!(kind.kind(), transact::TransactKind::Read);
    }

    #[test]
    fn malformed_cdbs() {
        assert_eq!(decode(&[]), Err(CdbError::Empty));
        assert_eq!(decode(&[0x12, 0, 0, 0, 36, 0]), Err(CdbError::UnsupportedOpcode(0x12)));
        assert_eq!(
            decode(&[opcode::READ_16, 0, 0]),
            Err(CdbError::Truncated {
                opcode: opcode::READ_16,
                expected: 16,
                actual: 3
            })
        );
    }
}
