use common::{PortResult, UnitRecord};
use tracing::debug;
use transact::{DataBuffer, RequestKind, TransactChannel};

use crate::cdb::{self, CdbError};
use crate::scsi::{asc, ascq, sense_key};
use crate::sense::{ExecuteOutcome, SenseData};

/// Direction of the data phase, from the initiator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    None,
    /// Device to caller (reads).
    In,
    /// Caller to device (writes).
    Out,
}

/// Run one command synchronously: decode `cdb`, queue the request on
/// `channel`, block for the handler's response and map it back to SCSI
/// status and sense data.
///
/// Commands the unit cannot accept are failed with CHECK CONDITION before
/// anything is queued. Channel failures (`Cancelled`, protocol errors) are
/// returned as errors.
pub fn submit_and_wait(
    channel: &TransactChannel,
    unit: &UnitRecord,
    cdb: &[u8],
    direction: DataDirection,
    buffer: &mut [u8],
) -> PortResult<ExecuteOutcome> {
    let kind = match cdb::decode(cdb) {
        Ok(kind) => kind,
        Err(err) => {
            debug!(slot = unit.slot, error = %err, "rejecting CDB");
            return Ok(match err {
                CdbError::Truncated { .. } => illegal_request(asc::INVALID_FIELD_IN_CDB),
                CdbError::Empty | CdbError::UnsupportedOpcode(_) => {
                    illegal_request(asc::INVALID_COMMAND_OPERATION_CODE)
                }
            });
        }
    };

    let transfer_length = match check_request(unit, &kind, direction, buffer.len()) {
        Ok(length) => length,
        Err(outcome) => return Ok(outcome),
    };
    if kind.block_count() == 0 {
        return Ok(ExecuteOutcome::good(0));
    }

    let data = DataBuffer::with_len(transfer_length);
    if let RequestKind::Write { .. } = kind {
        data.copy_from(&buffer[..transfer_length]);
    }

    let hint = channel.enqueue_request(kind, data.clone())?;
    let response = channel.wait_for_response(hint)?;

    if !response.status.is_good() {
        debug!(
            slot = unit.slot,
            %hint,
            scsi_status = response.status.scsi_status,
            sense_key = response.status.sense_key,
            "command completed with error status"
        );
        return Ok(ExecuteOutcome {
            scsi_status: response.status.scsi_status,
            sense: SenseData::from_status(&response.status),
            data_length: 0,
        });
    }

    if let RequestKind::Read { .. } = kind {
        data.copy_to(&mut buffer[..transfer_length]);
    }
    Ok(ExecuteOutcome::good(transfer_length))
}

/// Validate a decoded request against the unit; returns the transfer length
/// in bytes or the CHECK CONDITION to report.
fn check_request(
    unit: &UnitRecord,
    kind: &RequestKind,
    direction: DataDirection,
    buffer_len: usize,
) -> Result<usize, ExecuteOutcome> {
    let in_range = kind
        .block_address()
        .checked_add(u64::from(kind.block_count()))
        .is_some_and(|end| end <= unit.block_count());
    if !in_range {
        return Err(illegal_request(asc::LBA_OUT_OF_RANGE));
    }
    if kind.block_count() == 0 {
        return Ok(0);
    }

    let transfer_length = u64::from(kind.block_count()) * u64::from(unit.block_length());
    if transfer_length > u64::from(unit.max_transfer_length()) {
        return Err(illegal_request(asc::INVALID_FIELD_IN_CDB));
    }
    // Bounded by max_transfer_length, so it fits in usize.
    let transfer_length = transfer_length as usize;
    if transfer_length > buffer_len {
        return Err(illegal_request(asc::INVALID_FIELD_IN_CDB));
    }

    match kind {
        RequestKind::Read { .. } if direction != DataDirection::In => {
            Err(illegal_request(asc::INVALID_FIELD_IN_CDB))
        }
        RequestKind::Write { .. } if direction != DataDirection::Out => {
            Err(illegal_request(asc::INVALID_FIELD_IN_CDB))
        }
        RequestKind::Write { .. } if unit.write_protected() => Err(ExecuteOutcome::check_condition(
            sense_key::DATA_PROTECT,
            asc::WRITE_PROTECTED,
            ascq::NONE,
        )),
        _ => Ok(transfer_length),
    }
}

fn illegal_request(additional_sense_code: u8) -> ExecuteOutcome {
    ExecuteOutcome::check_condition(sense_key::ILLEGAL_REQUEST, additional_sense_code, ascq::NONE)
}
