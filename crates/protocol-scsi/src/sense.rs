use transact::TransactStatus;

use crate::scsi::{asc, ascq, sense_key, status};

/// Length of fixed-format sense data produced by [`SenseData::to_fixed_bytes`].
pub const FIXED_SENSE_LEN: usize = 18;

const RESPONSE_CODE_CURRENT_FIXED: u8 = 0x70;
const VALID_BIT: u8 = 0x80;
const ADDITIONAL_LENGTH: u8 = (FIXED_SENSE_LEN - 8) as u8;

/// Decoded sense information accompanying a CHECK CONDITION.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SenseData {
    pub sense_key: u8,
    pub additional_sense_code: u8,
    pub additional_sense_code_qualifier: u8,
    /// Only meaningful when `information_valid` is set.
    pub information: u64,
    pub information_valid: bool,
}

impl SenseData {
    pub fn new(sense_key: u8, additional_sense_code: u8, additional_sense_code_qualifier: u8) -> Self {
        Self {
            sense_key,
            additional_sense_code,
            additional_sense_code_qualifier,
            information: 0,
            information_valid: false,
        }
    }

    pub fn none() -> Self {
        Self::new(sense_key::NO_SENSE, asc::NO_ADDITIONAL_SENSE, ascq::NONE)
    }

    pub fn from_status(status: &TransactStatus) -> Self {
        Self {
            sense_key: status.sense_key,
            additional_sense_code: status.asc,
            additional_sense_code_qualifier: status.ascq,
            information: status.information,
            information_valid: status.information_valid,
        }
    }

    /// Fixed-format sense (response code 0x70). The INFORMATION field is four
    /// bytes wide; larger values are sent with VALID cleared.
    pub fn to_fixed_bytes(&self) -> [u8; FIXED_SENSE_LEN] {
        let mut bytes = [0u8; FIXED_SENSE_LEN];
        bytes[0] = RESPONSE_CODE_CURRENT_FIXED;
        bytes[2] = self.sense_key & 0x0f;
        if self.information_valid {
            if let Ok(information) = u32::try_from(self.information) {
                bytes[0] |= VALID_BIT;
                bytes[3..7].copy_from_slice(&information.to_be_bytes());
            }
        }
        bytes[7] = ADDITIONAL_LENGTH;
        bytes[12] = self.additional_sense_code;
        bytes[13] = self.additional_sense_code_qualifier;
        bytes
    }

    /// Parse fixed-format sense data; `None` for other formats or short input.
    pub fn from_fixed_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 14 || bytes[0] & 0x7f != RESPONSE_CODE_CURRENT_FIXED {
            return None;
        }
        Some(Self {
            sense_key: bytes[2] & 0x0f,
            additional_sense_code: bytes[12],
            additional_sense_code_qualifier: bytes[13],
            information: u64::from(u32::from_be_bytes([bytes[3], bytes[4], bytes[5], bytes[6]])),
            information_valid: bytes[0] & VALID_BIT != 0,
        })
    }
}

/// Result of executing one command against a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOutcome {
    pub scsi_status: u8,
    pub sense: SenseData,
    /// Bytes actually transferred to or from the caller's buffer.
    pub data_length: usize,
}

impl ExecuteOutcome {
    pub fn good(data_length: usize) -> Self {
        Self {
            scsi_status: status::GOOD,
            sense: SenseData::none(),
            data_length,
        }
    }

    pub fn check_condition(sense_key: u8, additional_sense_code: u8, qualifier: u8) -> Self {
        Self {
            scsi_status: status::CHECK_CONDITION,
            sense: SenseData::new(sense_key, additional_sense_code, qualifier),
            data_length: 0,
        }
    }

    pub fn is_good(&self) -> bool {
        self.scsi_status == status::GOOD
    }
}
