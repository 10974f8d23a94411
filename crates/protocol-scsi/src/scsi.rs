//! SCSI status, sense and opcode values used by the translator (SPC-4, SBC-3).

pub mod status {
    pub const GOOD: u8 = 0x00;
    pub const CHECK_CONDITION: u8 = 0x02;
    pub const BUSY: u8 = 0x08;
}

pub mod sense_key {
    pub const NO_SENSE: u8 = 0x00;
    pub const NOT_READY: u8 = 0x02;
    pub const MEDIUM_ERROR: u8 = 0x03;
    pub const HARDWARE_ERROR: u8 = 0x04;
    pub const ILLEGAL_REQUEST: u8 = 0x05;
    pub const UNIT_ATTENTION: u8 = 0x06;
    pub const DATA_PROTECT: u8 = 0x07;
    pub const ABORTED_COMMAND: u8 = 0x0b;
}

/// Additional sense codes.
pub mod asc {
    pub const NO_ADDITIONAL_SENSE: u8 = 0x00;
    pub const WRITE_ERROR: u8 = 0x0c;
    pub const UNRECOVERED_READ_ERROR: u8 = 0x11;
    pub const SEEK_ERROR: u8 = 0x15;
    pub const INVALID_COMMAND_OPERATION_CODE: u8 = 0x20;
    pub const LBA_OUT_OF_RANGE: u8 = 0x21;
    pub const INVALID_FIELD_IN_CDB: u8 = 0x24;
    pub const WRITE_PROTECTED: u8 = 0x27;
}

/// Additional sense code qualifiers.
pub mod ascq {
    pub const NONE: u8 = 0x00;
    pub const POSITIONING_ERROR_DETECTED_BY_READ_OF_MEDIUM: u8 = 0x02;
}

pub mod opcode {
    pub const READ_10: u8 = 0x28;
    pub const WRITE_10: u8 = 0x2a;
    pub const READ_16: u8 = 0x88;
    pub const WRITE_16: u8 = 0x8a;
}

/// FUA bit in byte 1 of READ/WRITE (10) and (16).
pub const FUA_BIT: u8 = 0x08;
