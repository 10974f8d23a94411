//! SCSI front end for transaction channels.
//!
//! A command issuer hands a CDB and a data buffer to [`submit_and_wait`];
//! the CDB is decoded into a [`transact::RequestKind`], queued on the unit's
//! channel, and the handler's status is mapped back into a SCSI status byte
//! plus [`SenseData`]. Only READ and WRITE (10/16) are decoded; other opcodes
//! are failed with ILLEGAL REQUEST.

pub mod cdb;
pub mod scsi;
pub mod sense;
pub mod translator;

pub use cdb::CdbError;
pub use sense::{ExecuteOutcome, SenseData, FIXED_SENSE_LEN};
pub use translator::{submit_and_wait, DataDirection};
