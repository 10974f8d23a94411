#![no_main]

use libfuzzer_sys::fuzz_target;
use protocol_scsi::{cdb, SenseData, FIXED_SENSE_LEN};

fuzz_target!(|data: &[u8]| {
    if let Ok(kind) = cdb::decode(data) {
        // A decoded 16-byte command must survive re-encoding.
        if data.len() >= 16 && (data[0] == 0x88 || data[0] == 0x8a) {
            let rebuilt = if data[0] == 0x88 {
                cdb::read16(kind.block_address(), kind.block_count(), kind.force_unit_access())
            } else {
                cdb::write16(kind.block_address(), kind.block_count(), kind.force_unit_access())
            };
            assert_eq!(cdb::decode(&rebuilt), Ok(kind));
        }
    }

    if let Some(sense) = SenseData::from_fixed_bytes(data) {
        let bytes = sense.to_fixed_bytes();
        assert_eq!(bytes.len(), FIXED_SENSE_LEN);
        let reparsed = SenseData::from_fixed_bytes(&bytes);
        assert_eq!(reparsed.map(|s| s.sense_key), Some(sense.sense_key));
    }
});
