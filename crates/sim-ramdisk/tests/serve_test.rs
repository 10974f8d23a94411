use common::{UnitId, UnitParams};
use protocol_scsi::{cdb, scsi, DataDirection};
use sim_ramdisk::{serve, spawn_handlers, RamDisk, RamDiskConfig};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use storage_port::{PortConfig, StoragePort};
use tracing_test::traced_test;
use uuid::Uuid;

fn params(n: u128) -> UnitParams {
    UnitParams::new(UnitId::from_uuid(Uuid::from_u128(0xd15c_0000 + n)), 64, 512, 8 * 512)
}

#[test]
#[traced_test]
fn pattern_round_trips_through_handlers() {
    let port = StoragePort::new(PortConfig::default()).unwrap();
    let params = params(0);
    let disk = Arc::new(RamDisk::for_unit(&params).unwrap());
    let address = port.provision(params.clone()).unwrap();

    let config = RamDiskConfig {
        handler_threads: 2,
        poll_interval: Duration::from_millis(20),
    };
    let handlers = spawn_handlers(&port, address, Arc::clone(&disk), &config).unwrap();

    let mut pattern: Vec<u8> = (0..4 * 512).map(|i| (i * 7 % 256) as u8).collect();
    let outcome = port
        .execute(address, &cdb::write16(10, 4, true), DataDirection::Out, &mut pattern)
        .unwrap();
    assert!(outcome.is_good());
    assert_eq!(outcome.data_length, 4 * 512);

    let mut readback = vec![0u8; 4 * 512];
    let outcome = port
        .execute(address, &cdb::read16(10, 4, false), DataDirection::In, &mut readback)
        .unwrap();
    assert!(outcome.is_good());
    assert_eq!(readback, pattern);

    port.unprovision(params.unique_id).unwrap();
    let served: u64 = handlers
        .into_iter()
        .map(|handle| handle.join().unwrap().unwrap())
        .sum();
    assert_eq!(served, 2);
    assert_eq!(disk.stats().reads, 1);
    assert_eq!(disk.stats().writes, 1);
    assert!(logs_contain("handler exiting"));
}

#[test]
fn handler_range_check_reaches_issuer() {
    let port = StoragePort::new(PortConfig::default()).unwrap();
    let params = params(1);
    // Smaller than the unit, so the port's own range check passes and the
    // handler has to reject the request.
    let disk = Arc::new(RamDisk::new(8, 512).unwrap());
    let address = port.provision(params.clone()).unwrap();

    let handler = {
        let handle = port.attach(address).unwrap();
        let disk = Arc::clone(&disk);
        thread::spawn(move || serve(&handle, &disk, Duration::from_millis(20)))
    };

    let mut buffer = vec![0u8; 512];
    let outcome = port
        .execute(address, &cdb::read16(32, 1, false), DataDirection::In, &mut buffer)
        .unwrap();
    assert_eq!(outcome.scsi_status, scsi::status::CHECK_CONDITION);
    assert_eq!(outcome.sense.sense_key, scsi::sense_key::ILLEGAL_REQUEST);
    assert_eq!(outcome.sense.additional_sense_code, scsi::asc::LBA_OUT_OF_RANGE);
    assert_eq!(outcome.sense.information, 32);

    port.shutdown();
    assert_eq!(handler.join().unwrap().unwrap(), 1);
}

#[test]
fn handlers_stop_when_slot_is_reused() {
    let port = StoragePort::new(PortConfig::default()).unwrap();
    let first = params(2);
    let disk = Arc::new(RamDisk::for_unit(&first).unwrap());
    let address = port.provision(first.clone()).unwrap();
    let config = RamDiskConfig {
        handler_threads: 2,
        poll_interval: Duration::from_millis(5),
    };
    let handlers = spawn_handlers(&port, address, disk, &config).unwrap();

    port.unprovision(first.unique_id).unwrap();
    assert_eq!(port.provision(params(3)).unwrap(), address);
    for handle in handlers {
        assert_eq!(handle.join().unwrap().unwrap(), 0);
    }

    // The new unit's request is still waiting for its own handler.
    let issuer = {
        let port = port.clone();
        thread::spawn(move || {
            let mut buffer = vec![0u8; 512];
            port.execute(address, &cdb::read16(0, 1, false), DataDirection::In, &mut buffer)
        })
    };
    let request = port
        .transact(address, None, Some(Duration::from_secs(5)))
        .unwrap()
        .expect("request for the new unit");
    port.respond(address, request.respond(transact::TransactStatus::good()))
        .unwrap();
    assert!(issuer.join().unwrap().unwrap().is_good());
}

#[test]
fn dropping_the_port_stops_handlers() {
    let port = StoragePort::new(PortConfig::default()).unwrap();
    let unit = params(4);
    let disk = Arc::new(RamDisk::for_unit(&unit).unwrap());
    let address = port.provision(unit).unwrap();
    let config = RamDiskConfig {
        handler_threads: 1,
        poll_interval: Duration::from_millis(5),
    };
    let handlers = spawn_handlers(&port, address, disk, &config).unwrap();

    drop(port);
    for handle in handlers {
        assert_eq!(handle.join().unwrap().unwrap(), 0);
    }
}
