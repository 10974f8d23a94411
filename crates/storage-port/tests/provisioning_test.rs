use common::{PortError, SlotAddress, UnitId, UnitParams};
use storage_port::{PortConfig, StoragePort};
use tracing_test::traced_test;
use uuid::Uuid;

fn port() -> StoragePort {
    StoragePort::new(PortConfig::default()).unwrap()
}

fn unit(n: u128) -> UnitParams {
    UnitParams::new(UnitId::from_uuid(Uuid::from_u128(0xfeed_0000 + n)), 16, 512, 512)
}

#[test]
#[traced_test]
fn provision_unprovision_reuses_slot_zero() {
    let port = port();
    for _ in 0..3 {
        let address = port.provision(unit(0)).unwrap();
        assert_eq!(address, SlotAddress(0));
        port.unprovision(unit(0).unique_id).unwrap();
    }
    assert!(port.list(16).unwrap().is_empty());
    assert!(logs_contain("unit provisioned"));
    assert!(logs_contain("unit unprovisioned"));
}

#[test]
fn invalid_geometry_is_rejected() {
    let port = port();
    let id = UnitId::from_uuid(Uuid::from_u128(7));
    let bad = [
        UnitParams::new(id, 0, 512, 512),
        UnitParams::new(id, 16, 0, 512),
        UnitParams::new(id, 16, 512, 0),
        UnitParams::new(id, 16, 512, 513),
        UnitParams::new(UnitId::from_uuid(Uuid::nil()), 16, 512, 512),
    ];
    for params in bad {
        assert!(
            matches!(port.provision(params.clone()), Err(PortError::InvalidArgument { .. })),
            "{params:?} should be rejected"
        );
    }
    assert!(port.units().is_empty());
}

#[test]
fn duplicate_id_is_rejected() {
    let port = port();
    port.provision(unit(1)).unwrap();
    assert_eq!(
        port.provision(unit(1)),
        Err(PortError::AlreadyExists {
            id: unit(1).unique_id
        })
    );
    assert_eq!(port.list(16).unwrap().len(), 1);
}

#[test]
fn unknown_id_is_not_found() {
    let port = port();
    assert!(matches!(
        port.unprovision(unit(99).unique_id),
        Err(PortError::NotFound { .. })
    ));
}

#[test]
fn fill_to_capacity_then_drain() {
    let port = port();
    for n in 0..16 {
        let address = port.provision(unit(n)).unwrap();
        assert_eq!(address, SlotAddress::new(0, n as u8, 0));
    }
    assert_eq!(
        port.provision(unit(16)),
        Err(PortError::CapacityExceeded { capacity: 16 })
    );

    let listed = port.list(16).unwrap();
    assert_eq!(listed.len(), 16);
    assert!(listed.windows(2).all(|pair| pair[0] < pair[1]));

    for n in 0..16 {
        port.unprovision(unit(n).unique_id).unwrap();
    }
    assert!(port.list(16).unwrap().is_empty());
}

#[test]
fn list_reports_required_size() {
    let port = port();
    port.provision(unit(0)).unwrap();
    port.provision(unit(1)).unwrap();

    assert_eq!(
        port.list(1),
        Err(PortError::BufferTooSmall {
            required: 2,
            available: 1
        })
    );

    let mut out = [SlotAddress(u32::MAX); 4];
    assert_eq!(port.list_into(&mut out).unwrap(), 2);
    assert_eq!(&out[..2], &[SlotAddress(0), SlotAddress(0x100)]);
}

#[test]
fn lowest_free_slot_is_reused() {
    let port = port();
    for n in 0..3 {
        port.provision(unit(n)).unwrap();
    }
    port.unprovision(unit(1).unique_id).unwrap();
    assert_eq!(port.provision(unit(5)).unwrap(), SlotAddress::new(0, 1, 0));
    assert_eq!(port.unit(SlotAddress(0x100)).unwrap().id(), unit(5).unique_id);
}

#[test]
fn second_unprovision_leaves_others_alone() {
    let port = port();
    port.provision(unit(0)).unwrap();
    port.provision(unit(1)).unwrap();

    port.unprovision(unit(0).unique_id).unwrap();
    assert!(matches!(
        port.unprovision(unit(0).unique_id),
        Err(PortError::NotFound { .. })
    ));
    assert_eq!(port.list(16).unwrap(), vec![SlotAddress(0x100)]);
}
