//! Fixed-capacity table of provisioned units.
//!
//! Slots are handed out lowest-free-first so addressing is reproducible: a
//! lone unit that is provisioned, removed and provisioned again always lands
//! back on slot 0. Each occupied slot owns a fresh [`TransactChannel`]; the
//! channel is closed before its slot becomes free again, so a reused slot
//! never inherits stale waiters.

use common::{PortError, PortResult, SlotAddress, UnitId, UnitParams, UnitRecord, MAX_CAPACITY};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};
use transact::TransactChannel;

struct SlotEntry {
    record: UnitRecord,
    channel: Arc<TransactChannel>,
}

pub struct SlotCatalog {
    capacity: usize,
    table: RwLock<Vec<Option<SlotEntry>>>,
}

impl SlotCatalog {
    /// Create an empty catalog with `capacity` slots (1..=256).
    pub fn new(capacity: usize) -> PortResult<Self> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(PortError::invalid_argument(format!(
                "catalog capacity must be within 1..={MAX_CAPACITY}, got {capacity}"
            )));
        }
        let mut table = Vec::with_capacity(capacity);
        table.resize_with(capacity, || None);
        Ok(Self {
            capacity,
            table: RwLock::new(table),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.table.read().iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a unit in the lowest free slot.
    pub fn provision(&self, params: UnitParams) -> PortResult<UnitRecord> {
        if let Err(err) = params.validate() {
            warn!(unit_id = %params.unique_id, error = %err, "rejecting provision");
            return Err(err);
        }

        let mut table = self.table.write();
        if table
            .iter()
            .flatten()
            .any(|entry| entry.record.id() == params.unique_id)
        {
            warn!(unit_id = %params.unique_id, "unit already provisioned");
            return Err(PortError::AlreadyExists {
                id: params.unique_id,
            });
        }

        let slot = table
            .iter()
            .position(Option::is_none)
            .ok_or(PortError::CapacityExceeded {
                capacity: self.capacity,
            })?;
        let address = SlotAddress::from_slot(slot).ok_or_else(|| {
            PortError::invalid_argument(format!("slot {slot} does not fit a slot address"))
        })?;

        let record = UnitRecord {
            params,
            slot,
            address,
        };
        table[slot] = Some(SlotEntry {
            record: record.clone(),
            channel: Arc::new(TransactChannel::new(slot)),
        });
        drop(table);

        info!(
            unit_id = %record.id(),
            slot,
            block_count = record.block_count(),
            block_length = record.block_length(),
            "unit provisioned"
        );
        Ok(record)
    }

    /// Remove a unit, cancelling its channel before the slot is released.
    pub fn unprovision(&self, id: UnitId) -> PortResult<UnitRecord> {
        let mut table = self.table.write();
        let slot = table
            .iter()
            .position(|entry| matches!(entry, Some(entry) if entry.record.id() == id))
            .ok_or_else(|| PortError::not_found(format!("unit {id}")))?;

        let entry = table[slot]
            .take()
            .ok_or_else(|| PortError::not_found(format!("unit {id}")))?;
        entry.channel.close();
        drop(table);

        info!(unit_id = %id, slot, "unit unprovisioned");
        Ok(entry.record)
    }

    /// Addresses of occupied slots in ascending order.
    ///
    /// Fails with `BufferTooSmall` when more than `capacity` slots are
    /// occupied.
    pub fn list(&self, capacity: usize) -> PortResult<Vec<SlotAddress>> {
        let addresses = self.addresses();
        if addresses.len() > capacity {
            return Err(PortError::BufferTooSmall {
                required: addresses.len(),
                available: capacity,
            });
        }
        Ok(addresses)
    }

    /// Buffer form of [`list`](Self::list): fills `out` and returns the count.
    /// Nothing is written when `out` is too short.
    pub fn list_into(&self, out: &mut [SlotAddress]) -> PortResult<usize> {
        let addresses = self.list(out.len())?;
        out[..addresses.len()].copy_from_slice(&addresses);
        Ok(addresses.len())
    }

    fn addresses(&self) -> Vec<SlotAddress> {
        self.table
            .read()
            .iter()
            .flatten()
            .map(|entry| entry.record.address)
            .collect()
    }

    /// Record and channel of the unit occupying `slot`.
    pub fn lookup_slot(&self, slot: usize) -> PortResult<(UnitRecord, Arc<TransactChannel>)> {
        self.table
            .read()
            .get(slot)
            .and_then(Option::as_ref)
            .map(|entry| (entry.record.clone(), Arc::clone(&entry.channel)))
            .ok_or_else(|| PortError::not_found(format!("slot {slot}")))
    }

    pub fn lookup_id(&self, id: UnitId) -> PortResult<UnitRecord> {
        self.table
            .read()
            .iter()
            .flatten()
            .find(|entry| entry.record.id() == id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| PortError::not_found(format!("unit {id}")))
    }

    /// Snapshot of every provisioned unit, ordered by slot.
    pub fn records(&self) -> Vec<UnitRecord> {
        self.table
            .read()
            .iter()
            .flatten()
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// Unprovision every unit. Returns how many were removed.
    pub fn shutdown(&self) -> usize {
        let mut table = self.table.write();
        let mut removed = 0;
        for slot in table.iter_mut() {
            if let Some(entry) = slot.take() {
                entry.channel.close();
                removed += 1;
            }
        }
        drop(table);

        if removed > 0 {
            info!(removed, "catalog shut down");
        }
        removed
    }
}

impl Drop for SlotCatalog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::DEFAULT_CAPACITY;
    use tracing_test::traced_test;
    use transact::{DataBuffer, RequestKind};
    use uuid::Uuid;

    fn unit(n: u128) -> UnitParams {
        UnitParams::new(UnitId::from_uuid(Uuid::from_u128(n + 1)), 16, 512, 512)
    }

    #[test]
    fn capacity_bounds() {
        assert!(SlotCatalog::new(0).is_err());
        assert!(SlotCatalog::new(MAX_CAPACITY + 1).is_err());
        assert_eq!(SlotCatalog::new(MAX_CAPACITY).unwrap().capacity(), 256);
    }

    #[test]
    fn lowest_free_slot_is_reused() {
        let catalog = SlotCatalog::new(DEFAULT_CAPACITY).unwrap();
        for n in 0..3 {
            assert_eq!(catalog.provision(unit(n)).unwrap().slot, n as usize);
        }

        catalog.unprovision(unit(1).unique_id).unwrap();
        let record = catalog.provision(unit(7)).unwrap();
        assert_eq!(record.slot, 1);
        assert_eq!(record.address, SlotAddress::new(0, 1, 0));

        assert_eq!(catalog.provision(unit(8)).unwrap().slot, 3);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let catalog = SlotCatalog::new(4).unwrap();
        catalog.provision(unit(0)).unwrap();
        assert_eq!(
            catalog.provision(unit(0)),
            Err(PortError::AlreadyExists {
                id: unit(0).unique_id
            })
        );
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn invalid_params_take_no_slot() {
        let catalog = SlotCatalog::new(4).unwrap();
        let mut bad = unit(0);
        bad.block_length = 0;
        assert!(matches!(
            catalog.provision(bad),
            Err(PortError::InvalidArgument { .. })
        ));
        assert!(catalog.is_empty());
    }

    #[test]
    fn full_catalog_reports_capacity() {
        let catalog = SlotCatalog::new(2).unwrap();
        catalog.provision(unit(0)).unwrap();
        catalog.provision(unit(1)).unwrap();
        assert_eq!(
            catalog.provision(unit(2)),
            Err(PortError::CapacityExceeded { capacity: 2 })
        );
    }

    #[test]
    fn list_into_writes_nothing_when_short() {
        let catalog = SlotCatalog::new(4).unwrap();
        catalog.provision(unit(0)).unwrap();
        catalog.provision(unit(1)).unwrap();

        let mut short = [SlotAddress(0xdead); 1];
        assert_eq!(
            catalog.list_into(&mut short),
            Err(PortError::BufferTooSmall {
                required: 2,
                available: 1
            })
        );
        assert_eq!(short, [SlotAddress(0xdead)]);

        let mut out = [SlotAddress(0); 4];
        assert_eq!(catalog.list_into(&mut out), Ok(2));
        assert_eq!(&out[..2], &[SlotAddress(0), SlotAddress(0x100)]);
    }

    #[test]
    fn unprovision_closes_channel_and_reuse_gets_new_one() {
        let catalog = SlotCatalog::new(1).unwrap();
        catalog.provision(unit(0)).unwrap();
        let (_, old) = catalog.lookup_slot(0).unwrap();

        catalog.unprovision(unit(0).unique_id).unwrap();
        assert!(old.is_closed());
        assert!(catalog.lookup_slot(0).is_err());

        catalog.provision(unit(1)).unwrap();
        let (record, new) = catalog.lookup_slot(0).unwrap();
        assert_eq!(record.id(), unit(1).unique_id);
        assert!(!new.is_closed());
        assert!(!Arc::ptr_eq(&old, &new));
    }

    #[test]
    fn unknown_unit_is_not_found() {
        let catalog = SlotCatalog::new(1).unwrap();
        assert!(matches!(
            catalog.unprovision(unit(0).unique_id),
            Err(PortError::NotFound { .. })
        ));
        assert!(catalog.lookup_id(unit(0).unique_id).is_err());
        assert!(catalog.lookup_slot(5).is_err());
    }

    #[test]
    fn shutdown_cancels_all_channels() {
        let catalog = SlotCatalog::new(4).unwrap();
        catalog.provision(unit(0)).unwrap();
        catalog.provision(unit(1)).unwrap();
        let (_, channel) = catalog.lookup_slot(1).unwrap();
        let read = RequestKind::Read {
            block_address: 0,
            block_count: 1,
            force_unit_access: false,
        };
        let hint = channel.enqueue_request(read, DataBuffer::new()).unwrap();

        assert_eq!(catalog.shutdown(), 2);
        assert!(catalog.is_empty());
        assert_eq!(channel.wait_for_response(hint), Err(PortError::Cancelled));
    }

    #[traced_test]
    #[test]
    fn provisioning_is_logged() {
        let catalog = SlotCatalog::new(2).unwrap();
        catalog.provision(unit(0)).unwrap();
        catalog.unprovision(unit(0).unique_id).unwrap();
        assert!(logs_contain("unit provisioned"));
        assert!(logs_contain("unit unprovisioned"));
    }
}
