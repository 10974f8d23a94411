//! Virtual storage port: the control plane (provision, unprovision, list)
//! and the data plane (execute for command issuers, transact for handlers)
//! over a single-bus slot catalog.
//!
//! [`StoragePort`] is cheap to clone; clones share one catalog. Dropping the
//! last clone, or calling [`StoragePort::shutdown`], unprovisions every unit
//! and cancels all blocked callers. Long-running handlers should hold a
//! [`UnitHandle`] from [`StoragePort::attach`] rather than a port clone: a
//! handle is bound to one unit and does not keep the port alive.

use common::{PortError, PortResult, SlotAddress, UnitId, UnitParams, UnitRecord};
use protocol_scsi::{DataDirection, ExecuteOutcome};
use slot_catalog::SlotCatalog;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use transact::{Request, Response, TransactChannel};

pub mod config;
pub mod handle;
pub use config::PortConfig;
pub use handle::UnitHandle;

struct PortInner {
    catalog: SlotCatalog,
    config: PortConfig,
}

#[derive(Clone)]
pub struct StoragePort {
    inner: Arc<PortInner>,
}

impl StoragePort {
    pub fn new(config: PortConfig) -> PortResult<Self> {
        config.validate()?;
        let catalog = SlotCatalog::new(config.capacity)?;
        info!(capacity = config.capacity, "storage port started");
        Ok(Self {
            inner: Arc::new(PortInner { catalog, config }),
        })
    }

    pub fn config(&self) -> &PortConfig {
        &self.inner.config
    }

    pub fn capacity(&self) -> usize {
        self.inner.catalog.capacity()
    }

    /// Register a unit and return its address.
    pub fn provision(&self, params: UnitParams) -> PortResult<SlotAddress> {
        self.inner
            .catalog
            .provision(params)
            .map(|record| record.address)
    }

    /// Remove a unit; anything blocked on its channel is cancelled.
    pub fn unprovision(&self, id: UnitId) -> PortResult<()> {
        self.inner.catalog.unprovision(id).map(|_| ())
    }

    /// Addresses of provisioned units, ascending. `capacity` is the most the
    /// caller can accept.
    pub fn list(&self, capacity: usize) -> PortResult<Vec<SlotAddress>> {
        self.inner.catalog.list(capacity)
    }

    pub fn list_into(&self, out: &mut [SlotAddress]) -> PortResult<usize> {
        self.inner.catalog.list_into(out)
    }

    pub fn unit(&self, address: SlotAddress) -> PortResult<UnitRecord> {
        self.resolve(address).map(|(record, _)| record)
    }

    pub fn unit_by_id(&self, id: UnitId) -> PortResult<UnitRecord> {
        self.inner.catalog.lookup_id(id)
    }

    pub fn units(&self) -> Vec<UnitRecord> {
        self.inner.catalog.records()
    }

    /// Issue one SCSI command and wait for the handler to complete it.
    #[instrument(level = "debug", skip(self, cdb, buffer), fields(address = %address))]
    pub fn execute(
        &self,
        address: SlotAddress,
        cdb: &[u8],
        direction: DataDirection,
        buffer: &mut [u8],
    ) -> PortResult<ExecuteOutcome> {
        let (record, channel) = self.resolve(address)?;
        protocol_scsi::submit_and_wait(&channel, &record, cdb, direction, buffer)
    }

    /// Bind a handler to the unit currently at `address`.
    pub fn attach(&self, address: SlotAddress) -> PortResult<UnitHandle> {
        let (record, channel) = self.resolve(address)?;
        Ok(UnitHandle::new(
            record,
            channel,
            self.inner.config.transact_timeout,
        ))
    }

    /// Handler side: acknowledge `ack` and fetch the next request.
    ///
    /// `timeout` falls back to [`PortConfig::transact_timeout`]; `Ok(None)`
    /// means it elapsed with nothing to do.
    pub fn transact(
        &self,
        address: SlotAddress,
        ack: Option<Response>,
        timeout: Option<Duration>,
    ) -> PortResult<Option<Request>> {
        let (_, channel) = self.resolve(address)?;
        channel.transact(ack, timeout.or(self.inner.config.transact_timeout))
    }

    /// Handler side: deliver a response without fetching another request.
    pub fn respond(&self, address: SlotAddress, response: Response) -> PortResult<()> {
        let (_, channel) = self.resolve(address)?;
        channel.respond(response)
    }

    /// Unprovision everything. Returns the number of units removed.
    pub fn shutdown(&self) -> usize {
        self.inner.catalog.shutdown()
    }

    fn resolve(&self, address: SlotAddress) -> PortResult<(UnitRecord, Arc<TransactChannel>)> {
        if !address.is_local() {
            return Err(PortError::not_found(format!("address {address}")));
        }
        self.inner.catalog.lookup_slot(usize::from(address.slot()))
    }
}

impl std::fmt::Debug for StoragePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoragePort")
            .field("capacity", &self.capacity())
            .field("units", &self.inner.catalog.len())
            .finish()
    }
}
