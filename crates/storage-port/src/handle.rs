use common::{PortResult, SlotAddress, UnitRecord};
use std::sync::Arc;
use std::time::Duration;
use transact::{Request, Response, TransactChannel};

/// Handler-side binding to one provisioned unit.
///
/// The handle keeps the unit's channel, not the slot number, so once the unit
/// is unprovisioned every call returns `Cancelled` even if another unit has
/// taken the same address. Handles do not keep the port alive.
#[derive(Debug, Clone)]
pub struct UnitHandle {
    record: UnitRecord,
    channel: Arc<TransactChannel>,
    default_timeout: Option<Duration>,
}

impl UnitHandle {
    pub(crate) fn new(
        record: UnitRecord,
        channel: Arc<TransactChannel>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            record,
            channel,
            default_timeout,
        }
    }

    pub fn record(&self) -> &UnitRecord {
        &self.record
    }

    pub fn address(&self) -> SlotAddress {
        self.record.address
    }

    /// Acknowledge `ack` and fetch the next request; `timeout` falls back to
    /// the port's configured transact timeout.
    pub fn transact(
        &self,
        ack: Option<Response>,
        timeout: Option<Duration>,
    ) -> PortResult<Option<Request>> {
        self.channel.transact(ack, timeout.or(self.default_timeout))
    }

    pub fn respond(&self, response: Response) -> PortResult<()> {
        self.channel.respond(response)
    }

    /// True once the unit has been unprovisioned.
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}
