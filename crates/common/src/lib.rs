use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod error;
pub use error::{PortError, PortResult};

/// Number of unit slots on the single virtual bus unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 16;

/// Hard ceiling on slots: the slot number occupies eight bits of a [`SlotAddress`].
pub const MAX_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub Uuid);

impl UnitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Packed bus/target/lun address of a provisioned unit.
///
/// Layout: `bus << 16 | slot << 8 | lun`, each field eight bits wide. The
/// single-bus design always uses bus 0 and lun 0, so slot `n` encodes to
/// `n << 8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotAddress(pub u32);

impl SlotAddress {
    pub const fn new(bus: u8, slot: u8, lun: u8) -> Self {
        Self(((bus as u32) << 16) | ((slot as u32) << 8) | lun as u32)
    }

    /// Address of `slot` on bus 0, lun 0. Slots above 255 do not fit.
    pub fn from_slot(slot: usize) -> Option<Self> {
        u8::try_from(slot).ok().map(|slot| Self::new(0, slot, 0))
    }

    pub const fn bus(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn slot(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn lun(&self) -> u8 {
        self.0 as u8
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// True when the address lies on the only bus/lun this port exposes.
    pub const fn is_local(&self) -> bool {
        self.bus() == 0 && self.lun() == 0 && self.0 >> 24 == 0
    }
}

impl From<u32> for SlotAddress {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<SlotAddress> for u32 {
    fn from(address: SlotAddress) -> Self {
        address.0
    }
}

impl fmt::Display for SlotAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.bus(), self.slot(), self.lun())
    }
}

/// Caller-supplied description of a unit to provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitParams {
    pub unique_id: UnitId,
    pub block_count: u64,
    pub block_length: u32,
    pub max_transfer_length: u32,
    #[serde(default)]
    pub write_protected: bool,
}

impl UnitParams {
    pub fn new(
        unique_id: UnitId,
        block_count: u64,
        block_length: u32,
        max_transfer_length: u32,
    ) -> Self {
        Self {
            unique_id,
            block_count,
            block_length,
            max_transfer_length,
            write_protected: false,
        }
    }

    pub fn with_write_protected(mut self, write_protected: bool) -> Self {
        self.write_protected = write_protected;
        self
    }

    /// Check geometry rules; the first violated rule is reported.
    pub fn validate(&self) -> PortResult<()> {
        if self.unique_id.is_nil() {
            return Err(PortError::invalid_argument("unique id must not be nil"));
        }
        if self.block_count == 0 {
            return Err(PortError::invalid_argument("block count must be > 0"));
        }
        if self.block_length == 0 {
            return Err(PortError::invalid_argument("block length must be > 0"));
        }
        if self.max_transfer_length < self.block_length {
            return Err(PortError::invalid_argument(format!(
                "max transfer length {} is smaller than block length {}",
                self.max_transfer_length, self.block_length
            )));
        }
        if self.max_transfer_length % self.block_length != 0 {
            return Err(PortError::invalid_argument(format!(
                "max transfer length {} is not a multiple of block length {}",
                self.max_transfer_length, self.block_length
            )));
        }
        Ok(())
    }

    /// Capacity of the unit in bytes, saturating on overflow.
    pub fn size_bytes(&self) -> u64 {
        self.block_count.saturating_mul(u64::from(self.block_length))
    }
}

/// A provisioned unit: its parameters plus the slot the catalog assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub params: UnitParams,
    pub slot: usize,
    pub address: SlotAddress,
}

impl UnitRecord {
    pub fn id(&self) -> UnitId {
        self.params.unique_id
    }

    pub fn block_count(&self) -> u64 {
        self.params.block_count
    }

    pub fn block_length(&self) -> u32 {
        self.params.block_length
    }

    pub fn max_transfer_length(&self) -> u32 {
        self.params.max_transfer_length
    }

    pub fn write_protected(&self) -> bool {
        self.params.write_protected
    }
}
