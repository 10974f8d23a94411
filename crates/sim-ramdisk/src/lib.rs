//! RAM-backed unit handler for exercising a storage port without hardware.
//!
//! A [`RamDisk`] holds `block_count * block_length` bytes in memory and
//! answers READ/WRITE requests pulled from a unit's transaction channel.
//! [`serve`] runs the transact loop for one handler thread; [`spawn_handlers`]
//! starts several of them against the same disk. Handlers are bound to one
//! unit: once it is unprovisioned they exit, even if the slot is reused.
//!
//! # Example
//!
//! ```no_run
//! use common::{UnitId, UnitParams};
//! use sim_ramdisk::{spawn_handlers, RamDisk, RamDiskConfig};
//! use std::sync::Arc;
//! use storage_port::{PortConfig, StoragePort};
//!
//! let port = StoragePort::new(PortConfig::default()).unwrap();
//! let params = UnitParams::new(UnitId::new(), 1024, 512, 64 * 1024);
//! let disk = Arc::new(RamDisk::for_unit(&params).unwrap());
//! let address = port.provision(params).unwrap();
//! let handlers = spawn_handlers(&port, address, disk, &RamDiskConfig::default()).unwrap();
//! // ... issue commands with port.execute(...) ...
//! port.shutdown();
//! for handle in handlers {
//!     handle.join().unwrap().unwrap();
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use common::{PortError, SlotAddress, UnitParams};
use parking_lot::RwLock;
use protocol_scsi::scsi::{asc, ascq, sense_key};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use storage_port::{StoragePort, UnitHandle};
use tracing::{debug, info, trace, warn};
use transact::{Request, RequestKind, TransactStatus};

/// Handler settings.
#[derive(Debug, Clone)]
pub struct RamDiskConfig {
    /// Threads started by [`spawn_handlers`] for each unit.
    pub handler_threads: usize,
    /// How long one transact call may block before the loop goes around.
    pub poll_interval: Duration,
}

impl Default for RamDiskConfig {
    fn default() -> Self {
        Self {
            handler_threads: num_cpus::get().clamp(1, 4),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Request counters, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RamDiskStats {
    pub reads: u64,
    pub writes: u64,
    pub rejected: u64,
}

pub struct RamDisk {
    block_count: u64,
    block_length: u32,
    data: RwLock<Vec<u8>>,
    reads: AtomicU64,
    writes: AtomicU64,
    rejected: AtomicU64,
}

impl RamDisk {
    pub fn new(block_count: u64, block_length: u32) -> Result<Self> {
        if block_count == 0 || block_length == 0 {
            return Err(anyhow!("RAM disk geometry must be non-zero"));
        }
        let size = block_count
            .checked_mul(u64::from(block_length))
            .and_then(|size| usize::try_from(size).ok())
            .ok_or_else(|| {
                anyhow!("RAM disk of {block_count} x {block_length} bytes does not fit in memory")
            })?;
        debug!(block_count, block_length, size, "allocating RAM disk");
        Ok(Self {
            block_count,
            block_length,
            data: RwLock::new(vec![0u8; size]),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        })
    }

    /// Disk sized to match the unit's geometry.
    pub fn for_unit(params: &UnitParams) -> Result<Self> {
        Self::new(params.block_count, params.block_length)
            .with_context(|| format!("sizing RAM disk for unit {}", params.unique_id))
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub fn block_length(&self) -> u32 {
        self.block_length
    }

    pub fn stats(&self) -> RamDiskStats {
        RamDiskStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Serve one request against the backing memory and return the status
    /// to acknowledge it with.
    pub fn handle(&self, request: &Request) -> TransactStatus {
        let Some(range) = self.byte_range(&request.kind) else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(
                hint = %request.hint,
                lba = request.kind.block_address(),
                blocks = request.kind.block_count(),
                "request outside RAM disk"
            );
            return TransactStatus::check_condition(
                sense_key::ILLEGAL_REQUEST,
                asc::LBA_OUT_OF_RANGE,
                ascq::NONE,
            )
            .with_information(request.kind.block_address());
        };
        if range.len() != request.buffer.len() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                hint = %request.hint,
                expected = range.len(),
                actual = request.buffer.len(),
                "request buffer does not match transfer length"
            );
            return TransactStatus::check_condition(
                sense_key::ILLEGAL_REQUEST,
                asc::INVALID_FIELD_IN_CDB,
                ascq::NONE,
            );
        }

        match request.kind {
            RequestKind::Read { .. } => {
                let data = self.data.read();
                request.buffer.copy_from(&data[range]);
                self.reads.fetch_add(1, Ordering::Relaxed);
            }
            RequestKind::Write { .. } => {
                let mut data = self.data.write();
                request.buffer.copy_to(&mut data[range]);
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
        }
        TransactStatus::good()
    }

    fn byte_range(&self, kind: &RequestKind) -> Option<std::ops::Range<usize>> {
        let end_block = kind
            .block_address()
            .checked_add(u64::from(kind.block_count()))?;
        if end_block > self.block_count {
            return None;
        }
        let block_length = u64::from(self.block_length);
        // In range, so both offsets fit the allocation.
        let start = usize::try_from(kind.block_address() * block_length).ok()?;
        let end = usize::try_from(end_block * block_length).ok()?;
        Some(start..end)
    }
}

impl std::fmt::Debug for RamDisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RamDisk")
            .field("block_count", &self.block_count)
            .field("block_length", &self.block_length)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Run the transact loop for the unit behind `handle` until it is
/// unprovisioned.
///
/// Each response is acknowledged on the same call that fetches the next
/// request. Returns the number of requests served.
pub fn serve(handle: &UnitHandle, disk: &RamDisk, poll_interval: Duration) -> Result<u64> {
    let address = handle.address();
    let mut ack = None;
    let mut served = 0u64;
    loop {
        match handle.transact(ack.take(), Some(poll_interval)) {
            Ok(Some(request)) => {
                trace!(%address, hint = %request.hint, kind = %request.kind.kind(), "serving request");
                let status = disk.handle(&request);
                ack = Some(request.respond(status));
                served += 1;
            }
            Ok(None) => continue,
            Err(PortError::Cancelled) => {
                info!(%address, unit_id = %handle.record().id(), served, "unit gone; handler exiting");
                return Ok(served);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("transact loop for unit at {address}"));
            }
        }
    }
}

/// Start `config.handler_threads` threads running [`serve`] for the unit at
/// `address`. The threads hold a [`UnitHandle`], not the port.
pub fn spawn_handlers(
    port: &StoragePort,
    address: SlotAddress,
    disk: Arc<RamDisk>,
    config: &RamDiskConfig,
) -> Result<Vec<JoinHandle<Result<u64>>>> {
    let handle = port
        .attach(address)
        .with_context(|| format!("attaching RAM disk to {address}"))?;
    let threads = config.handler_threads.max(1);
    info!(%address, threads, "starting RAM disk handlers");
    (0..threads)
        .map(|index| {
            let handle = handle.clone();
            let disk = Arc::clone(&disk);
            let poll_interval = config.poll_interval;
            thread::Builder::new()
                .name(format!("ramdisk-{}-{index}", address.slot()))
                .spawn(move || serve(&handle, &disk, poll_interval))
                .context("spawning RAM disk handler thread")
        })
        .collect()
}
