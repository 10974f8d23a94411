use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;

const STATUS_GOOD: u8 = 0x00;
const STATUS_CHECK_CONDITION: u8 = 0x02;

/// Correlation token pairing one request with its one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hint(NonZeroU64);

impl Hint {
    /// `None` for zero, which is never a valid hint.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }

    /// Hint with the issuing channel's generation in the high 32 bits.
    pub(crate) fn compose(generation: u32, sequence: u32) -> Option<Self> {
        Self::new((u64::from(generation) << 32) | u64::from(sequence))
    }

    /// Generation of the channel that issued this hint.
    pub fn generation(&self) -> u32 {
        (self.0.get() >> 32) as u32
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

/// Payload-free tag of a request, echoed back in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactKind {
    Read,
    Write,
}

impl fmt::Display for TransactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactKind::Read => f.write_str("read"),
            TransactKind::Write => f.write_str("write"),
        }
    }
}

/// Operation carried by a request. New operations are added as variants
/// here and as a matching [`TransactKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read {
        block_address: u64,
        block_count: u32,
        force_unit_access: bool,
    },
    Write {
        block_address: u64,
        block_count: u32,
        force_unit_access: bool,
    },
}

impl RequestKind {
    pub fn kind(&self) -> TransactKind {
        match self {
            RequestKind::Read { .. } => TransactKind::Read,
            RequestKind::Write { .. } => TransactKind::Write,
        }
    }

    pub fn block_address(&self) -> u64 {
        match *self {
            RequestKind::Read { block_address, .. } | RequestKind::Write { block_address, .. } => {
                block_address
            }
        }
    }

    pub fn block_count(&self) -> u32 {
        match *self {
            RequestKind::Read { block_count, .. } | RequestKind::Write { block_count, .. } => {
                block_count
            }
        }
    }

    pub fn force_unit_access(&self) -> bool {
        match *self {
            RequestKind::Read {
                force_unit_access, ..
            }
            | RequestKind::Write {
                force_unit_access, ..
            } => force_unit_access,
        }
    }
}

/// SCSI completion status reported by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactStatus {
    pub scsi_status: u8,
    pub sense_key: u8,
    pub asc: u8,
    pub ascq: u8,
    pub information: u64,
    pub information_valid: bool,
}

impl TransactStatus {
    /// GOOD status with no sense data.
    pub fn good() -> Self {
        Self::default()
    }

    /// CHECK CONDITION with the given sense triple.
    pub fn check_condition(sense_key: u8, asc: u8, ascq: u8) -> Self {
        Self {
            scsi_status: STATUS_CHECK_CONDITION,
            sense_key,
            asc,
            ascq,
            information: 0,
            information_valid: false,
        }
    }

    pub fn with_information(mut self, information: u64) -> Self {
        self.information = information;
        self.information_valid = true;
        self
    }

    pub fn is_good(&self) -> bool {
        self.scsi_status == STATUS_GOOD
    }
}

/// Byte region shared by the producer and the handler for one
/// request/response pair.
#[derive(Clone, Default)]
pub struct DataBuffer(Arc<Mutex<Vec<u8>>>);

impl DataBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_len(len: usize) -> Self {
        Self::from_vec(vec![0u8; len])
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self(Arc::new(Mutex::new(data)))
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy into `dst`, returning how many bytes were copied.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let data = self.0.lock();
        let n = data.len().min(dst.len());
        dst[..n].copy_from_slice(&data[..n]);
        n
    }

    /// Overwrite the start of the buffer with `src`, returning how many bytes
    /// fit.
    pub fn copy_from(&self, src: &[u8]) -> usize {
        let mut data = self.0.lock();
        let n = data.len().min(src.len());
        data[..n].copy_from_slice(&src[..n]);
        n
    }

    pub fn with_slice<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.0.lock())
    }

    pub fn with_slice_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.0.lock())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.lock().clone()
    }
}

impl fmt::Debug for DataBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBuffer").field("len", &self.len()).finish()
    }
}

/// A queued command waiting for a handler.
#[derive(Debug, Clone)]
pub struct Request {
    pub hint: Hint,
    pub kind: RequestKind,
    pub buffer: DataBuffer,
}

impl Request {
    /// Response to this request carrying `status`.
    pub fn respond(&self, status: TransactStatus) -> Response {
        Response {
            hint: self.hint,
            kind: self.kind.kind(),
            status,
        }
    }
}

/// A handler's answer to exactly one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub hint: Hint,
    pub kind: TransactKind,
    pub status: TransactStatus,
}
