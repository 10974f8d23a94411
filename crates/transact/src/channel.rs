use common::{PortError, PortResult};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

use crate::request::{DataBuffer, Hint, Request, RequestKind, Response, TransactKind};

/// Process-wide, so a hint never outlives its channel: a reused slot gets a
/// new generation and hints from the old unit cannot match.
static NEXT_GENERATION: AtomicU32 = AtomicU32::new(1);

fn next_generation() -> u32 {
    loop {
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        if generation != 0 {
            return generation;
        }
    }
}

struct Outstanding {
    kind: TransactKind,
    dispatched: bool,
    response: Option<Response>,
}

struct ChannelState {
    pending: VecDeque<Request>,
    outstanding: HashMap<Hint, Outstanding>,
    closed: bool,
    generation: u32,
    next_sequence: u32,
}

impl ChannelState {
    fn allocate_hint(&mut self) -> Hint {
        loop {
            let sequence = self.next_sequence;
            self.next_sequence = self.next_sequence.wrapping_add(1);
            if sequence == 0 {
                continue;
            }
            if let Some(hint) = Hint::compose(self.generation, sequence) {
                if !self.outstanding.contains_key(&hint) {
                    return hint;
                }
            }
        }
    }

    fn complete(&mut self, response: Response) -> PortResult<()> {
        let entry = self.outstanding.get_mut(&response.hint).ok_or_else(|| {
            PortError::protocol(format!("no outstanding request for hint {}", response.hint))
        })?;
        if !entry.dispatched {
            return Err(PortError::protocol(format!(
                "hint {} was never handed to a handler",
                response.hint
            )));
        }
        if entry.response.is_some() {
            return Err(PortError::protocol(format!(
                "hint {} already answered",
                response.hint
            )));
        }
        if entry.kind != response.kind {
            return Err(PortError::protocol(format!(
                "hint {} is a {} request, response says {}",
                response.hint, entry.kind, response.kind
            )));
        }
        entry.response = Some(response);
        Ok(())
    }

    fn shut(&mut self) {
        self.closed = true;
        self.pending.clear();
        // Entries with a delivered response stay so their waiter still gets it.
        self.outstanding.retain(|_, entry| entry.response.is_some());
    }
}

/// Blocking request/response queue for one provisioned unit.
///
/// Producers call [`enqueue_request`](Self::enqueue_request) followed by
/// [`wait_for_response`](Self::wait_for_response); handlers loop on
/// [`transact`](Self::transact). Requests are delivered in FIFO order and a
/// response only ever reaches the waiter holding its hint. Once
/// [`close`](Self::close) runs, every blocked caller returns
/// [`PortError::Cancelled`] on its own; `close` does not wait for them.
///
/// Hints carry the channel's generation. An ack whose hint belongs to another
/// generation (a unit unprovisioned since the request was fetched) is refused
/// with `Cancelled` and leaves this channel untouched.
pub struct TransactChannel {
    slot: usize,
    state: Mutex<ChannelState>,
    request_ready: Condvar,
    response_ready: Condvar,
}

impl TransactChannel {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            state: Mutex::new(ChannelState {
                pending: VecDeque::new(),
                outstanding: HashMap::new(),
                closed: false,
                generation: next_generation(),
                next_sequence: 1,
            }),
            request_ready: Condvar::new(),
            response_ready: Condvar::new(),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.state.lock().generation
    }

    /// Queue a request and return its hint without blocking.
    pub fn enqueue_request(&self, kind: RequestKind, buffer: DataBuffer) -> PortResult<Hint> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PortError::Cancelled);
        }

        let hint = state.allocate_hint();
        state.outstanding.insert(
            hint,
            Outstanding {
                kind: kind.kind(),
                dispatched: false,
                response: None,
            },
        );
        state.pending.push_back(Request { hint, kind, buffer });
        drop(state);

        trace!(slot = self.slot, %hint, ?kind, "request enqueued");
        self.request_ready.notify_one();
        Ok(hint)
    }

    /// Block until the response for `hint` arrives or the channel closes.
    pub fn wait_for_response(&self, hint: Hint) -> PortResult<Response> {
        let mut state = self.state.lock();
        loop {
            if let Some(response) = self.take_response(&mut state, hint)? {
                return Ok(response);
            }
            self.response_ready.wait(&mut state);
        }
    }

    /// Like [`wait_for_response`](Self::wait_for_response) but gives up after
    /// `timeout`, leaving the request outstanding.
    pub fn wait_for_response_timeout(
        &self,
        hint: Hint,
        timeout: Duration,
    ) -> PortResult<Option<Response>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        loop {
            if let Some(response) = self.take_response(&mut state, hint)? {
                return Ok(Some(response));
            }
            match deadline {
                Some(deadline) if Instant::now() >= deadline => return Ok(None),
                Some(deadline) => {
                    self.response_ready.wait_until(&mut state, deadline);
                }
                None => self.response_ready.wait(&mut state),
            }
        }
    }

    fn take_response(&self, state: &mut ChannelState, hint: Hint) -> PortResult<Option<Response>> {
        let delivered = match state.outstanding.get_mut(&hint) {
            Some(entry) => entry.response.take(),
            None if !state.closed => {
                return Err(PortError::protocol(format!(
                    "no outstanding request for hint {hint}"
                )));
            }
            None => None,
        };
        if let Some(response) = delivered {
            state.outstanding.remove(&hint);
            return Ok(Some(response));
        }

        if state.closed {
            state.outstanding.remove(&hint);
            debug!(slot = self.slot, %hint, "waiter cancelled");
            return Err(PortError::Cancelled);
        }
        Ok(None)
    }

    /// Acknowledge the previous request (if any) and fetch the next one.
    ///
    /// Both steps run under one lock acquisition. With `timeout` set, returns
    /// `Ok(None)` when no request arrives in time. A bad `ack` is a protocol
    /// error and closes the channel.
    pub fn transact(
        &self,
        ack: Option<Response>,
        timeout: Option<Duration>,
    ) -> PortResult<Option<Request>> {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut state = self.state.lock();
        if state.closed {
            return Err(PortError::Cancelled);
        }

        if let Some(response) = ack {
            self.acknowledge(&mut state, response)?;
        }

        loop {
            if state.closed {
                return Err(PortError::Cancelled);
            }
            if let Some(request) = state.pending.pop_front() {
                if let Some(entry) = state.outstanding.get_mut(&request.hint) {
                    entry.dispatched = true;
                }
                trace!(slot = self.slot, hint = %request.hint, "request dispatched");
                return Ok(Some(request));
            }
            match deadline {
                Some(deadline) if Instant::now() >= deadline => return Ok(None),
                Some(deadline) => {
                    self.request_ready.wait_until(&mut state, deadline);
                }
                // No timeout, or one too large for `Instant`.
                None => self.request_ready.wait(&mut state),
            }
        }
    }

    /// Deliver a response without fetching another request.
    pub fn respond(&self, response: Response) -> PortResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PortError::Cancelled);
        }
        self.acknowledge(&mut state, response)
    }

    fn acknowledge(&self, state: &mut ChannelState, response: Response) -> PortResult<()> {
        if response.hint.generation() != state.generation {
            warn!(
                slot = self.slot,
                hint = %response.hint,
                generation = state.generation,
                "ack for a request of a previous unit; ignored"
            );
            return Err(PortError::Cancelled);
        }
        match state.complete(response) {
            Ok(()) => {
                trace!(slot = self.slot, hint = %response.hint, "response delivered");
                self.response_ready.notify_all();
                Ok(())
            }
            Err(err) => {
                error!(slot = self.slot, error = %err, "handler protocol violation; closing channel");
                state.shut();
                self.request_ready.notify_all();
                self.response_ready.notify_all();
                Err(err)
            }
        }
    }

    /// Close the channel and wake every blocked caller. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        let dropped = state.pending.len();
        state.shut();
        drop(state);

        debug!(slot = self.slot, dropped, "channel closed");
        self.request_ready.notify_all();
        self.response_ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Requests queued but not yet handed to a handler.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Requests enqueued whose response has not been collected.
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding.len()
    }
}

impl std::fmt::Debug for TransactChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransactChannel")
            .field("slot", &self.slot)
            .field("pending", &state.pending.len())
            .field("outstanding", &state.outstanding.len())
            .field("closed", &state.closed)
            .finish()
    }
}
