use std::io::{self, Read};

use linkbridge_net::{Interest, Registry, Token, TcpStream};
use linkbridge_timing::{Duration, Instant};
use linkbridge_utils::ArrayVec;
use tracing::trace;

use crate::{
    BridgeError,
    buffers::{SlotBuffers, consume_front, flush_tx, queue_tx},
};

/// Bytes read per `on_readable` iteration. Arbitrary; large enough to drain
/// a typical TCP segment in one syscall, small enough to keep on the stack.
const READ_CHUNK: usize = 512;

/// One live TCP connection plus its fixed-capacity send/receive buffers.
///
/// Identified by a stable [`Token`] rather than a back-pointer from the
/// socket — see `DESIGN.md`'s note on `linkbridge-net`'s `Reactor` for why.
pub struct Connection<const TX: usize, const RX: usize> {
    stream: TcpStream,
    token: Token,
    registry: Registry,
    pub(crate) buffers: SlotBuffers<TX, RX>,
    last_activity: Instant,
    recv_held: bool,
    registered_interest: Option<Interest>,
}

impl<const TX: usize, const RX: usize> Connection<TX, RX> {
    pub(crate) fn new(stream: TcpStream, token: Token, registry: Registry) -> Self {
        Self {
            stream,
            token,
            registry,
            buffers: SlotBuffers::default(),
            last_activity: Instant::now(),
            recv_held: false,
            registered_interest: Some(Interest::READABLE),
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// Reads whatever is available without blocking, appending it to `rx`.
    /// Always holds further reads afterward (SPEC_FULL §4.2: "call
    /// `recv_hold`... then post the deferred task" on every successful
    /// append) — `sync_interest` clears the hold once the drain pass has
    /// caught up.
    pub(crate) fn on_readable(&mut self) -> Result<usize, BridgeError> {
        let mut total = 0usize;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(BridgeError::Disconnected),
                Ok(n) => {
                    self.buffers.push_rx(&chunk[..n])?;
                    total += n;
                    self.last_activity = Instant::now();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return Err(BridgeError::Disconnected),
            }
        }
        if total > 0 {
            self.recv_held = true;
        }
        Ok(total)
    }

    /// Appends `data` to `tx`, flushing immediately if nothing is already in
    /// flight and recursing with any remainder the flush made room for
    /// (SPEC_FULL §4.2 `buffered_send`/`flush_tx`).
    pub fn buffered_send(&mut self, data: &[u8]) -> Result<(), BridgeError> {
        if data.is_empty() {
            return Ok(());
        }
        queue_tx(
            &mut self.stream,
            &mut self.buffers.tx,
            &mut self.buffers.ready_to_send,
            &mut self.buffers.tx_overflow_at,
            data,
        )
    }

    /// A send failure is not itself fatal (SPEC_FULL §4.2 overflow
    /// handling): it clears the pending bytes, stamps `tx_overflow_at` if
    /// unset, and leaves disconnection to the stuck-send timeout so a
    /// single transient write error doesn't tear down the connection.
    pub(crate) fn flush(&mut self) {
        flush_tx(&mut self.stream, &mut self.buffers.tx, &mut self.buffers.ready_to_send, &mut self.buffers.tx_overflow_at);
    }

    /// Splits the connection into independent rx/reply views so the RFB
    /// state machine can hold both a `ByteQueue` and a `ReplySink` borrow at
    /// once — `rx` and the tx/stream state are disjoint fields, so this is
    /// an ordinary split borrow, not aliasing.
    pub(crate) fn split_rfb(&mut self) -> (RxView<'_, RX>, ReplyView<'_, TX>) {
        (
            RxView { rx: &mut self.buffers.rx },
            ReplyView {
                stream: &mut self.stream,
                tx: &mut self.buffers.tx,
                ready_to_send: &mut self.buffers.ready_to_send,
                tx_overflow_at: &mut self.buffers.tx_overflow_at,
            },
        )
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub(crate) fn stuck_for(&self) -> Option<Duration> {
        self.buffers.tx_overflow_at.map(|t| t.elapsed())
    }

    pub(crate) fn set_recv_held(&mut self, held: bool) {
        self.recv_held = held;
    }

    pub(crate) fn recv_held(&self) -> bool {
        self.recv_held
    }

    /// Reconciles the registered mio interest with `recv_held`/
    /// `ready_to_send`. Deregisters entirely when neither is wanted — mio
    /// interest sets cannot be empty — and re-registers (rather than
    /// reregisters) the next time either becomes wanted.
    pub(crate) fn sync_interest(&mut self) -> io::Result<()> {
        let want_readable = !self.recv_held;
        let want_writable = !self.buffers.ready_to_send;
        let wanted = match (want_readable, want_writable) {
            (false, false) => None,
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
        };
        match (self.registered_interest, wanted) {
            (None, None) => {}
            (None, Some(interest)) => {
                self.registry.register(&mut self.stream, self.token, interest)?;
            }
            (Some(_), None) => {
                self.registry.deregister(&mut self.stream)?;
            }
            (Some(old), Some(new)) if old == new => {}
            (Some(_), Some(new)) => {
                self.registry.reregister(&mut self.stream, self.token, new)?;
            }
        }
        self.registered_interest = wanted;
        trace!(token = ?self.token, ?wanted, "interest synced");
        Ok(())
    }

    pub(crate) fn deregister(&mut self) -> io::Result<()> {
        if self.registered_interest.is_some() {
            self.registry.deregister(&mut self.stream)?;
            self.registered_interest = None;
        }
        Ok(())
    }
}

impl<const TX: usize, const RX: usize> linkbridge_rfb::ByteQueue for Connection<TX, RX> {
    fn len(&self) -> usize {
        self.buffers.rx.len()
    }

    fn as_slice(&self) -> &[u8] {
        self.buffers.rx.as_slice()
    }

    fn consume(&mut self, n: usize) {
        consume_front(&mut self.buffers.rx, n);
    }
}

impl<const TX: usize, const RX: usize> linkbridge_rfb::ReplySink for Connection<TX, RX> {
    /// Fire-and-forget, matching the source's unchecked `espbuffsend_static`
    /// calls: an overflow here is surfaced instead through the stuck-send
    /// timeout on the next drain pass, not through this call's return value.
    fn send_reply(&mut self, bytes: &[u8]) {
        let _ = self.buffered_send(bytes);
    }
}

/// Borrowed view over just a connection's rx buffer, for use alongside a
/// simultaneous [`ReplyView`] borrow of the same connection.
pub(crate) struct RxView<'a, const RX: usize> {
    rx: &'a mut ArrayVec<u8, RX>,
}

impl<const RX: usize> linkbridge_rfb::ByteQueue for RxView<'_, RX> {
    fn len(&self) -> usize {
        self.rx.len()
    }

    fn as_slice(&self) -> &[u8] {
        self.rx.as_slice()
    }

    fn consume(&mut self, n: usize) {
        consume_front(self.rx, n);
    }
}

/// Borrowed view over just a connection's tx state and socket, for use
/// alongside a simultaneous [`RxView`] borrow of the same connection.
pub(crate) struct ReplyView<'a, const TX: usize> {
    stream: &'a mut TcpStream,
    tx: &'a mut ArrayVec<u8, TX>,
    ready_to_send: &'a mut bool,
    tx_overflow_at: &'a mut Option<Instant>,
}

impl<const TX: usize> linkbridge_rfb::ReplySink for ReplyView<'_, TX> {
    fn send_reply(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let _ = queue_tx(self.stream, self.tx, self.ready_to_send, self.tx_overflow_at, bytes);
    }
}
