use linkbridge_timing::{Duration, Instant};
use linkbridge_utils::{ArrayVec, safe_assert};
use tracing::trace;

use crate::{TlvError, UartPort};

/// Maximum payload carried by a single frame.
pub const MAX_PAYLOAD: usize = 64;
/// Number of channels that can have a handler registered directly; channels
/// at or beyond this index fall back to the channel-0 handler.
pub const TLV_MAX_HANDLERS: usize = 4;
/// Reserved for framer-level flow control.
pub const CONTROL_CHANNEL: u8 = 0;

const STUCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    AwaitChannel,
    AwaitLength,
    AwaitData,
    /// A declared length exceeded `MAX_PAYLOAD`; the frame is malformed and
    /// the remaining bytes are discarded rather than overflowing the
    /// fixed-capacity payload buffer.
    Discard(u16),
}

/// A handler invoked once per complete frame dispatched to its channel.
///
/// Not `Send`: the whole system is single-threaded cooperative (SPEC_FULL
/// §5), so handlers close over `Rc<RefCell<_>>` state shared with the rest
/// of the run loop rather than needing thread-safe interior mutability.
pub type ChannelHandler = Box<dyn FnMut(u8, &[u8])>;

/// Byte-at-a-time TLV deframer plus the channel-0 flow-control flag and the
/// per-channel handler table.
///
/// One instance is created per UART and lives for the process lifetime.
pub struct Tlv {
    phase: Phase,
    channel: u8,
    length: u8,
    payload: ArrayVec<u8, MAX_PAYLOAD>,
    send_paused: bool,
    last_rx: Instant,
    handlers: [Option<ChannelHandler>; TLV_MAX_HANDLERS],
}

impl Default for Tlv {
    fn default() -> Self {
        Self::new()
    }
}

impl Tlv {
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitChannel,
            channel: 0,
            length: 0,
            payload: ArrayVec::new(),
            send_paused: false,
            last_rx: Instant::epoch(),
            handlers: [None, None, None, None],
        }
    }

    /// Registers `handler` for `channel`. Channels `>= TLV_MAX_HANDLERS` are
    /// rejected; the framer falls back to the channel-0 handler for those at
    /// dispatch time, but registration is explicit per slot.
    pub fn register_handler(&mut self, channel: u8, handler: ChannelHandler) -> Result<(), TlvError> {
        let idx = usize::from(channel);
        if idx >= TLV_MAX_HANDLERS {
            return Err(TlvError::NoHandlerSlot(channel));
        }
        self.handlers[idx] = Some(handler);
        Ok(())
    }

    pub fn is_send_paused(&self) -> bool {
        self.send_paused
    }

    /// Sends `payload` on `channel`. Fails with [`TlvError::WouldBlock`] if
    /// outbound sending is currently paused; if no byte has arrived in the
    /// last 50ms, first makes one non-blocking attempt to read a byte in
    /// case a resume was missed.
    pub fn tlv_send<P: UartPort>(
        &mut self,
        port: &mut P,
        channel: u8,
        payload: &[u8],
    ) -> Result<(), TlvError> {
        if channel == CONTROL_CHANNEL {
            return Err(TlvError::ReservedChannel);
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(TlvError::PayloadTooLarge(payload.len()));
        }

        if self.send_paused {
            if self.last_rx.elapsed() >= STUCK_POLL_INTERVAL {
                let mut byte = [0u8; 1];
                if let Ok(1) = port.try_read(&mut byte) {
                    self.on_uart_bytes(&byte);
                }
            }
            if self.send_paused {
                return Err(TlvError::WouldBlock);
            }
        }

        port.write(&[channel, payload.len() as u8])
            .map_err(|_| TlvError::WouldBlock)?;
        if !payload.is_empty() {
            port.write(payload).map_err(|_| TlvError::WouldBlock)?;
        }
        self.send_paused = true;
        trace!(channel, len = payload.len(), "tlv frame sent");
        Ok(())
    }

    /// Feeds raw bytes received from the UART into the deframer, dispatching
    /// every frame that completes along the way.
    pub fn on_uart_bytes(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.last_rx = Instant::now();
        }
        for &byte in bytes {
            self.step(byte);
        }
    }

    fn step(&mut self, byte: u8) {
        match self.phase {
            Phase::AwaitChannel => {
                self.channel = byte;
                self.phase = Phase::AwaitLength;
            }
            Phase::AwaitLength => {
                self.length = byte;
                self.payload.clear();
                if self.length == 0 {
                    self.phase = Phase::AwaitChannel;
                    let channel = self.channel;
                    self.dispatch(channel, &[]);
                } else if usize::from(self.length) > MAX_PAYLOAD {
                    trace!(declared_len = self.length, "oversized tlv frame, discarding");
                    self.phase = Phase::Discard(u16::from(self.length) - 1);
                } else {
                    self.phase = Phase::AwaitData;
                }
            }
            Phase::AwaitData => {
                safe_assert!(self.payload.len() < MAX_PAYLOAD);
                self.payload.push(byte);
                if self.payload.len() >= usize::from(self.length) {
                    let channel = self.channel;
                    // Take the payload out so `dispatch` can borrow `self` mutably.
                    let mut frame = ArrayVec::<u8, MAX_PAYLOAD>::new();
                    frame.extend(self.payload.iter().copied());
                    self.payload.clear();
                    self.phase = Phase::AwaitChannel;
                    self.dispatch(channel, frame.as_slice());
                }
            }
            Phase::Discard(remaining) => {
                self.phase = match remaining {
                    0 => Phase::AwaitChannel,
                    n => Phase::Discard(n - 1),
                };
            }
        }
    }

    fn dispatch(&mut self, channel: u8, payload: &[u8]) {
        if channel == CONTROL_CHANNEL && payload.len() == 2 && payload[0] == 0 {
            self.send_paused = payload[1] != 0;
            trace!(paused = self.send_paused, "flow control update");
            return;
        }
        let idx = if usize::from(channel) < TLV_MAX_HANDLERS { usize::from(channel) } else { 0 };
        if let Some(handler) = self.handlers[idx].as_mut() {
            handler(channel, payload);
        }
    }
}
