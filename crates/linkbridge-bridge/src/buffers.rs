use std::io::{self, Write};

use linkbridge_net::TcpStream;
use linkbridge_timing::Instant;
use linkbridge_utils::ArrayVec;
use tracing::warn;

use crate::BridgeError;

/// Shifts `n` bytes out of the front of `buf`, preserving the remainder.
///
/// `ArrayVec` has no `Vec`-style `drain`; this is the fixed-capacity
/// equivalent, used for both the rx consume path and a partial tx write.
pub(crate) fn consume_front<const N: usize>(buf: &mut ArrayVec<u8, N>, n: usize) {
    let remaining = buf.len() - n;
    buf.as_mut_slice().copy_within(n.., 0);
    buf.truncate(remaining);
}

fn stamp_overflow(tx_overflow_at: &mut Option<Instant>) -> BridgeError {
    if tx_overflow_at.is_none() {
        *tx_overflow_at = Some(Instant::now());
    }
    BridgeError::TxOverflow
}

/// Appends as much of `bytes` as fits into `tx`, flushes if nothing is
/// already in flight, and recurses with the remainder if that flush emptied
/// the buffer — the `espbuffsend` algorithm (SPEC_FULL §4.2 send path),
/// ported byte-for-byte from `examples/original_source/serial/serbridge.c`.
/// Only fails to `TxOverflow` when bytes are still left over and the buffer
/// is still non-empty after the flush attempt. Takes explicit field
/// references rather than `&mut SlotBuffers` so it also serves
/// `connection::ReplyView`, a split borrow that only has those fields, not
/// a whole `SlotBuffers`.
pub(crate) fn queue_tx<const TX: usize>(
    stream: &mut TcpStream,
    tx: &mut ArrayVec<u8, TX>,
    ready_to_send: &mut bool,
    tx_overflow_at: &mut Option<Instant>,
    bytes: &[u8],
) -> Result<(), BridgeError> {
    if tx.len() >= TX {
        return Err(stamp_overflow(tx_overflow_at));
    }

    let avail = (TX - tx.len()).min(bytes.len());
    tx.extend(bytes[..avail].iter().copied());

    if *ready_to_send {
        flush_tx(stream, tx, ready_to_send, tx_overflow_at);
    }

    if avail < bytes.len() {
        if tx.is_empty() {
            return queue_tx(stream, tx, ready_to_send, tx_overflow_at, &bytes[avail..]);
        }
        return Err(stamp_overflow(tx_overflow_at));
    }
    Ok(())
}

/// Writes as much of `tx` as the socket accepts without blocking. See
/// `connection::Connection::flush` for the policy this implements.
pub(crate) fn flush_tx<const TX: usize>(
    stream: &mut TcpStream,
    tx: &mut ArrayVec<u8, TX>,
    ready_to_send: &mut bool,
    tx_overflow_at: &mut Option<Instant>,
) {
    if tx.is_empty() {
        *ready_to_send = true;
        return;
    }
    match stream.write(tx.as_slice()) {
        Ok(n) if n == tx.len() => {
            tx.clear();
            *ready_to_send = true;
            *tx_overflow_at = None;
        }
        Ok(n) => {
            consume_front(tx, n);
            *ready_to_send = false;
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            *ready_to_send = false;
        }
        Err(e) => {
            warn!(error = %e, "tx send failed, dropping in-flight bytes");
            tx.clear();
            *ready_to_send = true;
            if tx_overflow_at.is_none() {
                *tx_overflow_at = Some(Instant::now());
            }
        }
    }
}

/// The fixed-capacity rx/tx pair backing one connection slot.
///
/// `TX`/`RX` are the bridge-specific capacities from SPEC_FULL §6
/// (`MAX_TXBUFFER`/`MAX_RXBUFFER`): 2920/11680 for the serial bridge,
/// 1460/8760 for the VNC front-end.
pub struct SlotBuffers<const TX: usize, const RX: usize> {
    pub(crate) rx: ArrayVec<u8, RX>,
    pub(crate) tx: ArrayVec<u8, TX>,
    pub(crate) ready_to_send: bool,
    pub(crate) tx_overflow_at: Option<Instant>,
}

impl<const TX: usize, const RX: usize> Default for SlotBuffers<TX, RX> {
    fn default() -> Self {
        Self { rx: ArrayVec::new(), tx: ArrayVec::new(), ready_to_send: true, tx_overflow_at: None }
    }
}

impl<const TX: usize, const RX: usize> SlotBuffers<TX, RX> {
    pub fn rx_len(&self) -> usize {
        self.rx.len()
    }

    pub fn tx_len(&self) -> usize {
        self.tx.len()
    }

    pub fn ready_to_send(&self) -> bool {
        self.ready_to_send
    }

    /// Appends `bytes` to `rx`. Fails if the append would exceed `RX`
    /// (SPEC_FULL §4.2 receive path: "if the append would exceed
    /// MAX_RXBUFFER, disconnect").
    pub(crate) fn push_rx(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        if self.rx.len() + bytes.len() > RX {
            return Err(BridgeError::RxOverflow);
        }
        self.rx.extend(bytes.iter().copied());
        Ok(())
    }
}

impl<const TX: usize, const RX: usize> linkbridge_rfb::ByteQueue for SlotBuffers<TX, RX> {
    fn len(&self) -> usize {
        self.rx.len()
    }

    fn as_slice(&self) -> &[u8] {
        self.rx.as_slice()
    }

    fn consume(&mut self, n: usize) {
        consume_front(&mut self.rx, n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_rx_rejects_an_append_that_would_overflow() {
        let mut buffers = SlotBuffers::<64, 8>::default();
        buffers.push_rx(&[0; 8]).unwrap();
        assert_eq!(buffers.push_rx(&[0; 1]), Err(BridgeError::RxOverflow));
    }

    #[test]
    fn consume_front_shifts_the_remainder_down() {
        let mut buf: ArrayVec<u8, 8> = ArrayVec::new();
        buf.extend([1, 2, 3, 4].into_iter());
        consume_front(&mut buf, 2);
        assert_eq!(buf.as_slice(), &[3, 4]);
    }
}
