use std::{io, time::Duration};

/// The byte-level transport the TLV framer drives.
///
/// `write` and `try_read` are non-blocking; `poll_byte` is the one blocking
/// call in the whole system, used only by [`crate::tlv_poll_uart`] and
/// bounded by `timeout` so a watchdog can still be fed between bytes.
pub trait UartPort {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn poll_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>>;
}

/// An in-memory loopback pair, for tests that need a [`UartPort`] without
/// real hardware. `LoopbackUart::pair()` returns two ends that see each
/// other's writes.
pub struct LoopbackUart {
    inbox: std::sync::mpsc::Receiver<u8>,
    outbox: std::sync::mpsc::Sender<u8>,
}

impl LoopbackUart {
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = std::sync::mpsc::channel();
        let (tx_b, rx_b) = std::sync::mpsc::channel();
        (Self { inbox: rx_b, outbox: tx_a }, Self { inbox: rx_a, outbox: tx_b })
    }
}

impl UartPort for LoopbackUart {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &b in bytes {
            self.outbox.send(b).map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        }
        Ok(())
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.inbox.try_recv() {
                Ok(b) => {
                    buf[n] = b;
                    n += 1;
                }
                Err(_) => break,
            }
        }
        Ok(n)
    }

    fn poll_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        match self.inbox.recv_timeout(timeout) {
            Ok(b) => Ok(Some(b)),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
        }
    }
}
