use std::io::Write as _;

use linkbridge_tlv::{MAX_PAYLOAD, Tlv, TlvError, UartPort};
use tracing::{debug, trace};

use crate::{
    BridgeError,
    engine::{BridgeEngine, DEFAULT_IDLE_TIMEOUT, DEFAULT_STUCK_SEND_TIMEOUT},
};

pub const DEFAULT_SERIAL_PORT: u16 = 23;

/// TX/RX capacities for the transparent serial bridge (SPEC_FULL §6).
pub const SERIAL_MAX_TXBUFFER: usize = 2920;
pub const SERIAL_MAX_RXBUFFER: usize = 11680;

/// The transparent TCP-to-serial bridge (C3): forwards each connection's
/// inbound bytes onto TLV channel `PIPE` in up-to-64-byte chunks, and fans
/// out inbound `PIPE` frames from the UART back out to the one open
/// connection.
///
/// Single-slot (`MAX_CONN = 1`), so "fan out to every open connection"
/// (SPEC_FULL §4.3) reduces to "send to the connection, if any."
pub struct SerialBridge {
    engine: BridgeEngine<SERIAL_MAX_TXBUFFER, SERIAL_MAX_RXBUFFER>,
    pipe_channel: u8,
    console: Box<dyn std::io::Write>,
}

impl SerialBridge {
    pub fn bind(
        addr: std::net::SocketAddr,
        reactor: &mut linkbridge_net::Reactor,
        pipe_channel: u8,
    ) -> std::io::Result<Self> {
        Self::bind_with_timeouts(addr, reactor, pipe_channel, DEFAULT_IDLE_TIMEOUT, DEFAULT_STUCK_SEND_TIMEOUT)
    }

    /// Same as [`Self::bind`], with the idle and stuck-send timeouts taken
    /// from configuration instead of the SPEC_FULL §6 defaults.
    pub fn bind_with_timeouts(
        addr: std::net::SocketAddr,
        reactor: &mut linkbridge_net::Reactor,
        pipe_channel: u8,
        idle_timeout: linkbridge_timing::Duration,
        stuck_timeout: linkbridge_timing::Duration,
    ) -> std::io::Result<Self> {
        let engine = BridgeEngine::bind(addr, reactor, idle_timeout, stuck_timeout)?;
        Ok(Self { engine, pipe_channel, console: Box::new(std::io::stdout()) })
    }

    pub fn listen_token(&self) -> linkbridge_net::Token {
        self.engine.listen_token()
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.engine.local_addr()
    }

    pub fn accept(&mut self, reactor: &mut linkbridge_net::Reactor) -> std::io::Result<bool> {
        self.engine.accept(reactor)
    }

    pub fn handle_event(&mut self, event: &linkbridge_net::Event) -> std::io::Result<()> {
        self.engine.handle_event(event)
    }

    /// Drains the connection's rx buffer onto TLV channel `PIPE`, 64 bytes
    /// at a time, stopping on the first `WouldBlock` (the deferred task
    /// retries on the next UART resume).
    pub fn drain<P: UartPort>(&mut self, tlv: &mut Tlv, port: &mut P) -> std::io::Result<()> {
        let pipe_channel = self.pipe_channel;
        self.engine.drain(|conn| {
            loop {
                let rx_len = conn.buffers.rx_len();
                if rx_len == 0 {
                    return Ok(());
                }
                let take = rx_len.min(MAX_PAYLOAD);
                let mut chunk = [0u8; MAX_PAYLOAD];
                chunk[..take].copy_from_slice(&conn.buffers.rx.as_slice()[..take]);
                match tlv.tlv_send(port, pipe_channel, &chunk[..take]) {
                    Ok(()) => {
                        linkbridge_rfb::ByteQueue::consume(conn, take);
                    }
                    Err(TlvError::WouldBlock) => return Ok(()),
                    Err(_) => return Err(BridgeError::Disconnected),
                }
            }
        })
    }

    /// The TLV handler for channel `PIPE` (and, per SPEC_FULL §4.3,
    /// `DEBUG`/`CONTROL`): writes the payload to the console sink, then
    /// forwards it to the one open connection. Matches `serTlvCb`'s
    /// `console_write_char` loop in `serbridge.c` for the `PIPE` case; the
    /// `DEBUG`/`CONTROL` case is logged only, as the source does.
    pub fn on_inbound(&mut self, channel: u8, payload: &[u8]) {
        if channel == self.pipe_channel {
            let _ = self.console.write_all(payload);
            self.engine.send_to_current(payload);
        } else {
            trace!(channel, len = payload.len(), "debug/control channel byte");
        }
        debug!(channel, len = payload.len(), "inbound tlv frame");
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }
}
