use std::{io, net::SocketAddr};

use linkbridge_net::{Event, Interest, Reactor, TcpListener, Token};
use linkbridge_timing::Duration;
use tracing::{debug, info};

use crate::{BridgeError, connection::Connection};

/// rx fill level below which the deferred drain pass re-arms read
/// readiness (SPEC_FULL §4.2/§6).
pub const RECV_UNHOLD_THRESHOLD: usize = 32;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_STUCK_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// A TCP listener plus a single connection slot and its buffers.
///
/// `MAX_CONN` is fixed at 1 per SPEC_FULL §6/§9 note 3: a second connection
/// is rejected outright while the slot is occupied, and the VNC front-end's
/// process-wide HID state is only sound under this assumption.
pub struct BridgeEngine<const TX: usize, const RX: usize> {
    listener: TcpListener,
    listen_token: Token,
    connection: Option<Connection<TX, RX>>,
    idle_timeout: Duration,
    stuck_timeout: Duration,
}

impl<const TX: usize, const RX: usize> BridgeEngine<TX, RX> {
    pub fn bind(
        addr: SocketAddr,
        reactor: &mut Reactor,
        idle_timeout: Duration,
        stuck_timeout: Duration,
    ) -> io::Result<Self> {
        let (listen_token, listener) = reactor.listen(addr)?;
        Ok(Self { listener, listen_token, connection: None, idle_timeout, stuck_timeout })
    }

    pub fn listen_token(&self) -> Token {
        self.listen_token
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Accepts a pending connection, rejecting it immediately if the single
    /// slot is already occupied (SPEC_FULL §4.3: "If no slot is free,
    /// immediately disconnect the new connection").
    pub fn accept(&mut self, reactor: &mut Reactor) -> io::Result<bool> {
        match self.listener.accept() {
            Ok((mut stream, addr)) => {
                if self.connection.is_some() {
                    debug!(%addr, "rejecting connection, slot occupied");
                    return Ok(false);
                }
                let token = reactor.register_stream(&mut stream, Interest::READABLE)?;
                let registry = reactor.registry().try_clone()?;
                self.connection = Some(Connection::new(stream, token, registry));
                info!(%addr, "accepted connection");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Routes a reactor-reported event to the current connection, if it
    /// matches. Disconnects on read/peer-close failure.
    pub fn handle_event(&mut self, event: &Event) -> io::Result<()> {
        let matches = self.connection.as_ref().is_some_and(|c| c.token() == event.token());
        if !matches {
            return Ok(());
        }
        if event.is_readable()
            && let Some(conn) = self.connection.as_mut()
            && conn.on_readable().is_err()
        {
            self.disconnect()?;
            return Ok(());
        }
        if event.is_writable()
            && let Some(conn) = self.connection.as_mut()
        {
            conn.flush();
        }
        if let Some(conn) = self.connection.as_mut() {
            conn.sync_interest()?;
        }
        Ok(())
    }

    /// The deferred drain pass (SPEC_FULL §4.2): runs `processor` once over
    /// whatever is pending in `rx`, then re-arms reads if the fill level
    /// dropped below the unhold threshold. Also enforces the idle and
    /// stuck-send timeouts.
    pub fn drain<F>(&mut self, mut processor: F) -> io::Result<()>
    where
        F: FnMut(&mut Connection<TX, RX>) -> Result<(), BridgeError>,
    {
        let Some(conn) = self.connection.as_ref() else { return Ok(()) };
        if conn.idle_for() > self.idle_timeout {
            info!("idle timeout exceeded, disconnecting");
            return self.disconnect();
        }
        if conn.stuck_for().is_some_and(|stuck| stuck > self.stuck_timeout) {
            info!("stuck-send timeout exceeded, disconnecting");
            return self.disconnect();
        }

        let conn = self.connection.as_mut().expect("checked above");
        if conn.buffers.rx_len() > 0 && processor(conn).is_err() {
            return self.disconnect();
        }

        let Some(conn) = self.connection.as_mut() else { return Ok(()) };
        if conn.buffers.rx_len() < RECV_UNHOLD_THRESHOLD {
            conn.set_recv_held(false);
        }
        conn.sync_interest()
    }

    /// Sends on the current connection, if any; a no-op otherwise (matches
    /// the source's fan-out, which simply has nothing to send to once the
    /// slot is empty).
    pub fn send_to_current(&mut self, bytes: &[u8]) {
        if let Some(conn) = self.connection.as_mut() {
            let _ = conn.buffered_send(bytes);
        }
    }

    pub fn current_mut(&mut self) -> Option<&mut Connection<TX, RX>> {
        self.connection.as_mut()
    }

    fn disconnect(&mut self) -> io::Result<()> {
        if let Some(mut conn) = self.connection.take() {
            conn.deregister()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write as _,
        net::{IpAddr, Ipv4Addr, SocketAddr},
        time::Duration as StdDuration,
    };

    use super::*;

    fn local_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    fn connect_and_wait(bound: SocketAddr) -> std::net::TcpStream {
        let client = std::net::TcpStream::connect(bound).unwrap();
        std::thread::sleep(StdDuration::from_millis(20));
        client
    }

    #[test]
    fn accept_rejects_a_second_connection_while_the_slot_is_occupied() {
        let mut reactor = Reactor::new().unwrap();
        let mut engine: BridgeEngine<64, 64> =
            BridgeEngine::bind(local_addr(), &mut reactor, Duration::from_secs(300), Duration::from_secs(10)).unwrap();
        let bound = engine.local_addr().unwrap();

        let _client_a = connect_and_wait(bound);
        let _client_b = std::net::TcpStream::connect(bound).unwrap();
        std::thread::sleep(StdDuration::from_millis(20));

        assert!(engine.accept(&mut reactor).unwrap());
        assert!(engine.is_connected());
        assert!(!engine.accept(&mut reactor).unwrap());
    }

    #[test]
    fn drain_disconnects_after_the_idle_timeout_elapses() {
        let mut reactor = Reactor::new().unwrap();
        let mut engine: BridgeEngine<64, 64> =
            BridgeEngine::bind(local_addr(), &mut reactor, Duration::from_millis(10), Duration::from_secs(10)).unwrap();
        let bound = engine.local_addr().unwrap();

        let _client = connect_and_wait(bound);
        assert!(engine.accept(&mut reactor).unwrap());

        std::thread::sleep(StdDuration::from_millis(30));
        engine.drain(|_conn| Ok(())).unwrap();
        assert!(!engine.is_connected());
    }

    #[test]
    fn drain_runs_the_processor_over_pending_rx_and_rearms_reads() {
        let mut reactor = Reactor::new().unwrap();
        let mut engine: BridgeEngine<64, 64> =
            BridgeEngine::bind(local_addr(), &mut reactor, Duration::from_secs(300), Duration::from_secs(10)).unwrap();
        let bound = engine.local_addr().unwrap();

        let mut client = connect_and_wait(bound);
        assert!(engine.accept(&mut reactor).unwrap());
        client.write_all(b"hi").unwrap();

        let mut saw_readable = false;
        for _ in 0..50 {
            reactor
                .poll_with(Some(StdDuration::from_millis(20)), |ev| {
                    if engine.handle_event(ev).is_ok() && ev.is_readable() {
                        saw_readable = true;
                    }
                })
                .unwrap();
            if saw_readable {
                break;
            }
        }
        assert!(saw_readable);

        let mut seen = Vec::new();
        engine
            .drain(|conn| {
                seen.extend_from_slice(conn.buffers.rx.as_slice());
                let len = conn.buffers.rx_len();
                linkbridge_rfb::ByteQueue::consume(conn, len);
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, b"hi");
        assert_eq!(engine.current_mut().unwrap().buffers.rx_len(), 0);
    }
}
