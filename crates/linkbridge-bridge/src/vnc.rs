use linkbridge_hid::{HidError, HidSink, KeyReport, PointerState};
use linkbridge_tlv::{Tlv, UartPort};
use linkbridge_rfb::RfbSession;
use tracing::info;

use crate::{
    BridgeError,
    engine::{BridgeEngine, DEFAULT_IDLE_TIMEOUT, DEFAULT_STUCK_SEND_TIMEOUT},
};

pub const DEFAULT_VNC_PORT: u16 = 5900;

/// TX/RX capacities for the VNC front-end (SPEC_FULL §6).
pub const VNC_MAX_TXBUFFER: usize = 1460;
pub const VNC_MAX_RXBUFFER: usize = 8760;

/// Adapts a `Tlv`/`UartPort` pair to [`HidSink`], so `RfbSession::process`
/// can emit HID reports without knowing about TLV framing.
struct TlvHidSink<'a, P: UartPort> {
    tlv: &'a mut Tlv,
    port: &'a mut P,
    channel: u8,
}

impl<P: UartPort> HidSink for TlvHidSink<'_, P> {
    fn send_hid(&mut self, payload: &[u8]) -> Result<(), HidError> {
        self.tlv.tlv_send(self.port, self.channel, payload).map_err(|_| HidError::WouldBlock)
    }
}

/// The RFB/VNC-to-USB-HID front-end (C4/C5): runs the RFB 3.3 handshake and
/// message loop over the one open connection, translating `KeyEvent`/
/// `PointerEvent` messages into USB-HID reports sent on TLV channel `HID`.
///
/// `keys`/`pointer` are process-wide rather than per-connection, which is
/// only sound under `MAX_CONN = 1` (see `DESIGN.md`'s Open Question
/// resolutions): there is never more than one RFB client to hold keyboard
/// modifier state or a pointer baseline for.
pub struct VncBridge {
    engine: BridgeEngine<VNC_MAX_TXBUFFER, VNC_MAX_RXBUFFER>,
    session: Option<RfbSession>,
    keys: KeyReport,
    pointer: PointerState,
    hid_channel: u8,
}

impl VncBridge {
    pub fn bind(
        addr: std::net::SocketAddr,
        reactor: &mut linkbridge_net::Reactor,
        hid_channel: u8,
    ) -> std::io::Result<Self> {
        Self::bind_with_timeouts(addr, reactor, hid_channel, DEFAULT_IDLE_TIMEOUT, DEFAULT_STUCK_SEND_TIMEOUT)
    }

    /// Same as [`Self::bind`], with the idle and stuck-send timeouts taken
    /// from configuration instead of the SPEC_FULL §6 defaults.
    pub fn bind_with_timeouts(
        addr: std::net::SocketAddr,
        reactor: &mut linkbridge_net::Reactor,
        hid_channel: u8,
        idle_timeout: linkbridge_timing::Duration,
        stuck_timeout: linkbridge_timing::Duration,
    ) -> std::io::Result<Self> {
        let engine = BridgeEngine::bind(addr, reactor, idle_timeout, stuck_timeout)?;
        Ok(Self { engine, session: None, keys: KeyReport::new(), pointer: PointerState::new(), hid_channel })
    }

    pub fn listen_token(&self) -> linkbridge_net::Token {
        self.engine.listen_token()
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.engine.local_addr()
    }

    /// Accepts a pending connection and, on success, starts a fresh RFB
    /// session and sends the server hello (SPEC_FULL §4.4).
    pub fn accept(&mut self, reactor: &mut linkbridge_net::Reactor) -> std::io::Result<bool> {
        let accepted = self.engine.accept(reactor)?;
        if accepted {
            let session = RfbSession::new();
            if let Some(conn) = self.engine.current_mut() {
                session.on_connect(conn);
            }
            self.session = Some(session);
            info!("vnc client connected, sent hello");
        }
        Ok(accepted)
    }

    pub fn handle_event(&mut self, event: &linkbridge_net::Event) -> std::io::Result<()> {
        self.engine.handle_event(event)
    }

    /// Drains the connection's rx buffer through the RFB state machine,
    /// emitting HID reports on `hid_channel` as `KeyEvent`/`PointerEvent`
    /// messages are parsed. Resets the RFB session once the connection
    /// drops so the next client starts from `ClientHello`.
    pub fn drain<P: UartPort>(&mut self, tlv: &mut Tlv, port: &mut P) -> std::io::Result<()> {
        let Self { engine, session, keys, pointer, hid_channel, .. } = self;
        let hid_channel = *hid_channel;
        engine.drain(|conn| {
            let Some(sess) = session.as_mut() else { return Ok(()) };
            let mut sink = TlvHidSink { tlv, port, channel: hid_channel };
            let (mut rx_view, mut reply_view) = conn.split_rfb();
            sess.process(&mut rx_view, &mut reply_view, keys, pointer, &mut sink)
                .map_err(|_| BridgeError::Disconnected)
        })?;
        if !engine.is_connected() {
            *session = None;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read as _, Write as _},
        net::{IpAddr, Ipv4Addr, SocketAddr},
        time::Duration as StdDuration,
    };

    use linkbridge_net::Reactor;
    use linkbridge_tlv::LoopbackUart;

    use super::*;

    fn accepted_bridge(reactor: &mut Reactor) -> (VncBridge, std::net::TcpStream) {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let mut bridge = VncBridge::bind(addr, reactor, 2).unwrap();
        let bound = bridge.local_addr().unwrap();
        let mut client = std::net::TcpStream::connect(bound).unwrap();
        std::thread::sleep(StdDuration::from_millis(20));
        assert!(bridge.accept(reactor).unwrap());

        let mut hello = [0u8; 12];
        client.read_exact(&mut hello).unwrap();
        assert_eq!(&hello, linkbridge_rfb::RFB_HELLO);
        (bridge, client)
    }

    /// Drives one round of client bytes through `drain`, waiting for the
    /// readable event first so the connection's rx buffer actually fills.
    fn send_and_drain(reactor: &mut Reactor, bridge: &mut VncBridge, client: &mut std::net::TcpStream, bytes: &[u8]) {
        client.write_all(bytes).unwrap();
        let mut saw_readable = false;
        for _ in 0..50 {
            reactor
                .poll_with(Some(StdDuration::from_millis(20)), |ev| {
                    if bridge.handle_event(ev).is_ok() && ev.is_readable() {
                        saw_readable = true;
                    }
                })
                .unwrap();
            if saw_readable {
                break;
            }
        }
        assert!(saw_readable);
        let (mut uart_a, _uart_b) = LoopbackUart::pair();
        let mut tlv = Tlv::new();
        bridge.drain(&mut tlv, &mut uart_a).unwrap();
    }

    #[test]
    fn handshake_happy_path_emits_challenge_ok_and_init() {
        let mut reactor = Reactor::new().unwrap();
        let (mut bridge, mut client) = accepted_bridge(&mut reactor);

        send_and_drain(&mut reactor, &mut bridge, &mut client, &[0; 12]);
        let mut challenge = [0u8; 20];
        client.read_exact(&mut challenge).unwrap();
        assert_eq!(challenge, linkbridge_rfb::AUTH_CHALLENGE);

        send_and_drain(&mut reactor, &mut bridge, &mut client, &linkbridge_rfb::AUTH_RESPONSE);
        let mut ok = [0u8; 4];
        let mut init = [0u8; 30];
        client.read_exact(&mut ok).unwrap();
        client.read_exact(&mut init).unwrap();
        assert_eq!(ok, linkbridge_rfb::AUTH_OK);
        assert_eq!(init, linkbridge_rfb::INIT_MESSAGE);

        send_and_drain(&mut reactor, &mut bridge, &mut client, &[0]); // shared flag
        assert!(bridge.is_connected());
    }

    #[test]
    fn key_event_emits_a_hid_report_on_the_configured_channel() {
        let mut reactor = Reactor::new().unwrap();
        let (mut bridge, mut client) = accepted_bridge(&mut reactor);
        send_and_drain(&mut reactor, &mut bridge, &mut client, &[0; 12]);
        let mut discard = [0u8; 20];
        client.read_exact(&mut discard).unwrap();
        send_and_drain(&mut reactor, &mut bridge, &mut client, &linkbridge_rfb::AUTH_RESPONSE);
        let mut discard = [0u8; 4 + 30];
        client.read_exact(&mut discard).unwrap();
        send_and_drain(&mut reactor, &mut bridge, &mut client, &[0]);

        client.write_all(&[4, 1, 0, 0, 0, 0, 0, 0x41]).unwrap(); // KeyEvent 'A' press
        let mut saw_readable = false;
        for _ in 0..50 {
            reactor
                .poll_with(Some(StdDuration::from_millis(20)), |ev| {
                    if bridge.handle_event(ev).is_ok() && ev.is_readable() {
                        saw_readable = true;
                    }
                })
                .unwrap();
            if saw_readable {
                break;
            }
        }
        assert!(saw_readable);

        let (mut uart_a, mut uart_b) = LoopbackUart::pair();
        let mut tlv = Tlv::new();
        bridge.drain(&mut tlv, &mut uart_a).unwrap();

        let mut buf = [0u8; 16];
        let n = uart_b.try_read(&mut buf).unwrap();
        // channel 2, length 2, payload [0x02 (shift), 0x04 ('a' usage)]
        assert_eq!(&buf[..n], &[2, 2, 0x02, 0x04]);
    }
}
