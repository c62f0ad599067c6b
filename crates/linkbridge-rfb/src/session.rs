use linkbridge_hid::{HidError, HidSink, KeyReport, PointerState};
use tracing::{debug, warn};

use crate::{
    RfbError, ReplySink,
    traits::ByteQueue,
    wire::{self, message_type},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    ClientHello,
    ClientAuth,
    ClientInit,
    RfbMessage,
    CutText { remaining: u32 },
}

/// A single RFB 3.3 server connection's protocol state.
///
/// One instance per connection slot (`MAX_CONN = 1` for the VNC bridge — see
/// `DESIGN.md`). Does not own the TCP connection or the HID report state;
/// both are threaded through [`RfbSession::process`] so this type stays a
/// pure state machine.
pub struct RfbSession {
    state: State,
}

impl Default for RfbSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RfbSession {
    pub fn new() -> Self {
        Self { state: State::ClientHello }
    }

    /// Called once on accept, before any bytes have arrived, to emit the
    /// server hello.
    pub fn on_connect(&self, reply: &mut impl ReplySink) {
        reply.send_reply(wire::RFB_HELLO);
    }

    /// Drains as much of `rx` as the current protocol state allows,
    /// advancing the handshake or translating `KeyEvent`/`PointerEvent`
    /// messages into HID reports along the way. Returns once `rx` is
    /// drained or the next message needs bytes that haven't arrived yet, or
    /// the HID sink reports [`HidError::WouldBlock`] (in which case the
    /// triggering message is left in `rx` to retry later).
    ///
    /// An `Err` return means the protocol is in a terminal state; the
    /// caller must disconnect and discard `rx`.
    pub fn process(
        &mut self,
        rx: &mut impl ByteQueue,
        reply: &mut impl ReplySink,
        keys: &mut KeyReport,
        pointer: &mut PointerState,
        hid: &mut impl HidSink,
    ) -> Result<(), RfbError> {
        loop {
            if rx.len() == 0 {
                return Ok(());
            }

            let state = self.state;
            match state {
                State::ClientHello => {
                    if rx.len() < 12 {
                        return Ok(());
                    }
                    rx.consume(12);
                    reply.send_reply(&wire::AUTH_CHALLENGE);
                    self.state = State::ClientAuth;
                }
                State::ClientAuth => {
                    if rx.len() < 16 {
                        return Ok(());
                    }
                    let authenticated = rx.as_slice()[..16] == wire::AUTH_RESPONSE;
                    rx.consume(16);
                    if authenticated {
                        debug!("vnc client authenticated");
                        reply.send_reply(&wire::AUTH_OK);
                        self.state = State::ClientInit;
                    } else {
                        warn!("vnc client failed authentication");
                        reply.send_reply(&wire::AUTH_FAILED);
                        return Err(RfbError::AuthFailed);
                    }
                }
                State::ClientInit => {
                    // The source consumes the 1-byte shared-flag unconditionally,
                    // relying on the outer `rx.len() > 0` check above.
                    rx.consume(1);
                    reply.send_reply(&wire::INIT_MESSAGE);
                    self.state = State::RfbMessage;
                }
                State::RfbMessage => {
                    if !self.step_message(rx, keys, pointer, hid)? {
                        return Ok(());
                    }
                }
                State::CutText { remaining } => {
                    let take = (remaining as usize).min(rx.len());
                    if take == 0 {
                        return Ok(());
                    }
                    rx.consume(take);
                    let remaining = remaining - take as u32;
                    self.state =
                        if remaining == 0 { State::RfbMessage } else { State::CutText { remaining } };
                }
            }
        }
    }

    /// Handles one `RfbMessage`-state message. Returns `Ok(true)` if a
    /// message was fully consumed (caller should keep looping), `Ok(false)`
    /// if more input or HID-sink capacity is needed.
    fn step_message(
        &mut self,
        rx: &mut impl ByteQueue,
        keys: &mut KeyReport,
        pointer: &mut PointerState,
        hid: &mut impl HidSink,
    ) -> Result<bool, RfbError> {
        let msg_type = rx.as_slice()[0];
        match msg_type {
            message_type::SET_PIXEL_FORMAT => {
                if rx.len() < 20 {
                    return Ok(false);
                }
                rx.consume(20);
            }
            message_type::FIX_COLOUR_MAP_ENTRIES => {
                if rx.len() < 6 {
                    return Ok(false);
                }
                let bytes = rx.as_slice();
                let entries = usize::from(u16::from_be_bytes([bytes[4], bytes[5]]));
                let need = 6 + 6 * entries;
                if rx.len() < need {
                    return Ok(false);
                }
                rx.consume(need);
            }
            message_type::SET_ENCODINGS => {
                if rx.len() < 4 {
                    return Ok(false);
                }
                let bytes = rx.as_slice();
                let n = usize::from(u16::from_be_bytes([bytes[2], bytes[3]]));
                let need = 4 + 4 * n;
                if rx.len() < need {
                    return Ok(false);
                }
                rx.consume(need);
            }
            message_type::FRAMEBUFFER_UPDATE_REQUEST => {
                if rx.len() < 10 {
                    return Ok(false);
                }
                // No framebuffer to report on; the request is simply dropped.
                rx.consume(10);
            }
            message_type::KEY_EVENT => {
                if rx.len() < 8 {
                    return Ok(false);
                }
                let bytes = rx.as_slice();
                let pressed = bytes[1] == 1;
                let keysym = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
                match keys.apply(pressed, keysym, hid) {
                    Ok(()) => rx.consume(8),
                    Err(HidError::WouldBlock) => return Ok(false),
                }
            }
            message_type::POINTER_EVENT => {
                if rx.len() < 6 {
                    return Ok(false);
                }
                let bytes = rx.as_slice();
                let mask = bytes[1];
                let x = u16::from_be_bytes([bytes[2], bytes[3]]);
                let y = u16::from_be_bytes([bytes[4], bytes[5]]);
                match pointer.apply(mask, x, y, 0, hid) {
                    Ok(()) => rx.consume(6),
                    Err(HidError::WouldBlock) => return Ok(false),
                }
            }
            message_type::CLIENT_CUT_TEXT => {
                if rx.len() < 8 {
                    return Ok(false);
                }
                let bytes = rx.as_slice();
                // Corrected length parse; see DESIGN.md's note on the
                // source's `(b6 | 8)` mis-shift.
                let remaining = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
                rx.consume(8);
                self.state = State::CutText { remaining };
            }
            other => return Err(RfbError::UnknownMessageType(other)),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authed_session() -> (RfbSession, Vec<u8>) {
        let mut session = RfbSession::new();
        let mut reply = Vec::new();
        let mut keys = KeyReport::new();
        let mut pointer = PointerState::new();
        let mut hid = NoopHidSink;

        let mut rx: Vec<u8> = vec![0; 12];
        session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap();
        let mut rx: Vec<u8> = wire::AUTH_RESPONSE.to_vec();
        session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap();
        let mut rx: Vec<u8> = vec![0]; // shared flag
        session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap();
        (session, reply)
    }

    struct NoopHidSink;
    impl HidSink for NoopHidSink {
        fn send_hid(&mut self, _payload: &[u8]) -> Result<(), HidError> {
            Ok(())
        }
    }

    #[test]
    fn handshake_happy_path_emits_hello_challenge_ok_and_init() {
        let mut session = RfbSession::new();
        let mut reply = Vec::new();
        session.on_connect(&mut reply);
        assert_eq!(reply, wire::RFB_HELLO);

        let (_, reply) = authed_session();
        let mut expected = Vec::new();
        expected.extend_from_slice(&wire::AUTH_CHALLENGE);
        expected.extend_from_slice(&wire::AUTH_OK);
        expected.extend_from_slice(&wire::INIT_MESSAGE);
        assert_eq!(reply, expected);
    }

    #[test]
    fn wrong_auth_response_is_rejected_and_terminates() {
        let mut session = RfbSession::new();
        let mut reply = Vec::new();
        let mut keys = KeyReport::new();
        let mut pointer = PointerState::new();
        let mut hid = NoopHidSink;

        let mut rx: Vec<u8> = vec![0; 12];
        session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap();

        let mut rx: Vec<u8> = vec![0xFF; 16];
        let err = session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap_err();
        assert_eq!(err, RfbError::AuthFailed);
        assert!(reply.ends_with(&wire::AUTH_FAILED));
    }

    #[test]
    fn key_event_a_uppercase_press_emits_expected_hid_frame() {
        let (mut session, _) = authed_session();
        let mut reply = Vec::new();
        let mut keys = KeyReport::new();
        let mut pointer = PointerState::new();

        struct Recording(Vec<Vec<u8>>);
        impl HidSink for Recording {
            fn send_hid(&mut self, payload: &[u8]) -> Result<(), HidError> {
                self.0.push(payload.to_vec());
                Ok(())
            }
        }
        let mut hid = Recording(Vec::new());

        // KeyEvent, pressed=1, pad, keysym = 0x41 ('A')
        let mut rx: Vec<u8> = vec![4, 1, 0, 0, 0, 0, 0, 0x41];
        session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap();

        assert_eq!(hid.0, vec![vec![0x02, 0x04]]);
        assert!(rx.is_empty());
    }

    #[test]
    fn pointer_event_baseline_then_delta() {
        let (mut session, _) = authed_session();
        let mut reply = Vec::new();
        let mut keys = KeyReport::new();
        let mut pointer = PointerState::new();
        struct Recording(Vec<Vec<u8>>);
        impl HidSink for Recording {
            fn send_hid(&mut self, payload: &[u8]) -> Result<(), HidError> {
                self.0.push(payload.to_vec());
                Ok(())
            }
        }
        let mut hid = Recording(Vec::new());

        let mut rx: Vec<u8> = vec![5, 0, 0, 100, 0, 50];
        session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap();
        assert!(hid.0.is_empty());

        let mut rx: Vec<u8> = vec![5, 1, 0, 110, 0, 60];
        session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap();
        assert_eq!(hid.0, vec![vec![1, 10, 10, 0]]);
    }

    #[test]
    fn unknown_message_type_is_a_terminal_error() {
        let (mut session, _) = authed_session();
        let mut reply = Vec::new();
        let mut keys = KeyReport::new();
        let mut pointer = PointerState::new();
        let mut hid = NoopHidSink;

        let mut rx: Vec<u8> = vec![7, 0, 0, 0, 0, 0, 0, 0];
        let err = session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap_err();
        assert_eq!(err, RfbError::UnknownMessageType(7));
    }

    #[test]
    fn cut_text_is_skipped_across_multiple_chunks() {
        let (mut session, _) = authed_session();
        let mut reply = Vec::new();
        let mut keys = KeyReport::new();
        let mut pointer = PointerState::new();
        let mut hid = NoopHidSink;

        // ClientCutText header declaring 5 bytes of text to follow.
        let mut rx: Vec<u8> = vec![6, 0, 0, 0, 0, 0, 0, 5];
        session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap();
        assert_eq!(session.state, State::CutText { remaining: 5 });

        let mut rx: Vec<u8> = vec![b'h', b'e', b'l'];
        session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap();
        assert_eq!(session.state, State::CutText { remaining: 2 });

        let mut rx: Vec<u8> = vec![b'l', b'o'];
        session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap();
        assert_eq!(session.state, State::RfbMessage);
    }

    #[test]
    fn framebuffer_update_request_is_dropped_without_a_reply() {
        let (mut session, _) = authed_session();
        let mut reply = Vec::new();
        let mut keys = KeyReport::new();
        let mut pointer = PointerState::new();
        let mut hid = NoopHidSink;

        let mut rx: Vec<u8> = vec![3, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        session.process(&mut rx, &mut reply, &mut keys, &mut pointer, &mut hid).unwrap();
        assert!(rx.is_empty());
        assert!(reply.is_empty());
    }
}
