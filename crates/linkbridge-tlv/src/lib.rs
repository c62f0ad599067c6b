//! Channel-multiplexed TLV framing over a single half-duplex UART.
//!
//! Every frame is `channel:u8 | length:u8 | payload[length]`, capped at 64
//! bytes of payload. Channel 0 carries flow control: after a successful
//! send the framer pauses until the peer acknowledges with a channel-0
//! resume frame.

mod error;
mod framer;
mod port;

pub use error::TlvError;
pub use framer::{CONTROL_CHANNEL, ChannelHandler, MAX_PAYLOAD, TLV_MAX_HANDLERS, Tlv};
pub use port::{LoopbackUart, UartPort};

use std::time::Duration;

/// Drains the UART synchronously, feeding every byte to `tlv` until a read
/// yields nothing. `watchdog` is invoked once per iteration so a caller can
/// keep a liveness timer fed during a long poll; on a host OS this is a
/// no-op, but the hook mirrors the embedded watchdog-refresh point.
pub fn tlv_poll_uart<P: UartPort>(
    tlv: &mut Tlv,
    port: &mut P,
    read_timeout: Duration,
    mut watchdog: impl FnMut(),
) -> std::io::Result<()> {
    loop {
        match port.poll_byte(read_timeout)? {
            Some(byte) => tlv.on_uart_bytes(&[byte]),
            None => return Ok(()),
        }
        watchdog();
    }
}
