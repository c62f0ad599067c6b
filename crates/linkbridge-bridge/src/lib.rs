//! The per-connection TCP bridge engine shared by the transparent serial
//! bridge and the RFB/VNC front-end: a single fixed-capacity connection
//! slot with overflow, idle, and stuck-send handling on top of a `mio`
//! reactor.

mod buffers;
mod connection;
mod engine;
mod error;
mod serial;
mod vnc;

pub use buffers::SlotBuffers;
pub use connection::Connection;
pub use engine::{BridgeEngine, DEFAULT_IDLE_TIMEOUT, DEFAULT_STUCK_SEND_TIMEOUT, RECV_UNHOLD_THRESHOLD};
pub use error::BridgeError;
pub use serial::{DEFAULT_SERIAL_PORT, SERIAL_MAX_RXBUFFER, SERIAL_MAX_TXBUFFER, SerialBridge};
pub use vnc::{DEFAULT_VNC_PORT, VNC_MAX_RXBUFFER, VNC_MAX_TXBUFFER, VncBridge};
