//! RFB 3.3 server state machine: handshake, single-secret auth, and a
//! message loop that turns `KeyEvent`/`PointerEvent` into USB-HID reports.
//! There is no real framebuffer behind this server — `FrameBufferUpdateRequest`
//! is acknowledged by silently dropping it.

mod error;
mod session;
mod traits;
mod wire;

pub use error::RfbError;
pub use session::RfbSession;
pub use traits::{ByteQueue, ReplySink};
pub use wire::{AUTH_CHALLENGE, AUTH_FAILED, AUTH_OK, AUTH_RESPONSE, INIT_MESSAGE, RFB_HELLO};
