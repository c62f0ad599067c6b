use thiserror::Error;

use crate::TLV_MAX_HANDLERS;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvError {
    #[error("payload length {0} exceeds the 64-byte frame cap")]
    PayloadTooLarge(usize),
    #[error("channel 0 is reserved for flow control")]
    ReservedChannel,
    #[error("channel {0} has no direct handler slot (TLV_MAX_HANDLERS = {TLV_MAX_HANDLERS})")]
    NoHandlerSlot(u8),
    #[error("outbound sending is paused pending a flow-control resume")]
    WouldBlock,
}
