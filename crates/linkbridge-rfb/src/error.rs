use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfbError {
    #[error("VNC authentication failed")]
    AuthFailed,
    #[error("unrecognised RFB message type {0}")]
    UnknownMessageType(u8),
    #[error("HID channel send would block")]
    WouldBlock,
}

impl From<linkbridge_hid::HidError> for RfbError {
    fn from(_: linkbridge_hid::HidError) -> Self {
        RfbError::WouldBlock
    }
}
