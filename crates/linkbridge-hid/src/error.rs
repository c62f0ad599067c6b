use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidError {
    #[error("HID channel send would block (outbound TLV paused)")]
    WouldBlock,
}
