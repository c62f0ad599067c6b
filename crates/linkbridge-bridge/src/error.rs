use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    #[error("rx buffer overflowed its fixed capacity")]
    RxOverflow,
    #[error("tx buffer overflowed its fixed capacity")]
    TxOverflow,
    #[error("peer disconnected")]
    Disconnected,
}
