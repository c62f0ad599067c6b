use std::path::PathBuf;

use thiserror::Error;

/// Top-level error surfaced from `main`. Component-level operations return
/// their own `thiserror`-derived enums (`TlvError`, `BridgeError`,
/// `RfbError`); only genuine setup failures escape to this level and become
/// a fatal process exit (SPEC_FULL §7).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("reading config file {0}: {1}")]
    Config(PathBuf, #[source] std::io::Error),

    #[error("opening serial device {0}: {1}")]
    SerialOpen(PathBuf, #[source] serialport::Error),

    #[error("no --device given and no serial device configured")]
    NoDeviceConfigured,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("installing signal handler: {0}")]
    SignalHandler(#[from] ctrlc::Error),
}
