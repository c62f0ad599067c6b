//! USB-HID keyboard/pointer report synthesis from RFB `KeyEvent`/`PointerEvent`
//! messages.

mod error;
pub mod keymap;
mod pointer;
mod report;
mod sink;

pub use error::HidError;
pub use pointer::PointerState;
pub use report::KeyReport;
pub use sink::HidSink;
