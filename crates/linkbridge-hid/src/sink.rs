use crate::HidError;

/// Where a completed HID report gets sent. Implemented by whatever owns the
/// TLV layer's HID channel; kept as a trait so the report/pointer state
/// machines below have no dependency on the transport.
pub trait HidSink {
    fn send_hid(&mut self, payload: &[u8]) -> Result<(), HidError>;
}
