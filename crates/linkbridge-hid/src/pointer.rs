use crate::{HidError, HidSink};

/// Tracks the last absolute VNC pointer position so HID reports can carry
/// deltas instead — USB HID mice are relative-motion devices, VNC
/// `PointerEvent`s are absolute.
#[derive(Debug, Default, Clone, Copy)]
pub struct PointerState {
    baseline: Option<(u16, u16)>,
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `(x, y)` as the new position and, if a previous position was
    /// already known, sends a 4-byte `[mask, dx, dy, wheel]` HID report.
    /// The very first call after construction only establishes the
    /// baseline and sends nothing. On [`HidError::WouldBlock`] the baseline
    /// is left unmoved so the caller can retry with the same coordinates.
    pub fn apply(&mut self, mask: u8, x: u16, y: u16, wheel: i8, sink: &mut impl HidSink) -> Result<(), HidError> {
        let Some((last_x, last_y)) = self.baseline else {
            self.baseline = Some((x, y));
            return Ok(());
        };

        let dx = (x as i32 - last_x as i32) as i8;
        let dy = (y as i32 - last_y as i32) as i8;
        sink.send_hid(&[mask, dx as u8, dy as u8, wheel as u8])?;
        self.baseline = Some((x, y));
        Ok(())
    }
}
