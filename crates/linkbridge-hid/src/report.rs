use crate::{HidError, HidSink, keymap};

/// The process-wide USB-HID keyboard report state.
///
/// Byte 0 is the modifier mask; bytes 1..=6 are up to six concurrently
/// pressed usage codes (true N-key rollover). Only the modifier byte and
/// the first rollover slot are ever transmitted (see [`KeyReport::press`]),
/// an intentional bandwidth trade-off inherited from the source firmware.
///
/// Sound only when at most one VNC client is connected at a time — see
/// `DESIGN.md`'s note on `MAX_CONN = 1`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyReport {
    keys: [u8; 7],
}

impl KeyReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a key press/release, sending an updated report if the state
    /// changed. Returns [`HidError::WouldBlock`] without committing the new
    /// state if the sink can't accept the frame right now; the caller is
    /// expected to retry with the same arguments once more input arrives.
    pub fn apply(&mut self, pressed: bool, keysym: u32, sink: &mut impl HidSink) -> Result<(), HidError> {
        let mut new_keys = self.keys;

        let modifier = keymap::modifier_for_keysym(keysym);
        if modifier != 0 {
            if pressed {
                new_keys[0] |= modifier;
                if new_keys[0] & (keymap::LSHIFT | keymap::RSHIFT) == (keymap::LSHIFT | keymap::RSHIFT) {
                    new_keys = [0; 7];
                }
            } else {
                new_keys[0] &= !modifier;
            }
        }

        let usage = keymap::usage_for_keysym(keysym);
        if pressed {
            let already_down = new_keys[1..].contains(&usage);
            if !already_down {
                if let Some(slot) = new_keys[1..].iter_mut().find(|slot| **slot == 0) {
                    *slot = usage;
                }
            }
        } else {
            for slot in &mut new_keys[1..] {
                if *slot == usage {
                    *slot = 0;
                }
            }
        }

        if new_keys == self.keys {
            return Ok(());
        }

        sink.send_hid(&[new_keys[0], new_keys[1]])?;
        self.keys = new_keys;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        sent: Vec<[u8; 2]>,
        blocked: bool,
    }

    impl HidSink for RecordingSink {
        fn send_hid(&mut self, payload: &[u8]) -> Result<(), HidError> {
            if self.blocked {
                return Err(HidError::WouldBlock);
            }
            self.sent.push([payload[0], payload[1]]);
            Ok(())
        }
    }

    #[test]
    fn uppercase_a_press_emits_shift_plus_usage_0x04() {
        let mut report = KeyReport::new();
        let mut sink = RecordingSink { sent: Vec::new(), blocked: false };
        report.apply(true, 0x41, &mut sink).unwrap();
        assert_eq!(sink.sent, vec![[0x02, 0x04]]);
    }

    #[test]
    fn release_clears_the_rollover_slot() {
        let mut report = KeyReport::new();
        let mut sink = RecordingSink { sent: Vec::new(), blocked: false };
        report.apply(true, 0x61, &mut sink).unwrap();
        report.apply(false, 0x61, &mut sink).unwrap();
        assert_eq!(sink.sent, vec![[0x00, 0x04], [0x00, 0x00]]);
    }

    #[test]
    fn both_shifts_simultaneously_resets_entire_report() {
        let mut report = KeyReport::new();
        let mut sink = RecordingSink { sent: Vec::new(), blocked: false };
        report.apply(true, 0xFFE1, &mut sink).unwrap(); // left shift down
        report.apply(true, 0x61, &mut sink).unwrap(); // 'a' down, still held
        report.apply(true, 0xFFE2, &mut sink).unwrap(); // right shift down -> panic reset
        assert_eq!(sink.sent.last(), Some(&[0x00, 0x00]));
    }

    #[test]
    fn would_block_does_not_commit_state() {
        let mut report = KeyReport::new();
        let mut sink = RecordingSink { sent: Vec::new(), blocked: true };
        let err = report.apply(true, 0x61, &mut sink).unwrap_err();
        assert_eq!(err, HidError::WouldBlock);
        assert_eq!(report.keys, [0; 7]);
    }

    #[test]
    fn unchanged_state_does_not_send() {
        let mut report = KeyReport::new();
        let mut sink = RecordingSink { sent: Vec::new(), blocked: false };
        // Releasing a key that was never pressed is a no-op.
        report.apply(false, 0x61, &mut sink).unwrap();
        assert!(sink.sent.is_empty());
    }
}
