//! Input report decoding.
//!
//! Legacy report layout (16 bytes):
//! - Byte 0: sentinel 0x01
//! - Bytes 1-15: one byte per key, row-major, columns right-to-left
//!
//! Modern report layout:
//! - Byte 0: sentinel 0x01
//! - Byte 1: report type (0x00 keys, 0x03 dials)
//! - Keys: one byte per key from offset 4
//! - Dials: byte 4 selects push (0) or turn (nonzero), one byte per dial
//!   from offset 5

use crate::profile::{DeviceProfile, Dialect};
use crate::{Error, Result};

/// Every input report starts with this byte.
pub const REPORT_SENTINEL: u8 = 0x01;

/// Upper bound of a dial position.
pub const DIAL_MAX: u8 = 100;

/// Position a dial starts at when first observed.
pub const DIAL_START: u8 = 50;

/// Key report type (modern dialect).
const REPORT_TYPE_KEYS: u8 = 0x00;

/// Dial report type (modern dialect).
const REPORT_TYPE_DIALS: u8 = 0x03;

/// Legacy panels always report a 5x3 grid.
const LEGACY_COLUMNS: usize = 5;
const LEGACY_ROWS: usize = 3;
const LEGACY_KEYS: usize = LEGACY_COLUMNS * LEGACY_ROWS;

/// Kind of a decoded input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventKind {
    #[default]
    Unknown,
    KeyPressed,
    KeyReleased,
    DialPressed,
    DialReleased,
    DialTurned,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::KeyPressed => write!(f, "key-pressed"),
            EventKind::KeyReleased => write!(f, "key-released"),
            EventKind::DialPressed => write!(f, "dial-pressed"),
            EventKind::DialReleased => write!(f, "dial-released"),
            EventKind::DialTurned => write!(f, "dial-turn"),
            EventKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// One discrete user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Key or dial index, canonical (left-to-right, top-to-bottom).
    pub index: usize,
}

impl Event {
    pub fn new(kind: EventKind, index: usize) -> Self {
        Self { kind, index }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.index)
    }
}

/// Last known state of every control on the panel.
///
/// The vectors grow as indices are first observed, since the number of
/// controls a report carries depends on the hardware generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelInputState {
    pub keys: Vec<bool>,
    pub dial_pressed: Vec<bool>,
    /// Dial positions, 0-100.
    pub dial_position: Vec<u8>,
}

impl PanelInputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the key is currently held down.
    pub fn key_pressed(&self, index: usize) -> bool {
        self.keys.get(index).copied().unwrap_or(false)
    }

    /// Decodes one raw input report and folds it into the state.
    ///
    /// At most one event is produced per report. `Ok(None)` means the
    /// report carried no change.
    pub fn update(&mut self, profile: &DeviceProfile, report: &[u8]) -> Result<Option<Event>> {
        match report.first() {
            Some(&REPORT_SENTINEL) => {}
            Some(&b) => {
                return Err(Error::MalformedReport(format!(
                    "expected leading 0x01, got 0x{:02X}",
                    b
                )))
            }
            None => return Err(Error::MalformedReport("empty report".to_string())),
        }

        match profile.dialect() {
            Dialect::Legacy => self.update_legacy_keys(&report[1..]),
            Dialect::Modern => self.update_modern(report),
        }
    }

    fn update_legacy_keys(&mut self, data: &[u8]) -> Result<Option<Event>> {
        if data.len() < LEGACY_KEYS {
            return Err(Error::MalformedReport(format!(
                "legacy key report needs {} bytes, got {}",
                LEGACY_KEYS,
                data.len()
            )));
        }

        let mut canonical = [0u8; LEGACY_KEYS];
        for row in 0..LEGACY_ROWS {
            for col in 0..LEGACY_COLUMNS {
                canonical[row * LEGACY_COLUMNS + col] =
                    data[row * LEGACY_COLUMNS + (LEGACY_COLUMNS - 1 - col)];
            }
        }

        Ok(apply_bools(&mut self.keys, &canonical)
            .map(|i| bool_event(self.keys[i], i, EventKind::KeyPressed, EventKind::KeyReleased)))
    }

    fn update_modern(&mut self, report: &[u8]) -> Result<Option<Event>> {
        let report_type = *report
            .get(1)
            .ok_or_else(|| Error::MalformedReport("missing report type".to_string()))?;

        match report_type {
            REPORT_TYPE_KEYS => {
                let data = report.get(4..).unwrap_or_default();
                Ok(apply_bools(&mut self.keys, data).map(|i| {
                    bool_event(self.keys[i], i, EventKind::KeyPressed, EventKind::KeyReleased)
                }))
            }
            REPORT_TYPE_DIALS => {
                let mode = *report.get(4).ok_or_else(|| {
                    Error::MalformedReport("dial report missing mode byte".to_string())
                })?;
                let data = report.get(5..).unwrap_or_default();
                if mode == 0 {
                    Ok(apply_bools(&mut self.dial_pressed, data).map(|i| {
                        bool_event(
                            self.dial_pressed[i],
                            i,
                            EventKind::DialPressed,
                            EventKind::DialReleased,
                        )
                    }))
                } else {
                    Ok(apply_delta(&mut self.dial_position, data)
                        .map(|i| Event::new(EventKind::DialTurned, i)))
                }
            }
            other => Err(Error::UnknownReportType(other)),
        }
    }
}

fn bool_event(now: bool, index: usize, on: EventKind, off: EventKind) -> Event {
    Event::new(if now { on } else { off }, index)
}

/// Folds one byte per slot into a bool vector, growing it with `false`.
///
/// Returns the first index whose value changed.
pub fn apply_bools(state: &mut Vec<bool>, data: &[u8]) -> Option<usize> {
    if state.len() < data.len() {
        state.resize(data.len(), false);
    }

    let mut first_changed = None;
    for (i, &b) in data.iter().enumerate() {
        let now = b != 0;
        if state[i] != now && first_changed.is_none() {
            first_changed = Some(i);
        }
        state[i] = now;
    }
    first_changed
}

/// Applies one signed 8-bit delta per dial, clamping to `0..=DIAL_MAX`.
///
/// New dials start at [`DIAL_START`]. Returns the last index with a
/// nonzero delta.
pub fn apply_delta(positions: &mut Vec<u8>, data: &[u8]) -> Option<usize> {
    if positions.len() < data.len() {
        positions.resize(data.len(), DIAL_START);
    }

    let mut changed = None;
    for (i, &d) in data.iter().enumerate() {
        if d != 0 {
            changed = Some(i);
        }
        let delta = d as i8 as i32;
        let next = (positions[i] as i32 + delta).clamp(0, DIAL_MAX as i32);
        positions[i] = next as u8;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{original, plus};

    fn key_report(keys: &[u8]) -> Vec<u8> {
        let mut r = vec![0x01, 0x00, 0x08, 0x00];
        r.extend_from_slice(keys);
        r
    }

    #[test]
    fn test_modern_keys() {
        let p = plus();
        let mut s = PanelInputState::new();

        let ev = s.update(&p, &key_report(&[1, 0, 0, 0, 0, 0, 0, 0])).unwrap();
        assert_eq!(ev, Some(Event::new(EventKind::KeyPressed, 0)));
        assert!(s.keys[0]);
        assert!(!s.keys[1]);

        let ev = s.update(&p, &key_report(&[0; 8])).unwrap();
        assert_eq!(ev.unwrap().to_string(), "key-released:0");
        assert!(!s.keys[0]);

        let ev = s.update(&p, &key_report(&[0, 1, 0, 0, 0, 0, 0, 0])).unwrap();
        assert_eq!(ev.unwrap().to_string(), "key-pressed:1");
    }

    #[test]
    fn test_steady_state_emits_nothing() {
        let p = plus();
        let mut s = PanelInputState::new();
        let report = key_report(&[0, 0, 1, 0, 0, 0, 0, 0]);

        assert!(s.update(&p, &report).unwrap().is_some());
        assert_eq!(s.update(&p, &report).unwrap(), None);

        let mut bools = Vec::new();
        assert_eq!(apply_bools(&mut bools, &[0, 1, 1]), Some(1));
        assert_eq!(apply_bools(&mut bools, &[0, 1, 1]), None);
    }

    #[test]
    fn test_apply_bools_reports_first_change() {
        let mut bools = vec![false, false, false];
        assert_eq!(apply_bools(&mut bools, &[0, 1, 1]), Some(1));
        assert_eq!(bools, vec![false, true, true]);
    }

    #[test]
    fn test_dial_turns() {
        let p = plus();
        let mut s = PanelInputState::new();

        let ev = s.update(&p, &[1, 3, 5, 0, 1, 2]).unwrap();
        assert_eq!(s.dial_position[0], 52);
        assert_eq!(ev.unwrap().to_string(), "dial-turn:0");

        s.update(&p, &[1, 3, 5, 0, 1, 1]).unwrap();
        assert_eq!(s.dial_position[0], 53);

        s.update(&p, &[1, 3, 5, 0, 1, 50]).unwrap();
        assert_eq!(s.dial_position[0], 100);

        s.update(&p, &[1, 3, 5, 0, 1, 255]).unwrap();
        assert_eq!(s.dial_position[0], 99);

        s.update(&p, &[1, 3, 5, 0, 1, 254]).unwrap();
        assert_eq!(s.dial_position[0], 97);

        s.update(&p, &[1, 3, 5, 0, 1, 254]).unwrap();
        assert_eq!(s.dial_position[0], 95);

        s.dial_position[0] = 0;
        let ev = s.update(&p, &[1, 3, 5, 0, 1, 255]).unwrap();
        assert_eq!(s.dial_position[0], 0);
        assert_eq!(ev.unwrap().to_string(), "dial-turn:0");
    }

    #[test]
    fn test_dial_turn_reports_last_moved_dial() {
        let p = plus();
        let mut s = PanelInputState::new();

        let ev = s.update(&p, &[1, 3, 5, 0, 1, 3, 0, 0xFD, 0]).unwrap();
        assert_eq!(ev, Some(Event::new(EventKind::DialTurned, 2)));
        assert_eq!(s.dial_position, vec![53, 50, 47, 50]);

        assert_eq!(s.update(&p, &[1, 3, 5, 0, 1, 0, 0, 0, 0]).unwrap(), None);
    }

    #[test]
    fn test_dial_never_leaves_range() {
        let mut positions = Vec::new();
        for d in [0x7F, 0x7F, 0x80, 0x80, 0x80, 0x7F] {
            apply_delta(&mut positions, &[d]);
            assert!(positions[0] <= DIAL_MAX);
        }
    }

    #[test]
    fn test_dial_push() {
        let p = plus();
        let mut s = PanelInputState::new();

        let ev = s.update(&p, &[1, 3, 5, 0, 0, 1]).unwrap();
        assert!(s.dial_pressed[0]);
        assert_eq!(ev.unwrap().to_string(), "dial-pressed:0");

        let ev = s.update(&p, &[1, 3, 5, 0, 0, 0]).unwrap();
        assert!(!s.dial_pressed[0]);
        assert_eq!(ev.unwrap().to_string(), "dial-released:0");
    }

    #[test]
    fn test_legacy_descramble() {
        let p = original();
        let mut s = PanelInputState::new();

        let mut report = [0u8; 16];
        report[0] = 1;
        report[1] = 1;
        let ev = s.update(&p, &report).unwrap();
        assert_eq!(ev.unwrap().to_string(), "key-pressed:4");
        assert!(s.keys[4]);
        assert!(!s.keys[0]);

        report[1] = 0;
        let ev = s.update(&p, &report).unwrap();
        assert_eq!(ev.unwrap().to_string(), "key-released:4");

        let mut report = [0u8; 16];
        report[0] = 1;
        report[15] = 1;
        let ev = s.update(&p, &report).unwrap();
        assert_eq!(ev.unwrap().to_string(), "key-pressed:10");

        let mut report = [0u8; 16];
        report[0] = 1;
        report[11] = 1;
        let ev = s.update(&p, &report).unwrap();
        assert_eq!(ev.unwrap().to_string(), "key-released:10");
        assert!(s.keys[14]);
    }

    #[test]
    fn test_malformed_reports() {
        let mut s = PanelInputState::new();
        assert!(matches!(
            s.update(&plus(), &[2, 0, 0, 0, 1]),
            Err(Error::MalformedReport(_))
        ));
        assert!(matches!(
            s.update(&plus(), &[]),
            Err(Error::MalformedReport(_))
        ));
        assert!(matches!(
            s.update(&original(), &[1, 0, 0]),
            Err(Error::MalformedReport(_))
        ));
        assert!(matches!(
            s.update(&plus(), &[1, 7, 0, 0, 0]),
            Err(Error::UnknownReportType(7))
        ));
        assert_eq!(s, PanelInputState::new());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(
            Event::new(EventKind::DialPressed, 5).to_string(),
            "dial-pressed:5"
        );
        assert_eq!(Event::new(EventKind::Unknown, 0).to_string(), "unknown:0");
    }
}
