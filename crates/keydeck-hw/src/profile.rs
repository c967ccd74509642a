//! Per-generation panel geometry and wire dialect.
//!
//! Every hardware generation is described by an immutable [`DeviceProfile`].
//! A session binds exactly one profile for its lifetime.

use crate::transport::Transport;
use crate::{Error, Result, VENDOR_ID};
use std::str::FromStr;
use tracing::debug;

/// Image encoding expected by the panel for key images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// 24-bit BMP with BGR pixels in the panel's scan order.
    RawBgr,
    /// Baseline JPEG.
    Jpeg,
}

impl FromStr for ImageEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bmp" | "raw-bgr" | "raw_bgr" => Ok(ImageEncoding::RawBgr),
            "jpg" | "jpeg" => Ok(ImageEncoding::Jpeg),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageEncoding::RawBgr => write!(f, "bmp"),
            ImageEncoding::Jpeg => write!(f, "jpeg"),
        }
    }
}

/// Input/feature report layout family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// First generation: mirrored key order, 17-byte feature reports.
    Legacy,
    /// Later generations: typed input reports, 32-byte feature reports.
    Modern,
}

/// Static description of one panel generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Short profile name (e.g. "original").
    pub name: String,
    /// USB product ID.
    pub product_id: u16,
    /// Number of button columns.
    pub columns: usize,
    /// Number of button rows.
    pub rows: usize,
    /// Edge length of one square button image in pixels.
    pub button_size: u32,
    /// Gap between two adjacent buttons in pixels.
    pub spacer: u32,
    /// Key image encoding.
    pub image_encoding: ImageEncoding,
    /// Key images must be rotated 180° before encoding.
    pub rotate_180: bool,
    /// Key indices are mirrored per row on the wire (legacy dialect).
    pub remap_key_index: bool,
    /// Number of rotary dials.
    pub dial_count: usize,
}

/// Original 15-key panel (BMP images, mirrored key numbering).
pub fn original() -> DeviceProfile {
    DeviceProfile {
        name: "original".to_string(),
        product_id: 0x0060,
        columns: 5,
        rows: 3,
        button_size: 72,
        spacer: 19,
        image_encoding: ImageEncoding::RawBgr,
        rotate_180: false,
        remap_key_index: true,
        dial_count: 0,
    }
}

/// Second generation 15-key panel (JPEG images, upside-down scan).
pub fn original_v2() -> DeviceProfile {
    DeviceProfile {
        name: "original-v2".to_string(),
        product_id: 0x0080,
        columns: 5,
        rows: 3,
        button_size: 72,
        spacer: 19,
        image_encoding: ImageEncoding::Jpeg,
        rotate_180: true,
        remap_key_index: false,
        dial_count: 0,
    }
}

/// 8-key panel with four push/turn dials.
pub fn plus() -> DeviceProfile {
    DeviceProfile {
        name: "plus".to_string(),
        product_id: 0x0084,
        columns: 4,
        rows: 2,
        button_size: 120,
        spacer: 19,
        image_encoding: ImageEncoding::Jpeg,
        rotate_180: false,
        remap_key_index: false,
        dial_count: 4,
    }
}

/// Constructors for every built-in profile, in probing order.
pub const ALL_PROFILES: [fn() -> DeviceProfile; 3] = [original, original_v2, plus];

/// Legacy feature report length.
const LEGACY_FEATURE_LEN: usize = 17;

/// Modern feature report length.
const MODERN_FEATURE_LEN: usize = 32;

impl DeviceProfile {
    /// Returns every built-in profile.
    pub fn builtin() -> Vec<DeviceProfile> {
        ALL_PROFILES.iter().map(|p| p()).collect()
    }

    /// Looks up a built-in profile by name.
    pub fn by_name(name: &str) -> Option<DeviceProfile> {
        let name = name.to_lowercase();
        Self::builtin()
            .into_iter()
            .find(|p| p.name == name || p.name.replace('-', "_") == name)
    }

    /// Looks up a built-in profile by USB product ID.
    pub fn by_product_id(product_id: u16) -> Option<DeviceProfile> {
        Self::builtin()
            .into_iter()
            .find(|p| p.product_id == product_id)
    }

    /// Total number of buttons.
    pub fn button_count(&self) -> usize {
        self.rows * self.columns
    }

    /// Total panel width including spacers.
    pub fn panel_width(&self) -> u32 {
        let cols = self.columns as u32;
        cols * self.button_size + self.spacer * cols.saturating_sub(1)
    }

    /// Total panel height including spacers.
    pub fn panel_height(&self) -> u32 {
        let rows = self.rows as u32;
        rows * self.button_size + self.spacer * rows.saturating_sub(1)
    }

    /// Input/feature report dialect of this generation.
    pub fn dialect(&self) -> Dialect {
        if self.remap_key_index {
            Dialect::Legacy
        } else {
            Dialect::Modern
        }
    }

    /// Maps a canonical button index to the index used on the wire.
    ///
    /// Legacy panels number their keys right-to-left within a row and
    /// 1-based, so the column is mirrored and one is added.
    pub fn remap_key(&self, index: usize) -> usize {
        if self.remap_key_index {
            let col = index % self.columns;
            1 + (index - col) + (self.columns - 1 - col)
        } else {
            index
        }
    }

    /// Checks that a button index is on the panel.
    pub fn check_button(&self, index: usize) -> Result<()> {
        if index >= self.button_count() {
            return Err(Error::InvalidButtonIndex {
                index,
                count: self.button_count(),
            });
        }
        Ok(())
    }

    /// Builds the feature report that sets the backlight brightness.
    pub fn brightness_report(&self, percent: u8) -> Result<Vec<u8>> {
        if percent > 100 {
            return Err(Error::InvalidBrightness(percent));
        }
        let report = match self.dialect() {
            Dialect::Legacy => {
                let mut buf = vec![0u8; LEGACY_FEATURE_LEN];
                buf[..5].copy_from_slice(&[0x05, 0x55, 0xAA, 0xD1, 0x01]);
                buf[5] = percent;
                buf
            }
            Dialect::Modern => {
                let mut buf = vec![0u8; MODERN_FEATURE_LEN];
                buf[0] = 0x03;
                buf[1] = 0x08;
                buf[2] = percent;
                buf
            }
        };
        Ok(report)
    }

    /// Builds the feature report that resets the panel to its logo screen.
    pub fn reset_report(&self) -> Vec<u8> {
        match self.dialect() {
            Dialect::Legacy => {
                let mut buf = vec![0u8; LEGACY_FEATURE_LEN];
                buf[0] = 0x0B;
                buf[1] = 0x63;
                buf
            }
            Dialect::Modern => {
                let mut buf = vec![0u8; MODERN_FEATURE_LEN];
                buf[0] = 0x03;
                buf[1] = 0x02;
                buf
            }
        }
    }
}

impl std::fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (PID {:04X}, {}x{} keys, {}px, {})",
            self.name, self.product_id, self.columns, self.rows, self.button_size,
            self.image_encoding
        )
    }
}

/// Returns the first candidate profile with a connected device.
///
/// Only enumerates; no device is opened.
pub fn probe_connected<T: Transport + ?Sized>(
    transport: &T,
    candidates: &[DeviceProfile],
) -> Result<DeviceProfile> {
    for profile in candidates {
        let devices = transport.enumerate(VENDOR_ID, profile.product_id)?;
        debug!(
            "Probed {} (PID {:04X}): {} device(s)",
            profile.name,
            profile.product_id,
            devices.len()
        );
        if !devices.is_empty() {
            return Ok(profile.clone());
        }
    }
    Err(Error::NoSupportedDevice)
}
