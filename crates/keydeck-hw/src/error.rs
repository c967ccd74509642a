//! Error types for the keydeck hardware library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a panel.
#[derive(Error, Debug)]
pub enum Error {
    /// No matching panel is connected.
    #[error("panel not found (VID:PID 0FD9:{product_id:04X}{})", serial_suffix(.serial))]
    DeviceNotFound {
        product_id: u16,
        serial: Option<String>,
    },

    /// No candidate profile matched any connected panel.
    #[error("no supported panel connected")]
    NoSupportedDevice,

    /// Input report does not start with the report sentinel or is truncated.
    #[error("malformed input report: {0}")]
    MalformedReport(String),

    /// Modern dialect input report with an unknown discriminator byte.
    #[error("unknown input report type {0}")]
    UnknownReportType(u8),

    /// Image format the codec cannot produce.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Button index outside the panel.
    #[error("invalid button index {index} (panel has {count} buttons)")]
    InvalidButtonIndex { index: usize, count: usize },

    /// Color component outside 0-255.
    #[error("invalid color component {0} (must be 0-255)")]
    InvalidColorComponent(i32),

    /// Brightness outside 0-100.
    #[error("invalid brightness {0} (must be 0-100)")]
    InvalidBrightness(u8),

    /// The transport accepted fewer bytes than the transaction length.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// Source image has no pixels.
    #[error("empty image ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// Encoded image does not fit the framing of the profile.
    #[error("encoded image too large: {len} bytes (max {max})")]
    ImageTooLarge { len: usize, max: usize },

    /// Text line references a font that is not in the font set.
    #[error("font not found: {0}")]
    FontNotFound(String),

    /// Font data could not be parsed.
    #[error("font error: {0}")]
    Font(String),

    /// The session or device handle has been closed.
    #[error("device closed")]
    Closed,

    /// USB HID communication error.
    #[error("USB HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Image decoding or encoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn serial_suffix(serial: &Option<String>) -> String {
    match serial {
        Some(s) => format!(", serial {}", s),
        None => String::new(),
    }
}
