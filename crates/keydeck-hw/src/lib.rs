//! Keydeck Hardware Library
//!
//! Protocol and device abstraction for multi-button USB key panels with a
//! bitmap display behind every key (Elgato Stream Deck Original, Original V2
//! and Plus, and whitelabeled devices speaking the same dialects).

pub mod codec;
pub mod error;
pub mod framing;
pub mod input;
pub mod profile;
pub mod session;
pub mod text;
pub mod tiler;
pub mod transport;

pub use error::{Error, Result};
pub use input::{Event, EventKind, PanelInputState};
pub use profile::{probe_connected, Dialect, DeviceProfile, ImageEncoding, ALL_PROFILES};
pub use session::{DeviceSession, SessionState};
pub use text::{FontSet, TextButton, TextLine};
pub use transport::{
    list_devices, DeviceDescriptor, DeviceHandle, HidHandle, HidTransport, Transport,
};

/// USB vendor ID shared by every supported panel.
pub const VENDOR_ID: u16 = 0x0FD9;
