//! Device session: owns the handle, runs the read loop and serializes writes.

use crate::codec;
use crate::framing::{self, Transaction};
use crate::input::{Event, PanelInputState};
use crate::profile::DeviceProfile;
use crate::text::{FontSet, TextButton};
use crate::tiler;
use crate::transport::{DeviceHandle, HidHandle, HidTransport, Transport};
use crate::{Error, Result, VENDOR_ID};
use image::{Rgba, RgbaImage};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Size of the read buffer; larger than any input report.
const READ_BUFFER_SIZE: usize = 512;

/// Back-off after a failed read before polling again.
const READ_ERROR_SLEEP_MS: u64 = 100;

/// Callback invoked for every decoded event.
///
/// Runs on its own thread. The state is the latest known state, which may
/// already be ahead of the event.
pub type EventCallback = Arc<dyn Fn(PanelInputState, Event) + Send + Sync>;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Opening = 0,
    Running = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Opening,
            1 => SessionState::Running,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// State shared between the session and its read loop.
struct Shared<H> {
    profile: DeviceProfile,
    handle: H,
    write_lock: Mutex<()>,
    input: Mutex<PanelInputState>,
    callback: RwLock<Option<EventCallback>>,
    cancel: AtomicBool,
}

/// An open panel.
pub struct DeviceSession<H: DeviceHandle = HidHandle> {
    shared: Arc<Shared<H>>,
    serial: Option<String>,
    state: AtomicU8,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceSession<HidHandle> {
    /// Opens a panel through hidapi.
    ///
    /// If several panels of the same kind are connected, `serial` selects
    /// one; otherwise the first one found is used.
    pub fn open(profile: DeviceProfile, serial: Option<&str>) -> Result<Self> {
        let transport = HidTransport::new()?;
        Self::open_with(&transport, profile, serial)
    }
}

impl<H: DeviceHandle> DeviceSession<H> {
    /// Opens a panel through the given transport.
    pub fn open_with<T>(transport: &T, profile: DeviceProfile, serial: Option<&str>) -> Result<Self>
    where
        T: Transport<Handle = H> + ?Sized,
    {
        let not_found = || Error::DeviceNotFound {
            product_id: profile.product_id,
            serial: serial.map(str::to_string),
        };

        let devices = transport.enumerate(VENDOR_ID, profile.product_id)?;
        let descriptor = match serial {
            Some(s) => devices.iter().find(|d| d.serial.as_deref() == Some(s)),
            None => devices.first(),
        }
        .ok_or_else(not_found)?;

        let handle = transport.open(descriptor)?;

        let session = Self {
            shared: Arc::new(Shared {
                profile,
                handle,
                write_lock: Mutex::new(()),
                input: Mutex::new(PanelInputState::new()),
                callback: RwLock::new(None),
                cancel: AtomicBool::new(false),
            }),
            serial: descriptor.serial.clone(),
            state: AtomicU8::new(SessionState::Opening as u8),
            reader: Mutex::new(None),
        };

        // Dropping the session on failure closes the handle
        session.clear_all()?;

        let shared = Arc::clone(&session.shared);
        let reader = std::thread::Builder::new()
            .name("keydeck-reader".into())
            .spawn(move || read_loop(shared))?;
        *session.reader.lock().map_err(|_| Error::Closed)? = Some(reader);

        session.set_state(SessionState::Running);
        info!(
            "Session running: {} (serial {:?})",
            session.shared.profile, session.serial
        );
        Ok(session)
    }

    /// Profile bound to this session.
    pub fn profile(&self) -> &DeviceProfile {
        &self.shared.profile
    }

    /// Serial number of the open panel, if it reports one.
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Snapshot of the latest known input state.
    pub fn input_state(&self) -> PanelInputState {
        self.shared
            .input
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Registers the event callback, replacing any previous one.
    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(PanelInputState, Event) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.shared.callback.write() {
            *slot = Some(Arc::new(callback));
        }
    }

    /// Removes the event callback.
    pub fn clear_event_callback(&self) {
        if let Ok(mut slot) = self.shared.callback.write() {
            *slot = None;
        }
    }

    /// Sets the backlight brightness in percent (0-100).
    pub fn set_brightness(&self, percent: u8) -> Result<()> {
        let report = self.shared.profile.brightness_report(percent)?;
        self.send_feature(&report)?;
        debug!("Brightness set to {}%", percent);
        Ok(())
    }

    /// Resets the panel to its logo screen.
    pub fn reset(&self) -> Result<()> {
        let report = self.shared.profile.reset_report();
        self.send_feature(&report)?;
        debug!("Panel reset");
        Ok(())
    }

    /// Fills a key with a solid color. Components must be 0-255.
    pub fn fill_color(&self, button: usize, r: i32, g: i32, b: i32) -> Result<()> {
        let r = check_rgb(r)?;
        let g = check_rgb(g)?;
        let b = check_rgb(b)?;
        self.shared.profile.check_button(button)?;

        let size = self.shared.profile.button_size;
        let img = RgbaImage::from_pixel(size, size, Rgba([r, g, b, 255]));
        self.fill_image(button, &img)
    }

    /// Fills a key with an image, resampling it to the key size if needed.
    pub fn fill_image(&self, button: usize, img: &RgbaImage) -> Result<()> {
        self.shared.profile.check_button(button)?;
        self.ensure_open()?;

        let _guard = self.shared.write_lock.lock().map_err(|_| Error::Closed)?;
        let encoded = codec::encode(&self.shared.profile, img)?;
        let transactions = framing::frame(&self.shared.profile, button, &encoded)?;
        self.transmit(&transactions)?;
        debug!(
            "Key {} updated ({} bytes, {} reports)",
            button,
            encoded.len(),
            transactions.len()
        );
        Ok(())
    }

    /// Fills a key with an image file.
    pub fn fill_image_from_file<P: AsRef<Path>>(&self, button: usize, path: P) -> Result<()> {
        self.shared.profile.check_button(button)?;
        let img = image::open(path.as_ref())?.into_rgba8();
        self.fill_image(button, &img)
    }

    /// Fills the whole panel with one image, scaled and center-cropped.
    pub fn fill_panel(&self, img: &RgbaImage) -> Result<()> {
        for (button, tile) in tiler::tile(&self.shared.profile, img)? {
            self.fill_image(button, &tile)?;
        }
        Ok(())
    }

    /// Fills the whole panel with an image file.
    pub fn fill_panel_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let img = image::open(path.as_ref())?.into_rgba8();
        self.fill_panel(&img)
    }

    /// Renders text lines over a background color onto a key.
    pub fn write_text(&self, button: usize, text: &TextButton, fonts: &FontSet) -> Result<()> {
        self.shared.profile.check_button(button)?;
        let img = text.render(&self.shared.profile, fonts)?;
        self.fill_image(button, &img)
    }

    /// Fills a key with black.
    pub fn clear_button(&self, button: usize) -> Result<()> {
        self.fill_color(button, 0, 0, 0)
    }

    /// Fills every key with black.
    pub fn clear_all(&self) -> Result<()> {
        for button in (0..self.shared.profile.button_count()).rev() {
            self.clear_button(button)?;
        }
        Ok(())
    }

    /// Stops the read loop and closes the device. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        let previous = self.state.swap(SessionState::Closing as u8, Ordering::SeqCst);
        if matches!(
            SessionState::from_u8(previous),
            SessionState::Closing | SessionState::Closed
        ) {
            self.state.store(previous, Ordering::SeqCst);
            return Ok(());
        }

        self.shared.cancel.store(true, Ordering::SeqCst);
        // Unblocks a reader waiting on the device
        let closed = self.shared.handle.close();

        let reader = self.reader.lock().ok().and_then(|mut r| r.take());
        if let Some(reader) = reader {
            if reader.join().is_err() {
                warn!("Read loop panicked");
            }
        }

        self.set_state(SessionState::Closed);
        info!("Session closed");
        closed
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            SessionState::Closing | SessionState::Closed => Err(Error::Closed),
            _ => Ok(()),
        }
    }

    fn send_feature(&self, report: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.shared.write_lock.lock().map_err(|_| Error::Closed)?;
        self.shared.handle.send_feature_report(report)
    }

    /// Writes transactions in page order. Caller holds the write lock.
    fn transmit(&self, transactions: &[Transaction]) -> Result<()> {
        for tx in transactions {
            let written = self.shared.handle.write(tx.as_bytes())?;
            if written < tx.len() {
                return Err(Error::ShortWrite {
                    written,
                    expected: tx.len(),
                });
            }
        }
        Ok(())
    }
}

impl<H: DeviceHandle> Drop for DeviceSession<H> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("Error closing session on drop: {}", e);
        }
    }
}

/// Reads reports until cancelled or the handle is closed.
fn read_loop<H: DeviceHandle>(shared: Arc<Shared<H>>) {
    debug!("Read loop started");
    let mut buf = [0u8; READ_BUFFER_SIZE];

    while !shared.cancel.load(Ordering::SeqCst) {
        let len = match shared.handle.read(&mut buf) {
            Ok(0) => continue,
            Ok(len) => len,
            Err(Error::Closed) => break,
            Err(e) => {
                warn!("Read error: {}", e);
                std::thread::sleep(Duration::from_millis(READ_ERROR_SLEEP_MS));
                continue;
            }
        };

        let report = &buf[..len];
        let decoded = match shared.input.lock() {
            Ok(mut input) => input
                .update(&shared.profile, report)
                .map(|event| event.map(|e| (e, input.clone()))),
            Err(_) => break,
        };

        match decoded {
            Ok(Some((event, snapshot))) => {
                debug!("Event {}", event);
                dispatch(&shared, snapshot, event);
            }
            Ok(None) => {}
            Err(e) => warn!("Dropping input report {:02X?}: {}", &report[..len.min(16)], e),
        }
    }

    debug!("Read loop exiting");
}

/// Runs the callback on a detached thread so a slow callback never stalls reads.
fn dispatch<H>(shared: &Shared<H>, state: PanelInputState, event: Event) {
    let callback = shared.callback.read().ok().and_then(|cb| cb.clone());
    if let Some(callback) = callback {
        std::thread::spawn(move || callback(state, event));
    }
}

fn check_rgb(value: i32) -> Result<u8> {
    u8::try_from(value).map_err(|_| Error::InvalidColorComponent(value))
}
