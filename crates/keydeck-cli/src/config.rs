//! Configuration management.

use anyhow::{Context, Result};
use keydeck_hw::{DeviceProfile, ImageEncoding};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Serial number of the preferred panel
    #[serde(default)]
    pub serial: Option<String>,

    /// Profile name or "auto" for probing
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Brightness applied after opening (0-100)
    #[serde(default)]
    pub brightness: Option<u8>,

    /// Extra device profiles, tried after the built-in ones
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
}

/// User-defined device profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,

    /// USB product ID
    pub product_id: u16,

    pub columns: usize,

    pub rows: usize,

    /// Button edge length in pixels
    pub button_size: u32,

    /// Gap between buttons in pixels
    #[serde(default = "default_spacer")]
    pub spacer: u32,

    /// "bmp" or "jpeg"
    #[serde(default = "default_image_format")]
    pub image_format: String,

    /// Rotate key images by 180 degrees
    #[serde(default)]
    pub rotate: bool,

    /// Mirror key indices per row
    #[serde(default)]
    pub remap_keys: bool,

    /// Number of dials
    #[serde(default)]
    pub dials: usize,
}

// Default value functions
fn default_profile() -> String {
    "auto".to_string()
}

fn default_spacer() -> u32 {
    19
}

fn default_image_format() -> String {
    "jpeg".to_string()
}

impl ProfileConfig {
    /// Converts the entry into a device profile.
    pub fn to_profile(&self) -> Result<DeviceProfile> {
        let image_encoding: ImageEncoding = self
            .image_format
            .parse()
            .with_context(|| format!("Invalid image format in profile '{}'", self.name))?;

        Ok(DeviceProfile {
            name: self.name.clone(),
            product_id: self.product_id,
            columns: self.columns,
            rows: self.rows,
            button_size: self.button_size,
            spacer: self.spacer,
            image_encoding,
            rotate_180: self.rotate,
            remap_key_index: self.remap_keys,
            dial_count: self.dials,
        })
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    #[allow(dead_code)]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
        Ok(())
    }

    /// Built-in profiles followed by the configured ones.
    pub fn all_profiles(&self) -> Result<Vec<DeviceProfile>> {
        let mut profiles = DeviceProfile::builtin();
        for entry in &self.profiles {
            profiles.push(entry.to_profile()?);
        }
        Ok(profiles)
    }

    /// Resolves a profile name against the built-in and configured profiles.
    ///
    /// Returns `None` for "auto".
    pub fn find_profile(&self, name: &str) -> Result<Option<DeviceProfile>> {
        if name.eq_ignore_ascii_case("auto") {
            return Ok(None);
        }
        if let Some(profile) = DeviceProfile::by_name(name) {
            return Ok(Some(profile));
        }
        for entry in &self.profiles {
            if entry.name.eq_ignore_ascii_case(name) {
                return entry.to_profile().map(Some);
            }
        }
        anyhow::bail!("Unknown profile '{}'", name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: None,
            profile: default_profile(),
            brightness: None,
            profiles: Vec::new(),
        }
    }
}
