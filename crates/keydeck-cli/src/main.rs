//! Keydeck Control Tool
//!
//! CLI for driving USB key panels directly over HID.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use image::Rgba;
use keydeck_hw::{
    list_devices, probe_connected, DeviceSession, FontSet, HidHandle, HidTransport, TextButton,
    TextLine,
};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Name under which the `--font` file is registered.
const FONT_NAME: &str = "default";

#[derive(Parser)]
#[command(name = "keydeckctl")]
#[command(about = "Control tool for USB key panels")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device profile name, or "auto" to probe (overrides the config)
    #[arg(short, long)]
    profile: Option<String>,

    /// Serial number of the panel to open (overrides the config)
    #[arg(short, long)]
    serial: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected panels
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the profile of the first connected panel
    Probe,
    /// Set backlight brightness (0-100)
    Brightness { percent: u8 },
    /// Reset the panel to its logo screen
    Reset,
    /// Clear one key, or every key if none is given
    Clear { button: Option<usize> },
    /// Fill a key with a solid color
    FillColor {
        button: usize,
        #[arg(allow_negative_numbers = true)]
        r: i32,
        #[arg(allow_negative_numbers = true)]
        g: i32,
        #[arg(allow_negative_numbers = true)]
        b: i32,
    },
    /// Fill a key with an image file
    FillImage { button: usize, path: PathBuf },
    /// Spread one image file over the whole panel
    FillPanel { path: PathBuf },
    /// Draw text on a key
    Text {
        button: usize,
        /// Text to draw; each line of the argument becomes a line on the key
        text: String,
        /// TrueType/OpenType font file
        #[arg(long)]
        font: PathBuf,
        /// Font size in pixels
        #[arg(long, default_value_t = 16.0)]
        size: f32,
        /// Text color (#RRGGBB)
        #[arg(long, default_value = "#ffffff")]
        color: String,
        /// Background color (#RRGGBB)
        #[arg(long, default_value = "#000000")]
        background: String,
        /// Left margin in pixels
        #[arg(long, default_value_t = 4)]
        x: i32,
        /// Top margin in pixels
        #[arg(long, default_value_t = 4)]
        y: i32,
    },
    /// Print input events until interrupted
    Watch,
}

/// One row of `list --json`.
#[derive(Serialize)]
struct DeviceEntry {
    profile: String,
    product_id: u16,
    serial: Option<String>,
    product_name: Option<String>,
    path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    let transport = HidTransport::new().context("Failed to initialize HID library")?;

    match cli.command {
        Commands::List { json } => handle_list(&transport, &config, json),
        Commands::Probe => {
            let profile = probe_connected(&transport, &config.all_profiles()?)?;
            println!("{}", profile);
            Ok(())
        }
        command => {
            let session = open_session(&transport, &config, &cli.profile, &cli.serial)?;
            let result = handle_session(command, &session).await;
            session.close().context("Failed to close panel")?;
            result
        }
    }
}

fn handle_list(transport: &HidTransport, config: &Config, json: bool) -> Result<()> {
    let devices = list_devices(transport, &config.all_profiles()?)?;

    if json {
        let entries: Vec<DeviceEntry> = devices
            .into_iter()
            .map(|(profile, dev)| DeviceEntry {
                profile: profile.name,
                product_id: dev.product_id,
                serial: dev.serial,
                product_name: dev.product_name,
                path: dev.path,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No panels found");
        return Ok(());
    }

    for (profile, dev) in devices {
        println!(
            "{:<12} {:04X}  {:<16} {}",
            profile.name,
            dev.product_id,
            dev.serial.as_deref().unwrap_or("-"),
            dev.product_name.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn open_session(
    transport: &HidTransport,
    config: &Config,
    profile: &Option<String>,
    serial: &Option<String>,
) -> Result<DeviceSession<HidHandle>> {
    let name = profile.as_deref().unwrap_or(&config.profile);
    let profile = match config.find_profile(name)? {
        Some(profile) => profile,
        None => probe_connected(transport, &config.all_profiles()?)?,
    };
    let serial = serial.as_deref().or(config.serial.as_deref());

    let session = DeviceSession::open_with(transport, profile, serial)
        .context("Failed to open panel")?;
    info!("Opened {}", session.profile());

    if let Some(percent) = config.brightness {
        session
            .set_brightness(percent)
            .context("Failed to apply configured brightness")?;
    }
    Ok(session)
}

async fn handle_session(command: Commands, session: &DeviceSession<HidHandle>) -> Result<()> {
    match command {
        Commands::Brightness { percent } => {
            session.set_brightness(percent)?;
            println!("Brightness set to: {}%", percent);
        }
        Commands::Reset => {
            session.reset()?;
            println!("Panel reset");
        }
        Commands::Clear { button } => match button {
            Some(button) => {
                session.clear_button(button)?;
                println!("Key {} cleared", button);
            }
            None => {
                session.clear_all()?;
                println!("All keys cleared");
            }
        },
        Commands::FillColor { button, r, g, b } => {
            session.fill_color(button, r, g, b)?;
            println!("Key {} filled with ({}, {}, {})", button, r, g, b);
        }
        Commands::FillImage { button, path } => {
            session
                .fill_image_from_file(button, &path)
                .with_context(|| format!("Failed to draw {}", path.display()))?;
            println!("Key {} set to {}", button, path.display());
        }
        Commands::FillPanel { path } => {
            session
                .fill_panel_from_file(&path)
                .with_context(|| format!("Failed to draw {}", path.display()))?;
            println!("Panel set to {}", path.display());
        }
        Commands::Text {
            button,
            text,
            font,
            size,
            color,
            background,
            x,
            y,
        } => {
            let mut fonts = FontSet::new();
            fonts
                .add_font_file(FONT_NAME, &font)
                .with_context(|| format!("Failed to load font {}", font.display()))?;

            let color = parse_hex_color(&color)
                .with_context(|| format!("Invalid color '{}'", color))?;
            let background = parse_hex_color(&background)
                .with_context(|| format!("Invalid background '{}'", background))?;

            let lines = text
                .lines()
                .enumerate()
                .map(|(i, line)| TextLine {
                    text: line.to_string(),
                    x,
                    y: y + (i as f32 * size) as i32,
                    font: FONT_NAME.to_string(),
                    size,
                    color,
                })
                .collect();

            session.write_text(button, &TextButton { background, lines }, &fonts)?;
            println!("Key {} text updated", button);
        }
        Commands::Watch => watch(session).await?,
        Commands::List { .. } | Commands::Probe => {
            anyhow::bail!("command does not operate on an open panel")
        }
    }
    Ok(())
}

/// Prints events until ctrl-c.
async fn watch(session: &DeviceSession<HidHandle>) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.set_event_callback(move |state, event| {
        let _ = tx.send((state, event));
    });

    println!("Watching {} (ctrl-c to stop)", session.profile());
    loop {
        tokio::select! {
            Some((state, event)) = rx.recv() => {
                println!("{} {:?}", event, state);
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    session.clear_event_callback();
    Ok(())
}

/// Parses a `#RRGGBB` color string.
fn parse_hex_color(hex: &str) -> Option<Rgba<u8>> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Rgba([r, g, b, 255]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#ff8000"), Some(Rgba([255, 128, 0, 255])));
        assert_eq!(parse_hex_color("00ff00"), Some(Rgba([0, 255, 0, 255])));
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
    }

    #[test]
    fn test_parse_fill_color() {
        let cli = Cli::parse_from(["keydeckctl", "fill-color", "3", "255", "-1", "0"]);
        assert!(matches!(
            cli.command,
            Commands::FillColor { button: 3, r: 255, g: -1, b: 0 }
        ));
    }
}
