use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::DEFAULT_CLOCK_HZ;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub strip: StripConfig,
    /// Optional file-backed mirror shared with other processes
    #[serde(default)]
    pub mirror: Option<MirrorConfig>,
    pub show: ShowConfig,
}

/// Line the strip is wired to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    /// Linux spidev node `/dev/spidev{bus}.{device}`
    Spi,
    /// USB to SPI bridge or similar serial adapter at `port`
    Serial,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripConfig {
    /// Defaults to `serial` when `port` is given, `spi` otherwise
    #[serde(default)]
    pub interface: Option<Interface>,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub bus: u32,
    #[serde(default = "default_device")]
    pub device: u32,
    pub num_leds: usize,
    #[serde(default = "default_clock_speed")]
    pub max_clock_speed_hz: u32,
    /// Brightness 0-100 applied to every pixel at startup
    #[serde(default = "default_brightness")]
    pub initial_brightness: u8,
}

impl StripConfig {
    pub fn interface(&self) -> Interface {
        match (self.interface, &self.port) {
            (Some(interface), _) => interface,
            (None, Some(_)) => Interface::Serial,
            (None, None) => Interface::Spi,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MirrorConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShowConfig {
    pub name: String,
    /// Name/value pairs handed to the engine in file order
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

fn default_clock_speed() -> u32 {
    DEFAULT_CLOCK_HZ
}

fn default_device() -> u32 {
    1
}

fn default_brightness() -> u8 {
    100
}
