// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Configuration file handling.
//!
//! Describes hardware sources, derived sensors, curves and fans in TOML.
//! Default path: `/etc/fanctl/config.toml`
//!
//! [`load_config`] only returns configurations that passed
//! [`Config::validate`], so nothing downstream re-checks names or ranges.

use crate::curve::{Curve, CurvePoint};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fanctl/config.toml";

/// Default status socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/run/fanctl.sock";

/// Default tick interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 2000;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Hardware temperature sources.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Derived sensors (composite max, file-backed).
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,

    /// Named fan curves.
    #[serde(default)]
    pub curves: Vec<CurveConfig>,

    /// Controlled fans, updated in this order every tick.
    #[serde(default)]
    pub fans: Vec<FanConfig>,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Tick interval for the control engine, in milliseconds.
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Path for the read-only status socket. Empty disables it.
    #[serde(default = "default_socket_path")]
    pub status_socket: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            status_socket: DEFAULT_SOCKET_PATH.to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn status_socket(&self) -> Option<&str> {
        Some(self.status_socket.as_str()).filter(|s| !s.is_empty())
    }
}

/// One hwmon device and the temperature channels to read from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// hwmon `name` attribute, e.g. "k10temp"
    pub driver: String,
    /// Optional bus address or PCI id to disambiguate identical drivers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pci_device: Option<String>,
    /// Divisor for raw readings; auto-detected when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Content of the `tempN_label` attribute to match
    pub label: String,
    /// Sensor name; defaults to `<source>/<label>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Added to the scaled reading
    #[serde(default)]
    pub offset: f64,
}

/// A sensor derived from other sensors or from an arbitrary file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SensorConfig {
    /// Maximum of other sensors, each with an offset.
    #[serde(rename = "max")]
    Max {
        name: String,
        inputs: Vec<MaxInputConfig>,
    },

    /// A number read from a file every tick.
    #[serde(rename = "file")]
    File { name: String, path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxInputConfig {
    pub sensor: String,
    #[serde(default)]
    pub offset: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveConfig {
    pub name: String,
    /// Name of the sensor driving fans that use this curve
    pub sensor: String,
    /// `[temperature, percent]` pairs in ascending temperature order
    pub points: Vec<CurvePoint>,
    #[serde(default)]
    pub hysteresis: f64,
    #[serde(default)]
    pub response_time_ms: u64,
    /// Moving-average window in ticks; 1 disables smoothing
    #[serde(default = "default_average")]
    pub average: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanConfig {
    pub name: String,
    pub driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pci_device: Option<String>,
    /// PWM attribute name inside the device directory, e.g. "pwm2"
    pub pwm_file: String,
    #[serde(default)]
    pub min_pwm: u8,
    #[serde(default = "default_max_pwm")]
    pub max_pwm: u8,
    /// Allow a full stop when the curve asks for 0%
    #[serde(default)]
    pub zero_rpm: bool,
    pub curve: String,
}

impl SensorConfig {
    pub fn name(&self) -> &str {
        match self {
            SensorConfig::Max { name, .. } | SensorConfig::File { name, .. } => name,
        }
    }
}

impl ChannelConfig {
    pub fn sensor_name(&self, source: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{source}/{}", self.label))
    }
}

impl CurveConfig {
    /// Build the validated runtime curve.
    pub fn build(&self) -> Result<Curve> {
        Curve::new(
            &self.name,
            self.points.clone(),
            self.hysteresis,
            Duration::from_millis(self.response_time_ms),
        )
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Parse and validate a TOML document.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).map_err(|e| Error::config("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check names, references and numeric ranges. Every error names the
    /// offending entry.
    pub fn validate(&self) -> Result<()> {
        if self.daemon.interval_ms == 0 {
            return Err(Error::config("daemon", "interval_ms must be > 0"));
        }

        // Sensors defined so far; a derived sensor may only reference
        // sensors defined before it.
        let mut defined: HashSet<String> = HashSet::new();
        let define = |defined: &mut HashSet<String>, name: String, entry: &str| -> Result<()> {
            if name.is_empty() {
                return Err(Error::config(entry, "sensor name is empty"));
            }
            if !defined.insert(name.clone()) {
                return Err(Error::config(entry, format!("duplicate sensor name '{name}'")));
            }
            Ok(())
        };

        for source in &self.sources {
            let entry = format!("source '{}'", source.name);
            if source.driver.is_empty() {
                return Err(Error::config(entry, "driver is empty"));
            }
            if source.channels.is_empty() {
                return Err(Error::config(entry, "source has no channels"));
            }
            if let Some(scale) = source.scale {
                if !scale.is_finite() || scale <= 0.0 {
                    return Err(Error::config(entry, "scale must be > 0"));
                }
            }
            for channel in &source.channels {
                if channel.label.is_empty() {
                    return Err(Error::config(entry, "channel label is empty"));
                }
                check_offset(&entry, channel.offset)?;
                define(&mut defined, channel.sensor_name(&source.name), &entry)?;
            }
            define(&mut defined, source.name.clone(), &entry)?;
        }

        for sensor in &self.sensors {
            let entry = format!("sensor '{}'", sensor.name());
            match sensor {
                SensorConfig::Max { inputs, .. } => {
                    if inputs.is_empty() {
                        return Err(Error::config(entry, "max sensor has no inputs"));
                    }
                    for input in inputs {
                        check_offset(&entry, input.offset)?;
                        if !defined.contains(&input.sensor) {
                            return Err(Error::config(
                                entry,
                                format!(
                                    "input '{}' is not a sensor defined before this one",
                                    input.sensor
                                ),
                            ));
                        }
                    }
                }
                SensorConfig::File { path, .. } => {
                    if path.as_os_str().is_empty() {
                        return Err(Error::config(entry, "path is empty"));
                    }
                }
            }
            define(&mut defined, sensor.name().to_string(), &entry)?;
        }

        let mut curve_names = HashSet::new();
        for curve in &self.curves {
            let entry = format!("curve '{}'", curve.name);
            if curve.name.is_empty() {
                return Err(Error::config(entry, "curve name is empty"));
            }
            if !curve_names.insert(curve.name.as_str()) {
                return Err(Error::config(entry, "duplicate curve name"));
            }
            if !defined.contains(&curve.sensor) {
                return Err(Error::config(
                    entry,
                    format!("unknown sensor '{}'", curve.sensor),
                ));
            }
            if curve.average == 0 {
                return Err(Error::config(entry, "average must be >= 1"));
            }
            curve.build()?;
        }

        let mut fan_names = HashSet::new();
        let mut outputs = HashSet::new();
        for fan in &self.fans {
            let entry = format!("fan '{}'", fan.name);
            if fan.name.is_empty() {
                return Err(Error::config(entry, "fan name is empty"));
            }
            if !fan_names.insert(fan.name.as_str()) {
                return Err(Error::config(entry, "duplicate fan name"));
            }
            if fan.driver.is_empty() {
                return Err(Error::config(entry, "driver is empty"));
            }
            if fan.pwm_file.is_empty() || fan.pwm_file.contains('/') {
                return Err(Error::config(
                    entry,
                    "pwm_file must be a bare attribute name such as 'pwm1'",
                ));
            }
            if fan.min_pwm > fan.max_pwm {
                return Err(Error::config(
                    entry,
                    format!("min_pwm {} exceeds max_pwm {}", fan.min_pwm, fan.max_pwm),
                ));
            }
            // Each PWM output is owned by exactly one fan.
            if !outputs.insert((
                fan.driver.as_str(),
                fan.pci_device.as_deref(),
                fan.pwm_file.as_str(),
            )) {
                return Err(Error::config(
                    entry,
                    format!("{} on '{}' is already driven by another fan", fan.pwm_file, fan.driver),
                ));
            }
            if !curve_names.contains(fan.curve.as_str()) {
                return Err(Error::config(entry, format!("unknown curve '{}'", fan.curve)));
            }
        }

        Ok(())
    }
}

fn check_offset(entry: &str, offset: f64) -> Result<()> {
    if offset.is_finite() {
        Ok(())
    } else {
        Err(Error::config(entry, "offset must be finite"))
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load and validate config from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let config = Config::parse(&contents).map_err(|e| match e {
        Error::Config { entry, reason } if entry == "config" => {
            Error::config(path.display().to_string(), reason)
        }
        other => other,
    })?;

    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_socket_path() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}

fn default_average() -> usize {
    1
}

fn default_max_pwm() -> u8 {
    255
}
