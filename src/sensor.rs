// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature sensors.
//!
//! Sensors live in one pool owned by the engine and are refreshed in pool
//! order once per tick. A composite sensor only refers to sensors earlier
//! in the pool, so by the time it is read its inputs are already fresh.

use crate::control::read_attr;
use crate::error::{Error, Result};
use crate::hwmon::{Device, io_err, parse_value};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Raw readings at or above this magnitude are taken to be millidegrees.
pub const MILLIDEGREE_THRESHOLD: f64 = 1000.0;

/// A temperature source and its most recent reading.
#[derive(Debug)]
pub struct Sensor {
    name: String,
    kind: SensorKind,
    current_value: Option<f64>,
    /// Whether `current_value` was refreshed by the latest read
    fresh: bool,
    /// Pool index of the winning input, for composite sensors
    hottest: Option<usize>,
    failures: u32,
}

#[derive(Debug)]
pub enum SensorKind {
    Hardware(HardwareChannel),
    Max(Vec<MaxInput>),
    File(FileInput),
}

/// One `tempN_input` attribute.
#[derive(Debug)]
pub struct HardwareChannel {
    path: PathBuf,
    file: File,
    /// Divisor, fixed after the first successful read when auto-detected
    scale: Option<f64>,
    offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxInput {
    /// Pool index of the input sensor
    pub sensor: usize,
    pub offset: f64,
}

/// Opened by path on every read, so a writer that replaces the file by
/// rename is picked up.
#[derive(Debug)]
pub struct FileInput {
    path: PathBuf,
}

impl Sensor {
    fn with_kind(name: impl Into<String>, kind: SensorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            current_value: None,
            fresh: false,
            hottest: None,
            failures: 0,
        }
    }

    /// Open the `tempN_input` attribute labelled `label` on `device`.
    pub fn hardware(
        name: impl Into<String>,
        device: &Device,
        label: &str,
        scale: Option<f64>,
        offset: f64,
    ) -> Result<Self> {
        let path = device.temp_input_by_label(label)?;
        let file = File::open(&path).map_err(io_err(&path))?;
        Ok(Self::with_kind(
            name,
            SensorKind::Hardware(HardwareChannel {
                path,
                file,
                scale,
                offset,
            }),
        ))
    }

    /// Maximum over earlier pool members.
    pub fn max(name: impl Into<String>, inputs: Vec<MaxInput>) -> Self {
        Self::with_kind(name, SensorKind::Max(inputs))
    }

    /// A number read from an arbitrary file. The file must exist now.
    pub fn file(name: impl Into<String>, path: &Path) -> Result<Self> {
        File::open(path).map_err(io_err(path))?;
        Ok(Self::with_kind(
            name,
            SensorKind::File(FileInput {
                path: path.to_path_buf(),
            }),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            SensorKind::Hardware(_) => "hwmon",
            SensorKind::Max(_) => "max",
            SensorKind::File(_) => "file",
        }
    }

    /// Last successful reading, kept across failed reads.
    pub fn current_value(&self) -> Option<f64> {
        self.current_value
    }

    /// The reading from this tick, or `None` if this tick's read failed.
    pub fn fresh_value(&self) -> Option<f64> {
        self.current_value.filter(|_| self.fresh)
    }

    pub fn hottest(&self) -> Option<usize> {
        self.hottest
    }

    /// Refresh `current_value`. `earlier` is the part of the pool before
    /// this sensor; only composite sensors look at it.
    ///
    /// On failure the previous value is kept but the sensor is not fresh.
    pub fn read(&mut self, earlier: &[Sensor]) -> Result<f64> {
        self.fresh = false;
        let value = match &mut self.kind {
            SensorKind::Hardware(channel) => channel.read()?,
            SensorKind::File(input) => {
                let text = fs::read_to_string(&input.path).map_err(io_err(&input.path))?;
                parse_value(&input.path, &text)?
            }
            SensorKind::Max(inputs) => {
                let (value, hottest) = read_max(&self.name, inputs, earlier)?;
                self.hottest = Some(hottest);
                value
            }
        };
        self.current_value = Some(value);
        self.fresh = true;
        Ok(value)
    }
}

impl HardwareChannel {
    fn read(&mut self) -> Result<f64> {
        let text = read_attr(&mut self.file, &self.path)?;
        let raw = parse_value(&self.path, &text)?;
        let scale = *self.scale.get_or_insert_with(|| detect_scale(raw));
        Ok(raw / scale + self.offset)
    }
}

fn detect_scale(raw: f64) -> f64 {
    if raw.abs() >= MILLIDEGREE_THRESHOLD {
        1000.0
    } else {
        1.0
    }
}

/// Max of `input + offset` over all inputs. Every input is considered; if
/// any of them has no fresh value the whole reading fails, naming the
/// first such input.
fn read_max(name: &str, inputs: &[MaxInput], earlier: &[Sensor]) -> Result<(f64, usize)> {
    let mut best: Option<(f64, usize)> = None;
    let mut failed: Option<&str> = None;

    for input in inputs {
        let Some(sensor) = earlier.get(input.sensor) else {
            return Err(Error::Input {
                sensor: name.to_string(),
                input: format!("#{}", input.sensor),
            });
        };
        match sensor.fresh_value() {
            Some(v) => {
                let adjusted = v + input.offset;
                if best.is_none_or(|(max, _)| adjusted > max) {
                    best = Some((adjusted, input.sensor));
                }
            }
            None => {
                failed.get_or_insert(sensor.name());
            }
        }
    }

    if let Some(input) = failed {
        return Err(Error::Input {
            sensor: name.to_string(),
            input: input.to_string(),
        });
    }
    best.ok_or_else(|| Error::Input {
        sensor: name.to_string(),
        input: "<none>".to_string(),
    })
}

/// Read every sensor in pool order. Failures are logged once when a sensor
/// starts failing and once when it recovers; the sensor's previous value
/// stays in place meanwhile. Returns the number of sensors that failed.
pub fn read_all(pool: &mut [Sensor]) -> usize {
    let mut failed = 0;
    for i in 0..pool.len() {
        let (earlier, rest) = pool.split_at_mut(i);
        let sensor = &mut rest[0];
        match sensor.read(earlier) {
            Ok(value) => {
                if sensor.failures > 0 {
                    log::info!(
                        "Sensor '{}' recovered after {} failed read(s): {value:.1}",
                        sensor.name,
                        sensor.failures
                    );
                }
                sensor.failures = 0;
            }
            Err(e) => {
                failed += 1;
                sensor.failures += 1;
                if sensor.failures == 1 {
                    log::warn!("Sensor '{}': {e}", sensor.name);
                } else {
                    log::debug!("Sensor '{}' still failing: {e}", sensor.name);
                }
            }
        }
    }
    failed
}
