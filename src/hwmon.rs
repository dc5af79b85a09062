// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! hwmon sysfs device resolution.
//!
//! Maps a driver name (plus an optional bus qualifier) to exactly one
//! `/sys/class/hwmon/hwmonN` directory, and locates the temperature and
//! PWM attributes inside it.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const HWMON_ROOT: &str = "/sys/class/hwmon";

/// The hwmon namespace to resolve devices in.
#[derive(Debug, Clone)]
pub struct Hwmon {
    root: PathBuf,
}

/// A resolved hwmon device directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Absolute path of the `hwmonN` directory
    pub path: PathBuf,
    /// Contents of the `name` attribute
    pub driver: String,
}

impl Default for Hwmon {
    fn default() -> Self {
        Self::new(HWMON_ROOT)
    }
}

impl Hwmon {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve exactly one device whose `name` equals `driver` and, when
    /// `bus` is given, whose bus address matches it.
    ///
    /// Never picks the first of several matches: zero matches yields
    /// [`Error::NotFound`], more than one yields [`Error::Ambiguous`].
    pub fn resolve(&self, driver: &str, bus: Option<&str>) -> Result<Device> {
        if driver.is_empty() {
            return Err(Error::config("hwmon device", "driver name is empty"));
        }

        let entries = fs::read_dir(&self.root).map_err(|e| Error::io(&self.root, e))?;
        let mut matches = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.root, e))?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let dir = entry.path();
            let Some(name) = read_trimmed(&dir.join("name")) else {
                continue;
            };
            if name != driver {
                continue;
            }
            if let Some(bus) = bus {
                if !bus_matches(&dir, bus) {
                    continue;
                }
            }
            matches.push(dir);
        }

        matches.sort();
        match matches.len() {
            0 => Err(Error::NotFound {
                driver: driver.to_string(),
                bus: bus.map(str::to_string),
            }),
            1 => {
                let path = matches.remove(0);
                log::debug!("Resolved driver '{driver}' to {}", path.display());
                Ok(Device {
                    path,
                    driver: driver.to_string(),
                })
            }
            _ => Err(Error::Ambiguous {
                driver: driver.to_string(),
                bus: bus.map(str::to_string),
                matches,
            }),
        }
    }
}

impl Device {
    /// Find the `tempN_input` attribute whose companion `tempN_label`
    /// reads exactly `label`.
    pub fn temp_input_by_label(&self, label: &str) -> Result<PathBuf> {
        let entries = fs::read_dir(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let mut found = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.path, e))?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(index) = file_name
                .strip_prefix("temp")
                .and_then(|rest| rest.strip_suffix("_label"))
            else {
                continue;
            };
            if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if read_trimmed(&entry.path()).as_deref() != Some(label) {
                continue;
            }
            let input = self.path.join(format!("temp{index}_input"));
            if input.exists() {
                found.push(input);
            }
        }

        found.sort();
        match found.len() {
            0 => Err(Error::MissingAttribute {
                device: self.path.clone(),
                attribute: format!("temp*_label = {label}"),
            }),
            1 => Ok(found.remove(0)),
            _ => Err(Error::Ambiguous {
                driver: format!("{} label '{label}'", self.driver),
                bus: None,
                matches: found,
            }),
        }
    }

    /// Path of a named attribute, which must already exist.
    pub fn attribute(&self, name: &str) -> Result<PathBuf> {
        let path = self.path.join(name);
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::MissingAttribute {
                device: self.path.clone(),
                attribute: name.to_string(),
            })
        }
    }
}

/// A bus qualifier matches either the basename of the `device` link
/// (e.g. `0000:03:00.0`) or a substring of `device/device` (PCI id).
fn bus_matches(dir: &Path, bus: &str) -> bool {
    let device_link = dir.join("device");
    if let Ok(target) = fs::canonicalize(&device_link) {
        if target.file_name().is_some_and(|n| n.to_string_lossy() == bus) {
            return true;
        }
    }
    read_trimmed(&device_link.join("device")).is_some_and(|id| id.contains(bus))
}

pub(crate) fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// Parse a raw attribute value into a float, mapping failures to
/// [`Error::Parse`] against `path`.
pub(crate) fn parse_value(path: &Path, contents: &str) -> Result<f64> {
    let trimmed = contents.trim();
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::Parse {
            path: path.to_path_buf(),
            value: trimmed.to_string(),
        })
}

pub(crate) fn io_err(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |e| Error::io(path, e)
}
