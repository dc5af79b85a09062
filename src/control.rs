// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! PWM control surfaces.
//!
//! The engine only sees [`PwmControl`]. Whoever supplies the concrete
//! implementation owns the privilege question: [`SysfsPwm`] simply opens
//! the attributes read-write and fails at startup if that is not allowed.

use crate::error::{Error, Result};
use crate::hwmon::{Device, io_err};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// `pwmN_enable` value selecting manual duty-cycle control.
pub const PWM_ENABLE_MANUAL: &str = "1";

/// A fan's duty-cycle control surface.
pub trait PwmControl: Send {
    /// Capture the current mode (and duty) and switch to manual control.
    fn engage(&mut self) -> Result<()>;

    /// Write a duty value 0-255. Only valid after [`engage`](Self::engage).
    fn write_pwm(&mut self, value: u8) -> Result<()>;

    /// Write back whatever [`engage`](Self::engage) captured. A no-op when
    /// nothing was captured or it was already restored.
    fn restore(&mut self) -> Result<()>;

    /// Human-readable location, used in logs.
    fn describe(&self) -> String;
}

/// State found on the control surface before we took it over.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Original {
    enable: String,
    pwm: String,
}

/// `pwmN` / `pwmN_enable` attribute pair of an hwmon device, held open for
/// the lifetime of the fan.
#[derive(Debug)]
pub struct SysfsPwm {
    pwm_path: PathBuf,
    enable_path: PathBuf,
    pwm: File,
    enable: File,
    original: Option<Original>,
}

impl SysfsPwm {
    /// Open `<device>/<pwm_file>` and its `_enable` companion read-write.
    pub fn open(device: &Device, pwm_file: &str) -> Result<Self> {
        let pwm_path = device.attribute(pwm_file)?;
        let enable_path = device.attribute(&format!("{pwm_file}_enable"))?;

        Ok(Self {
            pwm: open_rw(&pwm_path)?,
            enable: open_rw(&enable_path)?,
            pwm_path,
            enable_path,
            original: None,
        })
    }
}

impl PwmControl for SysfsPwm {
    fn engage(&mut self) -> Result<()> {
        let enable = read_attr(&mut self.enable, &self.enable_path)?;
        let pwm = read_attr(&mut self.pwm, &self.pwm_path)?;
        if enable == PWM_ENABLE_MANUAL {
            log::info!(
                "{} was already in manual mode (pwm {pwm}), will restore that on exit",
                self.enable_path.display()
            );
        }

        write_attr(&mut self.enable, &self.enable_path, PWM_ENABLE_MANUAL)?;
        self.original = Some(Original { enable, pwm });
        Ok(())
    }

    fn write_pwm(&mut self, value: u8) -> Result<()> {
        write_attr(&mut self.pwm, &self.pwm_path, &value.to_string())
    }

    fn restore(&mut self) -> Result<()> {
        let Some(original) = self.original.take() else {
            return Ok(());
        };

        // A manual-mode original also needs its duty value back, otherwise
        // the fan stays at whatever the curve last asked for.
        if original.enable == PWM_ENABLE_MANUAL {
            write_attr(&mut self.pwm, &self.pwm_path, &original.pwm)?;
        }
        write_attr(&mut self.enable, &self.enable_path, &original.enable)
    }

    fn describe(&self) -> String {
        self.pwm_path.display().to_string()
    }
}

fn open_rw(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(io_err(path))
}

/// Re-read an attribute from offset zero.
pub(crate) fn read_attr(file: &mut File, path: &Path) -> Result<String> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).map_err(io_err(path))?;
    file.read_to_string(&mut contents).map_err(io_err(path))?;
    Ok(contents.trim().to_string())
}

/// Replace an attribute's contents through an already-open handle.
fn write_attr(file: &mut File, path: &Path, value: &str) -> Result<()> {
    file.set_len(0).map_err(io_err(path))?;
    file.seek(SeekFrom::Start(0)).map_err(io_err(path))?;
    file.write_all(value.as_bytes()).map_err(io_err(path))?;
    file.flush().map_err(io_err(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeHwmon;

    fn open_fan(fake: &FakeHwmon, enable: &str, pwm: &str) -> (PathBuf, SysfsPwm) {
        let dir = fake.device("hwmon1", "nct6798");
        fake.pwm(&dir, 2, pwm, enable);
        let dev = fake.hwmon().resolve("nct6798", None).unwrap();
        (dir, SysfsPwm::open(&dev, "pwm2").unwrap())
    }

    #[test]
    fn test_engage_switches_to_manual_and_restores_auto() {
        let fake = FakeHwmon::new();
        let (dir, mut pwm) = open_fan(&fake, "5", "80");

        pwm.engage().unwrap();
        assert_eq!(FakeHwmon::read(&dir.join("pwm2_enable")), "1");

        pwm.write_pwm(153).unwrap();
        pwm.write_pwm(50).unwrap();
        assert_eq!(FakeHwmon::read(&dir.join("pwm2")), "50");

        pwm.restore().unwrap();
        assert_eq!(FakeHwmon::read(&dir.join("pwm2_enable")), "5");
        // Automatic mode owns the duty value again; leave it alone.
        assert_eq!(FakeHwmon::read(&dir.join("pwm2")), "50");
    }

    #[test]
    fn test_restore_manual_original_writes_duty_back() {
        let fake = FakeHwmon::new();
        let (dir, mut pwm) = open_fan(&fake, "1", "120");

        pwm.engage().unwrap();
        pwm.write_pwm(255).unwrap();
        pwm.restore().unwrap();

        assert_eq!(FakeHwmon::read(&dir.join("pwm2")), "120");
        assert_eq!(FakeHwmon::read(&dir.join("pwm2_enable")), "1");
    }

    #[test]
    fn test_restore_is_idempotent() {
        let fake = FakeHwmon::new();
        let (dir, mut pwm) = open_fan(&fake, "2", "0");

        pwm.restore().unwrap();
        assert_eq!(FakeHwmon::read(&dir.join("pwm2_enable")), "2");

        pwm.engage().unwrap();
        pwm.restore().unwrap();
        FakeHwmon::write(&dir.join("pwm2_enable"), "7");
        pwm.restore().unwrap();
        assert_eq!(FakeHwmon::read(&dir.join("pwm2_enable")), "7");
    }

    #[test]
    fn test_open_requires_enable_attribute() {
        let fake = FakeHwmon::new();
        let dir = fake.device("hwmon1", "nct6798");
        FakeHwmon::write(&dir.join("pwm3"), "0");
        let dev = fake.hwmon().resolve("nct6798", None).unwrap();

        assert!(matches!(
            SysfsPwm::open(&dev, "pwm3"),
            Err(Error::MissingAttribute { .. })
        ));
    }
}
