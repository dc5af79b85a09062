// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Test fixtures: a fake hwmon tree on disk and an in-memory PWM control.

use crate::control::PwmControl;
use crate::error::{Error, Result};
use crate::hwmon::Hwmon;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A `/sys/class/hwmon`-shaped directory tree in a temp dir.
pub(crate) struct FakeHwmon {
    dir: TempDir,
}

impl FakeHwmon {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(dir.path().join("class/hwmon")).expect("create hwmon root");
        Self { dir }
    }

    pub fn hwmon(&self) -> Hwmon {
        Hwmon::new(self.dir.path().join("class/hwmon"))
    }

    /// Scratch path outside the hwmon tree, for file sensors.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn device(&self, id: &str, driver: &str) -> PathBuf {
        let dir = self.dir.path().join("class/hwmon").join(id);
        fs::create_dir_all(&dir).expect("create device dir");
        Self::write(&dir.join("name"), &format!("{driver}\n"));
        dir
    }

    pub fn pci_id(&self, dir: &Path, id: &str) {
        fs::create_dir_all(dir.join("device")).expect("create device subdir");
        Self::write(&dir.join("device/device"), &format!("{id}\n"));
    }

    pub fn device_link(&self, dir: &Path, address: &str) {
        let target = self.dir.path().join("devices").join(address);
        fs::create_dir_all(&target).expect("create bus device");
        std::os::unix::fs::symlink(&target, dir.join("device")).expect("link device");
    }

    pub fn temp(&self, dir: &Path, n: u32, label: &str, value: &str) {
        Self::write(&dir.join(format!("temp{n}_label")), &format!("{label}\n"));
        Self::write(&dir.join(format!("temp{n}_input")), &format!("{value}\n"));
    }

    pub fn pwm(&self, dir: &Path, n: u32, value: &str, enable: &str) {
        Self::write(&dir.join(format!("pwm{n}")), &format!("{value}\n"));
        Self::write(&dir.join(format!("pwm{n}_enable")), &format!("{enable}\n"));
    }

    pub fn write(path: &Path, contents: &str) {
        fs::write(path, contents).expect("write fake attribute");
    }

    pub fn read(path: &Path) -> String {
        fs::read_to_string(path)
            .expect("read fake attribute")
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PwmEvent {
    Engage,
    Pwm(u8),
    Restore,
}

#[derive(Default)]
struct Shared {
    events: Mutex<Vec<PwmEvent>>,
    fail_engage: AtomicBool,
    fail_writes: AtomicBool,
    fail_restore: AtomicBool,
}

/// Ordered record of engage and restore calls across several fans.
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal lock").clone()
    }

    fn push(&self, entry: String) {
        self.0.lock().expect("journal lock").push(entry);
    }
}

/// In-memory [`PwmControl`] that records every successful call.
pub(crate) struct RecordingPwm {
    name: String,
    shared: Arc<Shared>,
    journal: Option<Journal>,
}

/// Test-side view of a [`RecordingPwm`] after it was moved into a fan.
#[derive(Clone)]
pub(crate) struct PwmLog {
    shared: Arc<Shared>,
}

impl RecordingPwm {
    pub fn new(name: &str) -> (Self, PwmLog) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                name: name.to_string(),
                shared: Arc::clone(&shared),
                journal: None,
            },
            PwmLog { shared },
        )
    }

    /// Also log engage and restore calls to `journal`.
    pub fn journaled(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    fn fail_if(&self, flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(Error::io(
                Path::new(&self.name),
                io::Error::from(io::ErrorKind::PermissionDenied),
            ))
        } else {
            Ok(())
        }
    }

    fn record(&self, event: PwmEvent) {
        self.shared.events.lock().expect("events lock").push(event);
        if let Some(journal) = &self.journal {
            match event {
                PwmEvent::Engage => journal.push(format!("{} engage", self.name)),
                PwmEvent::Restore => journal.push(format!("{} restore", self.name)),
                PwmEvent::Pwm(_) => {}
            }
        }
    }
}

impl PwmControl for RecordingPwm {
    fn engage(&mut self) -> Result<()> {
        self.fail_if(&self.shared.fail_engage)?;
        self.record(PwmEvent::Engage);
        Ok(())
    }

    fn write_pwm(&mut self, value: u8) -> Result<()> {
        self.fail_if(&self.shared.fail_writes)?;
        self.record(PwmEvent::Pwm(value));
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        self.fail_if(&self.shared.fail_restore)?;
        self.record(PwmEvent::Restore);
        Ok(())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl PwmLog {
    pub fn events(&self) -> Vec<PwmEvent> {
        self.shared.events.lock().expect("events lock").clone()
    }

    /// Duty values written so far, in order.
    pub fn writes(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PwmEvent::Pwm(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    pub fn fail_engage(&self, fail: bool) {
        self.shared.fail_engage.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_restore(&self, fail: bool) {
        self.shared.fail_restore.store(fail, Ordering::SeqCst);
    }
}
